pub mod config;
pub mod error;
pub mod metadata;
pub mod model;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

/// Sleeps `1/rate_per_sec` seconds. Shared by the embedding/rerank providers
/// and the HTML loader to smooth bursts against shared backends.
pub async fn cool_down(rate_per_sec: f64) {
    if rate_per_sec <= 0.0 {
        return;
    }
    tokio::time::sleep(std::time::Duration::from_secs_f64(1.0 / rate_per_sec)).await;
}
