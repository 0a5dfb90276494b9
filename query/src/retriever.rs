//! Query pipeline: embed the query, over-fetch from the store, optionally
//! rerank, truncate to `k`.

use crate::error::RetrieveError;
use embed::{MultimodalEmbedder, TextEmbedder};
use ragserver_core::model::Document;
use rerank::Reranker;
use storage::StoreManager;
use tracing::warn;

#[cfg(test)]
const DEFAULT_OVERFETCH_SCALE: usize = 5;

pub struct Retriever<'a> {
    store: &'a dyn StoreManager,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a dyn StoreManager) -> Self {
        Self { store }
    }

    /// Text-space search: embed `query` with `embedder`, over-fetch
    /// `k * max(1, overfetch_scale)` candidates, and (if `reranker` is
    /// supplied) rerank before truncating to `k`.
    pub async fn query_text(
        &self,
        query: &str,
        embedder: &dyn TextEmbedder,
        k: usize,
        reranker: Option<&dyn Reranker>,
        overfetch_scale: usize,
    ) -> Result<Vec<Document>, RetrieveError> {
        let space_key = embedder.space_key_text();
        self.store.activate_space(&space_key).await?;

        let vector = embedder.embed_query(query).await;
        if vector.is_empty() {
            warn!("text embedder returned an empty vector, short-circuiting query");
            return Ok(Vec::new());
        }

        let overfetch = k.saturating_mul(overfetch_scale.max(1));
        let candidates = self
            .store
            .query(&vector, overfetch, None, Some(&space_key))
            .await?;
        let candidates: Vec<Document> = candidates.into_iter().map(|c| c.document).collect();

        self.rerank_and_truncate(query, candidates, k, reranker)
            .await
    }

    /// Image-space search by text: embed `query` into the multimodal
    /// embedder's image space, over-fetch, rewrite payloads to text for
    /// rerank scoring, truncate to `k`.
    pub async fn query_text_multi(
        &self,
        query: &str,
        embedder: &dyn MultimodalEmbedder,
        k: usize,
        reranker: Option<&dyn Reranker>,
        overfetch_scale: usize,
    ) -> Result<Vec<Document>, RetrieveError> {
        let space_key = embedder.space_key_multi();
        self.store.activate_space(&space_key).await?;

        let vector = embedder.embed_text_for_image_query(query).await;
        if vector.is_empty() {
            warn!("multimodal embedder returned an empty vector, short-circuiting query");
            return Ok(Vec::new());
        }

        let overfetch = k.saturating_mul(overfetch_scale.max(1));
        let candidates = self
            .store
            .query(&vector, overfetch, None, Some(&space_key))
            .await?;
        let candidates: Vec<Document> = candidates.into_iter().map(|c| c.document).collect();

        self.rerank_and_truncate(query, candidates, k, reranker)
            .await
    }

    /// Image-space search by example image: no reranking (the reranker
    /// takes text queries, not images).
    pub async fn query_image(
        &self,
        path: &str,
        embedder: &dyn MultimodalEmbedder,
        k: usize,
    ) -> Result<Vec<Document>, RetrieveError> {
        let space_key = embedder.space_key_multi();
        self.store.activate_space(&space_key).await?;

        let vectors = embedder.embed_image(&[path.to_string()]).await;
        let Some(vector) = vectors.into_iter().next().filter(|v| !v.is_empty()) else {
            warn!("multimodal embedder returned an empty vector, short-circuiting query");
            return Ok(Vec::new());
        };

        let scored = self.store.query(&vector, k, None, Some(&space_key)).await?;
        Ok(scored.into_iter().map(|c| c.document).collect())
    }

    async fn rerank_and_truncate(
        &self,
        query: &str,
        mut candidates: Vec<Document>,
        k: usize,
        reranker: Option<&dyn Reranker>,
    ) -> Result<Vec<Document>, RetrieveError> {
        let Some(reranker) = reranker else {
            candidates.truncate(k);
            return Ok(candidates);
        };

        let texts: Vec<String> = candidates.iter().map(rerank_text).collect();
        let ranked = reranker.rerank(query, &texts, k).await?;

        let mut reordered: Vec<Document> = ranked
            .into_iter()
            .filter_map(|r| candidates.get(r.index).cloned())
            .collect();
        reordered.truncate(candidates.len().min(k));
        Ok(reordered)
    }
}

/// The text a cross-encoder scores a document against: for image
/// documents (no caption field in this schema) that's the source path,
/// since payload itself is just a path, not caption text.
fn rerank_text(doc: &Document) -> String {
    doc.as_text()
        .map(|t| t.to_string())
        .unwrap_or_else(|| doc.source().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragserver_core::metadata::{keys, Metadata};
    use ragserver_core::model::Payload;
    use rerank::RankedIndex;
    use storage::{QueryFilter, ScoredDocument, StoreError};

    fn doc(id: &str, text: &str) -> Document {
        let mut meta = Metadata::new();
        meta.insert(keys::ID.to_string(), id.into());
        meta.insert(keys::SOURCE.to_string(), id.into());
        Document::new(Payload::Text(text.to_string()), meta)
    }

    struct FakeStore {
        docs: Vec<Document>,
    }

    #[async_trait]
    impl StoreManager for FakeStore {
        async fn load_space(&self, _space_key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn activate_space(&self, _space_key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_active(&self) -> Option<String> {
            None
        }
        async fn upsert(
            &self,
            _docs: Vec<Document>,
            _vectors: Vec<Vec<f32>>,
            _space_key: Option<&str>,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_multi(
            &self,
            _docs: Vec<Document>,
            _vectors: Vec<Vec<f32>>,
            _space_key: Option<&str>,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
        async fn query(
            &self,
            _vector: &[f32],
            k: usize,
            _filter: Option<&QueryFilter>,
            _space_key: Option<&str>,
        ) -> Result<Vec<ScoredDocument>, StoreError> {
            Ok(self
                .docs
                .iter()
                .take(k)
                .cloned()
                .map(|document| ScoredDocument { document, score: 1.0 })
                .collect())
        }
        async fn skip_update(&self, _source: &str, _check_update: bool) -> bool {
            false
        }
    }

    struct FakeTextEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl TextEmbedder for FakeTextEmbedder {
        fn name(&self) -> &str {
            "fake"
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        async fn embed_documents(&self, _texts: &[String]) -> Vec<Vec<f32>> {
            Vec::new()
        }
        async fn embed_query(&self, _text: &str) -> Vec<f32> {
            self.vector.clone()
        }
    }

    struct ReverseReranker;

    #[async_trait]
    impl Reranker for ReverseReranker {
        fn name(&self) -> &str {
            "reverse"
        }
        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
            topk: usize,
        ) -> Result<Vec<RankedIndex>, rerank::RerankError> {
            let mut indices: Vec<usize> = (0..documents.len()).collect();
            indices.reverse();
            indices.truncate(topk);
            Ok(indices
                .into_iter()
                .map(|index| RankedIndex { index, score: 1.0 })
                .collect())
        }
    }

    #[tokio::test]
    async fn query_text_without_reranker_truncates_to_k() {
        let store = FakeStore {
            docs: vec![doc("a", "alpha"), doc("b", "beta"), doc("c", "gamma")],
        };
        let embedder = FakeTextEmbedder { vector: vec![1.0, 0.0] };
        let retriever = Retriever::new(&store);

        let results = retriever
            .query_text("q", &embedder, 2, None, DEFAULT_OVERFETCH_SCALE)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn query_text_empty_vector_short_circuits() {
        let store = FakeStore {
            docs: vec![doc("a", "alpha")],
        };
        let embedder = FakeTextEmbedder { vector: Vec::new() };
        let retriever = Retriever::new(&store);

        let results = retriever
            .query_text("q", &embedder, 2, None, DEFAULT_OVERFETCH_SCALE)
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn query_text_with_reranker_reorders_candidates() {
        let store = FakeStore {
            docs: vec![doc("a", "alpha"), doc("b", "beta"), doc("c", "gamma")],
        };
        let embedder = FakeTextEmbedder { vector: vec![1.0, 0.0] };
        let reranker = ReverseReranker;
        let retriever = Retriever::new(&store);

        let results = retriever
            .query_text("q", &embedder, 2, Some(&reranker), DEFAULT_OVERFETCH_SCALE)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_text(), Some("gamma"));
        assert_eq!(results[1].as_text(), Some("beta"));
    }
}
