//! Character-recursive text splitting: prefer paragraph, then line, then
//! word, then raw-character boundaries, producing chunks of at most
//! `chunk_size` characters with `chunk_overlap` carried over between
//! consecutive chunks.

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Splits `text` into chunks. `chunk_overlap` must be `< chunk_size`
/// (enforced by `Settings::validate`); callers that bypass `Settings`
/// should uphold the same invariant or overlap is silently clamped.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));

    let pieces = split_recursive(text, &SEPARATORS, chunk_size);
    merge_with_overlap(&pieces, chunk_size, overlap)
}

/// Splits `text` into pieces no larger than `chunk_size` where possible,
/// trying each separator in turn and recursing into any piece still too
/// large with the remaining separators. Falls back to a hard character
/// split once separators are exhausted.
fn split_recursive(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = separators.split_first() else {
        return hard_split(text, chunk_size);
    };

    if sep.is_empty() || !text.contains(sep) {
        return split_recursive(text, rest, chunk_size);
    }

    let mut pieces = Vec::new();
    let parts: Vec<&str> = text.split(sep).collect();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        let with_sep = if i + 1 < parts.len() {
            format!("{part}{sep}")
        } else {
            part.to_string()
        };
        if with_sep.chars().count() > chunk_size {
            pieces.extend(split_recursive(&with_sep, rest, chunk_size));
        } else {
            pieces.push(with_sep);
        }
    }
    pieces
}

fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<char>>()
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Greedily merges adjacent pieces up to `chunk_size`, then carries the
/// trailing `overlap` characters of each merged chunk into the head of the
/// next one.
fn merge_with_overlap(pieces: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty() && current.chars().count() + piece.chars().count() > chunk_size {
            merged.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        merged.push(current);
    }

    if overlap == 0 || merged.len() < 2 {
        return merged;
    }

    let mut with_overlap = Vec::with_capacity(merged.len());
    for (i, chunk) in merged.iter().enumerate() {
        if i == 0 {
            with_overlap.push(chunk.clone());
            continue;
        }
        let prev = &merged[i - 1];
        let tail: String = prev
            .chars()
            .rev()
            .take(overlap)
            .collect::<Vec<char>>()
            .into_iter()
            .rev()
            .collect();
        with_overlap.push(format!("{tail}{chunk}"));
    }
    with_overlap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let chunks = chunk_text("hello world", 100, 10);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_is_split_at_chunk_size_boundaries() {
        let text = "a".repeat(250);
        let chunks = chunk_text(&text, 100, 0);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn overlap_carries_trailing_characters_forward() {
        let text = format!("{}\n\n{}", "a".repeat(90), "b".repeat(90));
        let chunks = chunk_text(&text, 100, 10);
        assert!(chunks.len() >= 2);
        assert!(chunks[1].starts_with(&"a".repeat(10)));
    }

    #[test]
    fn prefers_paragraph_boundaries_over_hard_splitting() {
        let text = format!("{}\n\n{}", "x".repeat(50), "y".repeat(50));
        let chunks = chunk_text(&text, 60, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].trim().chars().all(|c| c == 'x'));
    }
}
