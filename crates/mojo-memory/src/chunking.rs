//! Knowledge Document chunking (spec §4.3): "a configured character window
//! with overlap". Pure function so it's trivially unit-testable without a
//! `MemoryService` in play.

pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= window {
        return vec![text.to_string()];
    }

    let stride = window.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + window).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 100, 10);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, 10, 3);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 10);
        }
        assert_eq!(chunks.last().unwrap().chars().last().unwrap(), 'a');
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
    }
}
