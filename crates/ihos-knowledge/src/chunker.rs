//! Word-window text chunking.

/// Chunk size used when a caller passes 0.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Split `text` into windows of `chunk_size` whitespace-separated words.
///
/// After a window `[start, end)` the next one starts at `end - overlap`, so
/// consecutive chunks share `overlap` words. The start always advances by
/// at least one word, which keeps `overlap >= chunk_size` finite. Chunks are
/// re-joined with single spaces.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    let total = words.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total);
        chunks.push(words[start..end].join(" "));
        if end == total {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(split_text("", 10, 2).is_empty());
        assert!(split_text("  \n\t ", 10, 2).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("một  hai\nba", 10, 3);
        assert_eq!(chunks, vec!["một hai ba"]);
    }

    #[test]
    fn test_no_overlap_reproduces_words() {
        let text = words(23);
        let chunks = split_text(&text, 5, 0);
        assert_eq!(chunks.len(), 5);
        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.split(' ').map(str::to_string))
            .collect();
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_overlap_measured_from_previous_end() {
        let chunks = split_text(&words(10), 4, 1);
        assert_eq!(
            chunks,
            vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9"]
        );
    }

    #[test]
    fn test_each_chunk_repeats_overlap_tail() {
        let overlap = 3;
        let chunks = split_text(&words(50), 8, overlap);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split(' ').collect();
            let next: Vec<&str> = pair[1].split(' ').collect();
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
        assert!(chunks.last().unwrap().ends_with("w49"));
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk_size_terminates() {
        let chunks = split_text(&words(6), 2, 5);
        assert_eq!(chunks.first().map(String::as_str), Some("w0 w1"));
        assert_eq!(chunks.last().map(String::as_str), Some("w4 w5"));
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_zero_chunk_size_uses_default() {
        let chunks = split_text(&words(DEFAULT_CHUNK_SIZE + 1), 0, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], format!("w{}", DEFAULT_CHUNK_SIZE));
    }
}
