//! Formatting retrieved chunks for prompts and for display.

use super::RetrievedChunk;

/// Format chunks as numbered, attributed excerpts for a prompt.
pub fn format_context_for_prompt(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "---\n[{}] {} @ offset {}\n{}\n---",
                i + 1,
                chunk.source,
                chunk.chunk_offset,
                chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format chunks for display under an answer.
pub fn format_context_for_display(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "Chunk {} ({} @ {}, score: {:.2}):\n{}",
                i + 1,
                chunk.source,
                chunk.chunk_offset,
                chunk.score,
                chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First `max_chars` characters of a chunk, on a single line.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source: source.to_string(),
            score: 0.82,
            chunk_offset: 120,
        }
    }

    #[test]
    fn test_prompt_numbering() {
        let text = format_context_for_prompt(&[chunk("a.pdf", "one"), chunk("b.pdf", "two")]);
        assert!(text.contains("[1] a.pdf @ offset 120"));
        assert!(text.contains("[2] b.pdf @ offset 120\ntwo"));
    }

    #[test]
    fn test_display_includes_score() {
        let text = format_context_for_display(&[chunk("a.pdf", "one")]);
        assert!(text.contains("score: 0.82"));
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n b   c", 10), "a b c");
        assert_eq!(excerpt("abcdefghij klm", 10), "abcdefghij...");
    }
}
