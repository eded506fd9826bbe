//! Sliding-window text splitting that avoids cutting words in half.

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// From each tentative boundary the splitter looks back up to `chunk_size / 4`
/// characters for whitespace and cuts there, falling back to the raw boundary.
/// The next window starts `overlap` characters before the cut, but never at or
/// before the previous start. Chunks are trimmed and empty ones dropped, so
/// blank input yields no chunks.
#[must_use]
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_size = chunk_size.max(1);

    if chars.len() <= chunk_size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_owned()]
        };
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = start + chunk_size;
        if end >= chars.len() {
            push_trimmed(&mut chunks, &chars[start..]);
            break;
        }

        let lookback = (chunk_size / 4).min(end - start);
        let break_point = (0..lookback)
            .map(|back| end - back)
            .find(|&position| chars[position].is_whitespace())
            .unwrap_or(end);

        push_trimmed(&mut chunks, &chars[start..break_point]);

        let next_start = break_point.saturating_sub(overlap);
        start = if next_start > start {
            next_start
        } else {
            break_point
        };
    }

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, window: &[char]) {
    let chunk: String = window.iter().collect();
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_owned());
    }
}
