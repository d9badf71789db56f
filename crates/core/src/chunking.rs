use crate::error::IngestError;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 100,
        }
    }
}

/// Split extracted text into overlapping fixed-size windows, measured in
/// characters. Each chunk holds at most `max_chars` characters and repeats
/// the last `overlap_chars` characters of its predecessor.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    if config.max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be positive".to_string(),
        ));
    }
    if config.overlap_chars >= config.max_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {} must be smaller than chunk size {}",
            config.overlap_chars, config.max_chars
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.max_chars - config.overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
