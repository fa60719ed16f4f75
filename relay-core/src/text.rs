//! Text utility functions.

/// Rough token estimate: about four bytes per token for English text.
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}
