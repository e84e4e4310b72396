//! Token counting boundary.

/// Counts the tokens a piece of text occupies for a given model.
///
/// Implementations must be pure and total: the same input always yields the
/// same count, and no input is an error.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, model: &str, text: &str) -> u32;
}

/// Approximates token counts at roughly four characters per token.
///
/// Good enough for window accounting against OpenAI-style BPE vocabularies
/// on English text. Counts characters, not bytes, so multi-byte scripts are
/// not over-counted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

const CHARS_PER_TOKEN: u32 = 4;

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, _model: &str, text: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        chars.div_ceil(CHARS_PER_TOKEN)
    }
}
