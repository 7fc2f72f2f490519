//! Length-based token estimation and context budgeting.

/// Context length assumed when the backend does not report one.
pub const DEFAULT_CONTEXT_LEN: usize = 8192;

/// Tokens added to every estimate for chat message framing.
pub const MESSAGE_RESERVE: usize = 100;

/// Tokens held back from the context window for the response.
pub const RESPONSE_RESERVE: usize = 200;

/// Approximate bytes per token for source code.
const BYTES_PER_TOKEN: usize = 4;

/// Estimate the token count of `text` from its byte length.
///
/// This is an admission heuristic, not a tokenizer.
#[must_use]
pub const fn estimate_tokens(text: &str) -> usize {
    text.len() / BYTES_PER_TOKEN
}

/// Token budget derived from a model's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    max_context_len: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LEN)
    }
}

impl TokenBudget {
    /// Create a budget for a model with the given context length.
    #[must_use]
    pub const fn new(max_context_len: usize) -> Self {
        Self { max_context_len }
    }

    /// The model's full context length.
    #[must_use]
    pub const fn max_context_len(&self) -> usize {
        self.max_context_len
    }

    /// Largest request estimate that is still admitted.
    #[must_use]
    pub const fn effective_budget(&self) -> usize {
        self.max_context_len.saturating_sub(RESPONSE_RESERVE)
    }

    /// Whether a request of `tokens` estimated tokens is admitted.
    #[must_use]
    pub const fn fits(&self, tokens: usize) -> bool {
        tokens <= self.effective_budget()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4003)), 1000);
    }

    #[test]
    fn test_budget_boundary() {
        let budget = TokenBudget::new(1000);
        assert_eq!(budget.effective_budget(), 800);
        assert!(budget.fits(799));
        assert!(budget.fits(800));
        assert!(!budget.fits(801));
    }

    #[test]
    fn test_default_budget() {
        let budget = TokenBudget::default();
        assert_eq!(budget.max_context_len(), DEFAULT_CONTEXT_LEN);
        assert_eq!(budget.effective_budget(), DEFAULT_CONTEXT_LEN - RESPONSE_RESERVE);
    }

    #[test]
    fn test_tiny_context_rejects_everything() {
        let budget = TokenBudget::new(100);
        assert_eq!(budget.effective_budget(), 0);
        assert!(!budget.fits(MESSAGE_RESERVE));
    }
}
