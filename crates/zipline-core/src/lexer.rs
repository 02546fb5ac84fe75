//! Splitting raw content into token texts.

use regex::Regex;

use crate::error::ClusterError;

/// Splits content into token texts. Must be deterministic.
pub trait Tokenizer: Send + Sync {
    fn split<'a>(&self, content: &'a str) -> Vec<&'a str>;
}

/// Default regex-driven lexer.
///
/// Every match of the pattern is trimmed of `- : _ / \`, split on `_`, and
/// pieces shorter than two characters are dropped.
#[derive(Debug, Clone)]
pub struct RegexLexer {
    regex: Regex,
}

const TRIM_CHARS: [char; 5] = ['-', ':', '_', '/', '\\'];

impl RegexLexer {
    /// # Errors
    ///
    /// Returns [`ClusterError::InvalidConfig`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, ClusterError> {
        let regex = Regex::new(pattern).map_err(|e| {
            ClusterError::InvalidConfig(format!("lexer_pattern does not compile: {e}"))
        })?;
        Ok(Self { regex })
    }
}

impl Tokenizer for RegexLexer {
    fn split<'a>(&self, content: &'a str) -> Vec<&'a str> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        self.regex
            .find_iter(content)
            .map(|m| m.as_str().trim_matches(TRIM_CHARS.as_slice()))
            .filter(|v| !v.trim().is_empty())
            .flat_map(|v| v.split('_'))
            .filter(|v| v.chars().nth(1).is_some())
            .collect()
    }
}
