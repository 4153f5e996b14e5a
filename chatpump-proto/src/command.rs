//! Reserved command tokens and message classification.
//!
//! A message is a command when its whole content, ignoring letter case,
//! equals one of the reserved tokens. Surrounding whitespace is significant:
//! `" !help"` is a normal chat message. Anything else is normal too.

/// Errors that can occur when building a [`CommandSet`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    /// A token was empty or whitespace only.
    #[error("command token must not be empty")]
    EmptyToken,

    /// A token contained interior whitespace.
    #[error("command token {0:?} must be a single word")]
    InvalidToken(String),
}

/// How the consumer should route a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Matches a reserved token; carries the normalized token.
    Command(String),
    /// Ordinary chat content.
    Normal,
}

impl Classification {
    /// Returns `true` for [`Classification::Command`].
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

/// Default tokens recognized when no configuration overrides them.
pub const DEFAULT_COMMAND_TOKENS: &[&str] = &["!addlistener", "!removelistener", "!help"];

/// A set of reserved command tokens, stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    tokens: Vec<String>,
}

impl CommandSet {
    /// Builds a set from the given tokens.
    ///
    /// Tokens are trimmed and lowercased; duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::EmptyToken`] for a blank token and
    /// [`CommandError::InvalidToken`] for one containing whitespace.
    pub fn new<I, S>(tokens: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                return Err(CommandError::EmptyToken);
            }
            if token.chars().any(char::is_whitespace) {
                return Err(CommandError::InvalidToken(token.to_string()));
            }
            let token = token.to_lowercase();
            if !normalized.contains(&token) {
                normalized.push(token);
            }
        }
        Ok(Self { tokens: normalized })
    }

    /// Classifies message content against the reserved tokens.
    #[must_use]
    pub fn classify(&self, content: &str) -> Classification {
        let candidate = content.to_lowercase();
        self.tokens
            .iter()
            .find(|token| **token == candidate)
            .map_or(Classification::Normal, |token| {
                Classification::Command(token.clone())
            })
    }

    /// Returns `true` if `content` is one of the reserved tokens.
    #[must_use]
    pub fn is_command(&self, content: &str) -> bool {
        self.classify(content).is_command()
    }

    /// Iterates over the normalized tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_COMMAND_TOKENS
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

/// Case-insensitive comparison of content to one token.
///
/// The token is trimmed, the content is not.
#[must_use]
pub fn matches_token(content: &str, token: &str) -> bool {
    content.to_lowercase() == token.trim().to_lowercase()
}
