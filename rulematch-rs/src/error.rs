use thiserror::Error;

use crate::ownership::parser::ParseError;

/// Errors raised while compiling enhancer matchers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnhancerError {
    /// The matcher key is not one of the known fields or aliases.
    #[error("unknown matcher '{key}'")]
    UnknownMatcher { key: String },

    /// A matcher expression is malformed. `column` is 1-based.
    #[error("{message} (column {column})")]
    InvalidSyntax { message: String, column: usize },
}

/// Errors raised while loading or validating ownership rules.
#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The schema was written by an incompatible version. The rule set must
    /// be treated as unusable.
    #[error("invalid schema $version: {found}")]
    SchemaVersion { found: serde_json::Value },

    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] serde_json::Error),

    #[error("unknown matcher type: {0}")]
    UnknownMatcherType(String),

    /// Owners that could not be resolved to a user or team, sorted.
    #[error("invalid rule owners: {}", .0.join(", "))]
    InvalidOwners(Vec<String>),
}
