//! Error types for arch normalization.

use thiserror::Error;

/// Result type alias for archdiff operations.
pub type Result<T> = std::result::Result<T, ArchError>;

/// Errors that can occur while parsing, compiling or replaying an arch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchError {
    /// Input is not a well-formed arch document.
    #[error("arch parse error: {0}")]
    Parse(String),

    /// A tree could not be written back out.
    #[error("arch serialization error: {0}")]
    Serialize(String),

    /// An xpath expression outside the supported subset.
    #[error("invalid xpath expression: {0}")]
    InvalidExpression(String),

    /// An xpath resolves to more than one node, or to a node other than
    /// the one it was built for.
    #[error("xpath {expr} resolves to {matches} nodes")]
    AmbiguousLocation { expr: String, matches: usize },

    /// An xpath resolves to no node at all.
    #[error("xpath {0} matches no node")]
    TargetNotFound(String),

    /// A patch document that does not describe xpath operations.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// Replaying the compiled patch did not reproduce the new arch.
    #[error("compiled patch does not reproduce the new arch")]
    ReplayMismatch,

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ArchError {
    fn from(err: serde_json::Error) -> Self {
        ArchError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_location_message() {
        let err = ArchError::AmbiguousLocation {
            expr: "//group[1]".to_string(),
            matches: 2,
        };
        assert_eq!(err.to_string(), "xpath //group[1] resolves to 2 nodes");
    }

    #[test]
    fn test_json_error_becomes_config_error() {
        let err: ArchError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ArchError::Config(_)));
    }
}
