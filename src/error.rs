//! Error types for context construction and flag-data integrity.

/// Errors returned when building an invalid [`Context`](crate::Context).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    /// Context key is empty.
    #[error("context key must not be empty")]
    EmptyKey,

    /// Context kind is empty or contains characters outside `[a-zA-Z0-9._-]`.
    #[error("invalid context kind {0:?}")]
    InvalidKind(String),

    /// A multi-context contains two individual contexts of the same kind.
    #[error("duplicate context kind {0:?} in multi-context")]
    DuplicateKind(String),

    /// A multi-context must contain at least one individual context.
    #[error("multi-context must not be empty")]
    EmptyMultiContext,
}

/// Internal data-integrity failures detected during evaluation.
///
/// These are never returned to the caller. They are logged and folded into a
/// result with [`ErrorKind::MalformedFlag`](crate::ErrorKind::MalformedFlag),
/// so `evaluate` always produces a usable detail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlagDataError {
    #[error("variation index {0} is out of range")]
    VariationOutOfRange(i64),

    #[error("rollout has an empty variations list")]
    EmptyRolloutVariations,

    #[error("rule has neither a variation nor a rollout")]
    IncompleteVariationOrRollout,

    #[error("prerequisite cycle involving flag {0:?}")]
    PrerequisiteCycle(String),
}
