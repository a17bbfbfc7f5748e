/// Convenience result type used across clipforge.
pub type ClipforgeResult<T> = Result<T, ClipforgeError>;

/// Top-level error taxonomy used by compiler APIs.
#[derive(thiserror::Error, Debug)]
pub enum ClipforgeError {
    /// Invalid user-provided composition data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A node cannot be resolved (no prompt, no source, no model bound).
    #[error("resolution error: {0}")]
    Resolution(String),

    /// The bound generation provider failed.
    #[error("provider error ({provider}/{model}): {message}")]
    Provider {
        /// Provider identity of the failing binding.
        provider: String,
        /// Model identity of the failing binding.
        model: String,
        /// Provider-reported failure.
        message: String,
    },

    /// The durable cache failed to read or write.
    #[error("cache io error: {0}")]
    CacheIo(String),

    /// A timeline cannot be expressed in the requested format.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller aborted the run before a provider call was issued.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClipforgeError {
    /// Build a [`ClipforgeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ClipforgeError::Resolution`] value.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Build a [`ClipforgeError::Provider`] value.
    pub fn provider(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
        }
    }

    /// Build a [`ClipforgeError::CacheIo`] value.
    pub fn cache_io(msg: impl Into<String>) -> Self {
        Self::CacheIo(msg.into())
    }

    /// Build a [`ClipforgeError::Serialization`] value.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Build a [`ClipforgeError::Cancelled`] value.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Whether the walker may recover from this error by skipping the node.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }
}

// Resolution outcomes are shared between every waiter on the same cache key, so the error has to
// be duplicable. `anyhow::Error` is not `Clone`; its rendered chain is carried over instead.
impl Clone for ClipforgeError {
    fn clone(&self) -> Self {
        match self {
            Self::Validation(m) => Self::Validation(m.clone()),
            Self::Resolution(m) => Self::Resolution(m.clone()),
            Self::Provider {
                provider,
                model,
                message,
            } => Self::Provider {
                provider: provider.clone(),
                model: model.clone(),
                message: message.clone(),
            },
            Self::CacheIo(m) => Self::CacheIo(m.clone()),
            Self::Serialization(m) => Self::Serialization(m.clone()),
            Self::Cancelled(m) => Self::Cancelled(m.clone()),
            Self::Other(e) => Self::Other(anyhow::anyhow!("{e:#}")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
