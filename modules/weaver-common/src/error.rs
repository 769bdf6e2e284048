use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeaverError {
    #[error("Load error for '{src}': {reason}")]
    Load { src: String, reason: String },

    #[error("Execution error in signal '{signal_id}': {cause}")]
    Execution { signal_id: String, cause: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Registry integrity violation: {0}")]
    RegistryIntegrity(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl WeaverError {
    pub fn load(src: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        WeaverError::Load { src: src.into(), reason: reason.to_string() }
    }

    pub fn execution(signal_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        WeaverError::Execution { signal_id: signal_id.into(), cause: cause.to_string() }
    }
}
