use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema error: missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("io error: {0}")]
    Io(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}
