use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("Logging initialization error: {0}")]
    Logging(String),

    #[error("Invalid log filter directive '{directive}': {details}")]
    LogFilter { directive: String, details: String },
}

impl InitializationError {
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }

    pub fn log_filter(directive: impl Into<String>, details: impl Into<String>) -> Self {
        Self::LogFilter {
            directive: directive.into(),
            details: details.into(),
        }
    }
}
