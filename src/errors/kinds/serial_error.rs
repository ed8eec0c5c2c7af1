#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialErrorKind {
    OpenFailed,
    ConfigurationFailed,
    Other,
}

impl std::fmt::Display for SerialErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "Failed to open port"),
            Self::ConfigurationFailed => write!(f, "Failed to configure port"),
            Self::Other => write!(f, "Serial port failure"),
        }
    }
}
