#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormatKind {
    InvalidHeader,
    InvalidFormat,
    InvalidEncoding,
    UnsupportedSubFunction,
    UnexpectedResponse,
}

impl std::fmt::Display for FrameFormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHeader => write!(f, "Invalid frame header"),
            Self::InvalidFormat => write!(f, "Invalid frame format"),
            Self::InvalidEncoding => write!(f, "Invalid frame encoding"),
            Self::UnsupportedSubFunction => write!(f, "Unsupported sub-function code"),
            Self::UnexpectedResponse => write!(f, "Unexpected response"),
        }
    }
}
