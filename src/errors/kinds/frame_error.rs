#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameErrorKind {
    TooShort,
    TooLong,
    LengthMismatch,
    InvalidFormat,
    InvalidHeader,
    InvalidEncoding,
    UnsupportedSubFunction,
    UnexpectedResponse,
}

impl std::fmt::Display for FrameErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "Frame too short"),
            Self::TooLong => write!(f, "Frame too long"),
            Self::LengthMismatch => write!(f, "Declared length does not match frame"),
            Self::InvalidFormat => write!(f, "Invalid frame format"),
            Self::InvalidHeader => write!(f, "Invalid frame header"),
            Self::InvalidEncoding => write!(f, "Invalid frame encoding"),
            Self::UnsupportedSubFunction => write!(f, "Unsupported sub-function code"),
            Self::UnexpectedResponse => write!(f, "Unexpected response"),
        }
    }
}
