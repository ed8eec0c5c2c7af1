#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSizeKind {
    TooShort,
    TooLong,
    LengthMismatch,
}

impl std::fmt::Display for FrameSizeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "Frame too short"),
            Self::TooLong => write!(f, "Frame too long"),
            Self::LengthMismatch => write!(f, "Length mismatch"),
        }
    }
}
