use serde::{Deserialize, Serialize};

/// Framing used on a serial line.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialEncoding {
    #[default]
    Rtu,
    Ascii,
}

impl std::fmt::Display for SerialEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialEncoding::Rtu => write!(f, "rtu"),
            SerialEncoding::Ascii => write!(f, "ascii"),
        }
    }
}
