use thiserror::Error;

use super::{FrameFormatKind, FrameSizeKind};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame size error: {kind} - {details}")]
    Size {
        kind: FrameSizeKind,
        details: String,
        frame_data: Option<Vec<u8>>,
    },

    #[error("Frame format error: {kind} - {details}")]
    Format {
        kind: FrameFormatKind,
        details: String,
        frame_data: Option<Vec<u8>>,
    },

    #[error(
        "CRC error in {length} byte frame: calculated={calculated:04X}, received={received:04X}, frame={frame_hex}"
    )]
    Crc {
        calculated: u16,
        received: u16,
        length: usize,
        frame_hex: String,
    },

    #[error("LRC error: calculated={calculated:02X}, received={received:02X}, frame={frame_hex}")]
    Lrc {
        calculated: u8,
        received: u8,
        frame_hex: String,
    },
}

impl FrameError {
    /// Builds a CRC error from the frame body (without the trailing checksum).
    pub fn crc(calculated: u16, received: u16, frame: &[u8]) -> Self {
        FrameError::Crc {
            calculated,
            received,
            length: frame.len(),
            frame_hex: hex::encode(frame),
        }
    }

    pub fn lrc(calculated: u8, received: u8, frame: &[u8]) -> Self {
        FrameError::Lrc {
            calculated,
            received,
            frame_hex: hex::encode(frame),
        }
    }

    pub fn frame_data(&self) -> Option<&[u8]> {
        match self {
            FrameError::Size { frame_data, .. } | FrameError::Format { frame_data, .. } => {
                frame_data.as_deref()
            }
            _ => None,
        }
    }
}
