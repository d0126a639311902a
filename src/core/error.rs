// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("Capture unavailable: {0}")]                     CaptureUnavailable(String),
    #[error("Tracker has been disposed")]                    Disposed,
    #[error("Invalid tracker parameters: {0}")]              InvalidParams(String),
    #[error("Frame size mismatch, expected {expected:?}, got {got:?}")]
    FrameSizeMismatch { expected: (u32, u32), got: (u32, u32) },
    #[error("Unsupported color conversion {conversion:?} for {format:?} input")]
    UnsupportedConversion { conversion: crate::frame::ColorConversion, format: crate::frame::PixelFormat },
    #[error("Invalid image buffer: {0}")]                    InvalidBuffer(String),
    #[error("IO error: {0:?}")]                              IOError(#[from] std::io::Error),
    #[error("JSON error: {0:?}")]                            JsonError(#[from] serde_json::Error),
    #[error("Image error: {0:?}")]                           ImageError(#[from] image::ImageError),
    #[cfg(feature = "use-opencv")]
    #[error("OpenCV error: {0:?}")]                          OpenCVError(#[from] opencv::Error),
}

impl TrackerError {
    pub fn capture<S: Into<String>>(msg: S) -> Self { Self::CaptureUnavailable(msg.into()) }
}
