// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use crate::error::Result;
use crate::frame::RawImage;

mod synthetic;      pub use synthetic::*;
mod image_sequence; pub use image_sequence::*;
#[cfg(feature = "use-opencv")] mod camera; #[cfg(feature = "use-opencv")] pub use camera::*;

/// Supplies successive frames. `acquire_frame` may block, it is only called from the tracker's worker.
pub trait FrameSource: Send {
    fn acquire_frame(&mut self) -> Result<RawImage>;

    fn describe(&self) -> String { "frame source".into() }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn acquire_frame(&mut self) -> Result<RawImage> { (**self).acquire_frame() }
    fn describe(&self) -> String { (**self).describe() }
}
