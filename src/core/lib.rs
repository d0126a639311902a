// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

pub mod error;
pub mod frame;
pub mod frame_source;
pub mod pyramid;
pub mod result;
pub mod tracker;
pub mod tracker_params;
pub mod vision;

pub use error::{ Result, TrackerError };
pub use frame::{ ColorConversion, PixelFormat, RawImage };
pub use frame_source::FrameSource;
pub use result::{ PendingResult, TrackingResult };
pub use tracker::OpticalFlowTracker;
pub use tracker_params::TrackerParams;
pub use vision::{ NativeBackend, Point, TrackStatus, VisionBackend };

lazy_static::lazy_static! {
    static ref THREAD_POOL: rayon::ThreadPool = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("flowtrack-worker-{}", i))
        .panic_handler(|_| log::error!("A task on the tracker thread pool panicked"))
        .build()
        .expect("failed to build the tracker thread pool");
}

/// Consumer of completed tick results, e.g. a display or an exporter.
pub trait ResultSink {
    fn consume(&mut self, result: &TrackingResult) -> Result<()>;

    fn finish(&mut self) -> Result<()> { Ok(()) }
}
