// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::collections::VecDeque;
use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering::SeqCst };
use std::time::Instant;
use image::GrayImage;
use parking_lot::Mutex;

use crate::error::{ Result, TrackerError };
use crate::frame::{ ColorConversion, PixelFormat, RawImage };
use crate::frame_source::FrameSource;
use crate::pyramid::Pyramid;
use crate::result::{ CompletionSlot, PendingResult, TrackingResult };
use crate::tracker_params::TrackerParams;
use crate::vision::{ DetectionScratch, NativeBackend, TermCriteria, VisionBackend };

/// Everything a tick mutates. Owned by the tracker, released on shutdown.
struct FrameBuffers {
    source: Box<dyn FrameSource>,
    previous: GrayImage,
    current: GrayImage,
    prev_pyramid: Pyramid,
    curr_pyramid: Pyramid,
    scratch: DetectionScratch,
}

struct Tick {
    sequence: u64,
    slot: Arc<CompletionSlot>,
    prev_timestamp: f64,
    curr_timestamp: f64,
}

#[derive(Default)]
struct TickQueue {
    pending: VecDeque<Tick>,
    running: bool,
    issued: u64,
    last_timestamp: f64,
}

struct Shared {
    backend: Arc<dyn VisionBackend>,
    params: TrackerParams,
    criteria: TermCriteria,
    size: (u32, u32),
    buffers: Mutex<Option<FrameBuffers>>,
    queue: Mutex<TickQueue>,
    disposed: AtomicBool,
}

/// Sparse optical flow between consecutive frames of a frame source.
///
/// Corners are detected fresh on the previous frame every tick and tracked into the current one,
/// there is no track identity across ticks. Ticks run on the shared worker pool, strictly one after another
/// in the order `compute_flow` was called.
pub struct OpticalFlowTracker {
    shared: Arc<Shared>,
    started: Instant,
}

impl OpticalFlowTracker {
    pub fn initialize<S, B>(mut source: S, backend: B, params: TrackerParams) -> Result<Self>
    where S: FrameSource + 'static, B: VisionBackend + 'static {
        params.validate()?;
        let backend: Arc<dyn VisionBackend> = Arc::new(backend);

        let first = source.acquire_frame()?;
        if first.is_empty() {
            return Err(TrackerError::capture(format!("{} delivered an empty frame", source.describe())));
        }
        let (w, h) = first.size();
        log::info!("Capture info: size {}x{}, source: {}, backend: {}", w, h, source.describe(), backend.name());

        let gray = to_gray(backend.as_ref(), &first)?;
        let previous = GrayImage::from_raw(w, h, gray.data)
            .ok_or_else(|| TrackerError::InvalidBuffer(format!("grayscale frame does not fit {}x{}", w, h)))?;

        let buffers = FrameBuffers {
            source: Box::new(source),
            previous,
            current: GrayImage::new(w, h),
            prev_pyramid: Pyramid::new(w, h, params.optical_flow_pyramid),
            curr_pyramid: Pyramid::new(w, h, params.optical_flow_pyramid),
            scratch: DetectionScratch::new(w, h),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                params,
                criteria: TermCriteria::default(),
                size: (w, h),
                buffers: Mutex::new(Some(buffers)),
                queue: Mutex::new(TickQueue::default()),
                disposed: AtomicBool::new(false),
            }),
            started: Instant::now(),
        })
    }

    pub fn with_native_backend<S: FrameSource + 'static>(source: S, params: TrackerParams) -> Result<Self> {
        Self::initialize(source, NativeBackend, params)
    }

    pub fn capture_size(&self) -> (u32, u32) { self.shared.size }
    pub fn params(&self) -> &TrackerParams { &self.shared.params }
    pub fn backend_name(&self) -> &'static str { self.shared.backend.name() }
    pub fn is_disposed(&self) -> bool { self.shared.disposed.load(SeqCst) }

    /// Queues one tick and returns immediately.
    pub fn compute_flow(&self) -> Result<PendingResult> {
        if self.is_disposed() {
            return Err(TrackerError::Disposed);
        }
        let slot = CompletionSlot::new();

        let mut q = self.shared.queue.lock();
        let prev_timestamp = q.last_timestamp;
        let curr_timestamp = self.started.elapsed().as_secs_f64().max(prev_timestamp);
        q.last_timestamp = curr_timestamp;
        let sequence = q.issued;
        q.issued += 1;
        q.pending.push_back(Tick { sequence, slot: slot.clone(), prev_timestamp, curr_timestamp });
        let start_worker = !q.running;
        q.running = true;
        drop(q);

        if start_worker {
            let shared = self.shared.clone();
            crate::THREAD_POOL.spawn(move || shared.drain());
        }
        Ok(PendingResult::new(slot, prev_timestamp, curr_timestamp))
    }

    /// Releases all frame buffers and the frame source. Waits for a tick that is currently running.
    pub fn shutdown(&self) {
        if self.shared.disposed.swap(true, SeqCst) {
            return;
        }
        let released = self.shared.buffers.lock().take();
        let dropped = self.shared.queue.lock().pending.len();
        if dropped > 0 {
            log::warn!("Shutting down with {} queued ticks, they will not complete", dropped);
        }
        drop(released);
        log::debug!("Optical flow tracker disposed");
    }
}

impl Drop for OpticalFlowTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn drain(&self) {
        loop {
            let tick = {
                let mut q = self.queue.lock();
                match q.pending.pop_front() {
                    Some(t) => t,
                    None => { q.running = false; return; }
                }
            };
            match panic::catch_unwind(AssertUnwindSafe(|| self.run_tick(&tick))) {
                Ok(Ok(result)) => {
                    log::debug!("Tick {}: {} corners, {} tracked", tick.sequence, result.corner_count, result.tracked_count());
                    tick.slot.complete(result);
                }
                Ok(Err(TrackerError::Disposed)) => log::warn!("Tick {} issued after shutdown, dropping it", tick.sequence),
                Ok(Err(e)) => log::error!("Tick {} failed: {}", tick.sequence, e),
                Err(payload) => log::error!("Tick {} panicked: {}", tick.sequence, panic_message(&*payload)),
            }
        }
    }

    fn run_tick(&self, tick: &Tick) -> Result<TrackingResult> {
        let mut guard = self.buffers.lock();
        let b = guard.as_mut().ok_or(TrackerError::Disposed)?;
        let backend = self.backend.as_ref();
        let params = &self.params;

        let frame = b.source.acquire_frame()?;
        if frame.size() != self.size {
            return Err(TrackerError::FrameSizeMismatch { expected: self.size, got: frame.size() });
        }
        let gray = to_gray(backend, &frame)?;
        if gray.data.len() != b.current.len() {
            return Err(TrackerError::InvalidBuffer(format!("grayscale frame has {} bytes, expected {}", gray.data.len(), b.current.len())));
        }
        b.current.copy_from_slice(&gray.data);

        let mut prev_corners = backend.detect_corners(&b.previous, &mut b.scratch, params.feature_count, params.feature_quality, params.feature_min_dist)?;
        prev_corners.truncate(params.feature_count);

        let flow = backend.track_optical_flow(&b.previous, &b.current, &mut b.prev_pyramid, &mut b.curr_pyramid,
                                              &prev_corners, params.optical_flow_win_size, self.criteria)?;
        let n = prev_corners.len();
        if flow.corners.len() != n || flow.status.len() != n || flow.error.len() != n {
            return Err(TrackerError::InvalidBuffer(format!("{} returned {}/{}/{} flow entries for {} corners",
                backend.name(), flow.corners.len(), flow.status.len(), flow.error.len(), n)));
        }

        // Deep copy, the current buffer is overwritten by the next tick
        b.previous.copy_from_slice(b.current.as_raw());

        let rgb = to_rgb(backend, &frame)?;

        Ok(TrackingResult {
            sequence: tick.sequence,
            width: self.size.0,
            height: self.size.1,
            rgb: rgb.data,
            prev_corners,
            curr_corners: flow.corners,
            corner_count: n,
            status: flow.status,
            error: flow.error,
            prev_timestamp: tick.prev_timestamp,
            curr_timestamp: tick.curr_timestamp,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload.downcast_ref::<&str>().copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn to_gray(backend: &dyn VisionBackend, frame: &RawImage) -> Result<RawImage> {
    match frame.format {
        PixelFormat::Gray8 => Ok(frame.clone()),
        PixelFormat::Bgr8  => backend.convert_color(frame, ColorConversion::BgrToGray),
        PixelFormat::Rgb8  => backend.convert_color(frame, ColorConversion::RgbToGray),
    }
}

fn to_rgb(backend: &dyn VisionBackend, frame: &RawImage) -> Result<RawImage> {
    match frame.format {
        PixelFormat::Rgb8  => Ok(frame.clone()),
        PixelFormat::Bgr8  => backend.convert_color(frame, ColorConversion::BgrToRgb),
        PixelFormat::Gray8 => backend.convert_color(frame, ColorConversion::GrayToRgb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::frame_source::{ square_frame, SyntheticSource };
    use crate::vision::TrackStatus;

    const TIMEOUT: Duration = Duration::from_secs(10);

    // Bright quadrant whose only corner sits at (x0, y0)
    fn quadrant_frame(w: u32, h: u32, x0: f32, y0: f32) -> RawImage {
        let ramp = |t: f32| ((t + 1.5) / 3.0).clamp(0.0, 1.0);
        let data = (0..h).flat_map(|y| (0..w).map(move |x| {
            (30.0 + 180.0 * ramp(x as f32 - x0) * ramp(y as f32 - y0)).round() as u8
        })).collect();
        RawImage::new(w, h, PixelFormat::Gray8, data).unwrap()
    }

    fn params(feature_count: usize) -> TrackerParams {
        TrackerParams { feature_count, feature_min_dist: 3.0, ..Default::default() }
    }

    fn assert_consistent(r: &TrackingResult, feature_count: usize) {
        assert_eq!(r.prev_corners.len(), r.corner_count);
        assert_eq!(r.curr_corners.len(), r.corner_count);
        assert_eq!(r.status.len(), r.corner_count);
        assert_eq!(r.error.len(), r.corner_count);
        assert!(r.corner_count <= feature_count);
        assert!(r.curr_timestamp >= r.prev_timestamp);
        assert_eq!(r.rgb.len(), 3 * r.width as usize * r.height as usize);
    }

    #[test]
    fn identical_frames_track_perfectly() {
        let frame = square_frame(64, 48, 20.0, 14.0, 16.0);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::repeat(frame), params(10)).unwrap();
        assert_eq!(tracker.capture_size(), (64, 48));

        let mut last_curr = 0.0;
        for _ in 0..5 {
            let r = tracker.compute_flow().unwrap().wait_timeout(TIMEOUT).expect("tick did not complete");
            assert_consistent(&r, 10);
            assert!(r.corner_count >= 4);
            assert!(r.status.iter().all(|s| *s == TrackStatus::Tracked));
            assert!(r.error.iter().all(|e| *e < 1e-3));
            for (a, b) in r.prev_corners.iter().zip(&r.curr_corners) {
                assert!((a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3);
            }
            assert_eq!(r.prev_timestamp, last_curr);
            last_curr = r.curr_timestamp;
        }
    }

    #[test]
    fn solid_color_gives_empty_result() {
        let frame = RawImage::filled(32, 24, PixelFormat::Bgr8, 77);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::repeat(frame), params(10)).unwrap();
        let pending = tracker.compute_flow().unwrap();
        let r = pending.wait_timeout(TIMEOUT).expect("tick did not complete");
        assert!(pending.is_complete());
        assert_eq!(r.corner_count, 0);
        assert!(r.prev_corners.is_empty() && r.curr_corners.is_empty() && r.status.is_empty() && r.error.is_empty());
        assert_eq!(&r.rgb[0..3], &[77, 77, 77]);
    }

    #[test]
    fn single_feature_moves_right() {
        let a = quadrant_frame(40, 30, 10.0, 10.0);
        let b = quadrant_frame(40, 30, 12.0, 10.0);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::alternate(a, b), params(1)).unwrap();
        let r = tracker.compute_flow().unwrap().wait_timeout(TIMEOUT).expect("tick did not complete");
        assert_consistent(&r, 1);
        assert_eq!(r.corner_count, 1);
        let (p, c) = (r.prev_corners[0], r.curr_corners[0]);
        assert!((p.0 - 10.0).abs() <= 1.5 && (p.1 - 10.0).abs() <= 1.5, "detected at {p:?}");
        assert_eq!(r.status[0], TrackStatus::Tracked);
        assert!((c.0 - p.0 - 2.0).abs() < 0.5 && (c.1 - p.1).abs() < 0.5, "tracked {p:?} -> {c:?}");
    }

    #[test]
    fn feature_count_caps_corners() {
        let frame = square_frame(64, 48, 20.0, 14.0, 16.0);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::repeat(frame), params(2)).unwrap();
        let r = tracker.compute_flow().unwrap().wait_timeout(TIMEOUT).unwrap();
        assert_consistent(&r, 2);
        assert_eq!(r.corner_count, 2);
    }

    #[test]
    fn back_to_back_ticks_run_in_order() {
        let frames = crate::frame_source::moving_square_scene(64, 48, 14, 1, 8);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::new(frames), params(8)).unwrap();
        let pending: Vec<_> = (0..6).map(|_| tracker.compute_flow().unwrap()).collect();
        let results: Vec<_> = pending.iter().map(|p| p.wait_timeout(TIMEOUT).expect("tick did not complete")).collect();
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.sequence, i as u64);
            assert_consistent(r, 8);
            if i > 0 {
                assert_eq!(r.prev_timestamp, results[i - 1].curr_timestamp);
            }
        }
        for p in &pending { assert!(p.is_complete()); }
    }

    #[test]
    fn compute_flow_after_shutdown_is_disposed() {
        let frame = square_frame(32, 32, 8.0, 8.0, 10.0);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::repeat(frame), params(4)).unwrap();
        tracker.shutdown();
        assert!(tracker.is_disposed());
        assert!(matches!(tracker.compute_flow(), Err(TrackerError::Disposed)));
        tracker.shutdown();
    }

    #[test]
    fn init_fails_without_frames() {
        let res = OpticalFlowTracker::with_native_backend(SyntheticSource::new(vec![]), params(4));
        assert!(matches!(res, Err(TrackerError::CaptureUnavailable(_))));
    }

    #[test]
    fn init_rejects_invalid_params() {
        let frame = square_frame(32, 32, 8.0, 8.0, 10.0);
        let res = OpticalFlowTracker::with_native_backend(SyntheticSource::repeat(frame), params(0));
        assert!(matches!(res, Err(TrackerError::InvalidParams(_))));
    }

    #[test]
    fn failed_tick_never_completes_and_later_ticks_still_run() {
        let frame = square_frame(32, 32, 8.0, 8.0, 10.0);
        let source = SyntheticSource::repeat(frame).with_limit(2);
        let delivered = source.delivered();
        let tracker = OpticalFlowTracker::with_native_backend(source, params(4)).unwrap();

        let first = tracker.compute_flow().unwrap();
        assert!(first.wait_timeout(TIMEOUT).is_some());
        let second = tracker.compute_flow().unwrap();
        let third = tracker.compute_flow().unwrap();
        assert!(third.wait_timeout(Duration::from_millis(200)).is_none());
        assert!(!second.is_complete());
        assert!(!third.is_complete());
        assert_eq!(delivered.load(SeqCst), 2);
    }

    // Panics on the given acquisition, 0 being the frame taken by initialize
    struct PanickingSource {
        frame: RawImage,
        calls: usize,
        panic_at: usize,
    }
    impl FrameSource for PanickingSource {
        fn acquire_frame(&mut self) -> Result<RawImage> {
            let call = self.calls;
            self.calls += 1;
            if call == self.panic_at { panic!("capture driver crashed"); }
            Ok(self.frame.clone())
        }
    }

    #[test]
    fn panicking_tick_does_not_stall_the_queue() {
        let source = PanickingSource { frame: square_frame(32, 32, 8.0, 8.0, 10.0), calls: 0, panic_at: 1 };
        let tracker = OpticalFlowTracker::with_native_backend(source, params(4)).unwrap();
        let first = tracker.compute_flow().unwrap();
        let second = tracker.compute_flow().unwrap();
        let r = second.wait_timeout(TIMEOUT).expect("tick after the panic did not complete");
        assert_eq!(r.sequence, 1);
        assert!(!first.is_complete());
        let third = tracker.compute_flow().unwrap();
        assert_eq!(third.wait_timeout(TIMEOUT).expect("queue stalled").sequence, 2);
    }

    #[test]
    fn size_change_fails_the_tick() {
        let a = square_frame(32, 32, 8.0, 8.0, 10.0);
        let b = square_frame(40, 32, 8.0, 8.0, 10.0);
        let tracker = OpticalFlowTracker::with_native_backend(SyntheticSource::alternate(a, b), params(4)).unwrap();
        let pending = tracker.compute_flow().unwrap();
        assert!(pending.wait_timeout(Duration::from_millis(200)).is_none());
    }
}
