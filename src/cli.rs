// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use argh::FromArgs;
use std::time::{ Duration, Instant };
use indicatif::{ ProgressBar, ProgressStyle };
use flowtrack_core::*;
use flowtrack_core::frame_source::{ moving_square_scene, ImageSequenceSource, SyntheticSource };

use crate::sinks::{ ExportSink, JsonSink, LogSink };

/** flowtrack
Sparse optical flow tracking demo
*/
#[derive(FromArgs)]
pub struct Opts {
    /// frame source: synthetic, dir or camera, default: synthetic
    #[argh(option, short = 's', default = "String::from(\"synthetic\")")]
    pub source: String,

    /// directory with images for the `dir` source
    #[argh(option)]
    pub path: Option<String>,

    /// restart the image sequence when it ends
    #[argh(switch)]
    pub loop_sequence: bool,

    /// camera device index for the `camera` source, default: 0
    #[argh(option, default = "0")]
    pub device: i32,

    /// number of ticks to run, default: 100
    #[argh(option, short = 'n', default = "100")]
    pub ticks: usize,

    /// how long to wait for a tick before discarding it, in milliseconds, default: 2000
    #[argh(option, default = "2000")]
    pub timeout_ms: u64,

    /// stop after this many ticks in a row did not complete, default: 3
    #[argh(option, default = "3")]
    pub max_failures: usize,

    /// tracker parameters (file or content directly), eg. "{{ 'feature_count': 50, 'optical_flow_win_size': 21 }}"
    #[argh(option, short = 'p')]
    pub params: Option<String>,

    /// use the OpenCV vision backend (requires the `opencv` feature)
    #[argh(switch)]
    pub opencv: bool,

    /// export annotated frames as PNG into this directory
    #[argh(option, short = 'e')]
    pub export: Option<String>,

    /// print every result as a JSON line
    #[argh(switch)]
    pub json: bool,

    /// write the log to this file as well
    #[argh(option)]
    pub log_file: Option<String>,

    /// debug logging
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// print app version
    #[argh(switch)]
    pub version: bool,
}

fn load_params(params: Option<&str>) -> Result<TrackerParams> {
    match params {
        Some(p) if p.trim_start().starts_with('{') => TrackerParams::from_json(&p.replace('\'', "\"")),
        Some(p) if !p.is_empty() => TrackerParams::from_file(p),
        _ => Ok(TrackerParams::default()),
    }
}

fn open_source(opts: &Opts) -> Result<Box<dyn FrameSource>> {
    match opts.source.as_str() {
        "synthetic" => Ok(Box::new(SyntheticSource::new(moving_square_scene(320, 240, 60, 3, 60)))),
        "dir" => {
            let path = opts.path.as_deref().ok_or_else(|| TrackerError::capture("--path is required for the dir source"))?;
            Ok(Box::new(ImageSequenceSource::open(path, opts.loop_sequence)?))
        }
        #[cfg(feature = "opencv")]
        "camera" => Ok(Box::new(flowtrack_core::frame_source::CameraSource::open(opts.device)?)),
        #[cfg(not(feature = "opencv"))]
        "camera" => Err(TrackerError::capture(format!("camera {} needs a build with the `opencv` feature", opts.device))),
        other => Err(TrackerError::capture(format!("unknown source {:?}", other))),
    }
}

fn create_tracker(opts: &Opts, source: Box<dyn FrameSource>, params: TrackerParams) -> Result<OpticalFlowTracker> {
    #[cfg(feature = "opencv")]
    if opts.opencv {
        return OpticalFlowTracker::initialize(source, flowtrack_core::vision::OpenCVBackend, params);
    }
    #[cfg(not(feature = "opencv"))]
    if opts.opencv {
        log::warn!("Built without the `opencv` feature, using the native backend");
    }
    OpticalFlowTracker::initialize(source, NativeBackend, params)
}

pub fn run(opts: Opts) -> Result<()> {
    let params = load_params(opts.params.as_deref())?;
    log::debug!("Tracker params: {:?}", params);

    let source = open_source(&opts)?;
    let tracker = create_tracker(&opts, source, params)?;
    let (w, h) = tracker.capture_size();
    log::info!("Tracking {}x{} with the {} backend, {} ticks", w, h, tracker.backend_name(), opts.ticks);

    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(LogSink::default())];
    if opts.json { sinks.push(Box::new(JsonSink)); }
    if let Some(dir) = &opts.export { sinks.push(Box::new(ExportSink::new(dir)?)); }

    let pb = if opts.json { ProgressBar::hidden() } else { ProgressBar::new(opts.ticks as u64) };
    if let Ok(style) = ProgressStyle::with_template("[{bar:50.cyan/blue}] {pos:>5}/{len:5} {per_sec} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }

    let timeout = Duration::from_millis(opts.timeout_ms);
    let time = Instant::now();
    let mut failures = 0;
    for _ in 0..opts.ticks {
        let pending = tracker.compute_flow()?;
        match pending.wait_timeout(timeout) {
            Some(result) => {
                failures = 0;
                for sink in sinks.iter_mut() {
                    if let Err(e) = sink.consume(&result) {
                        log::error!("Sink failed: {}", e);
                    }
                }
                pb.set_message(format!("{} tracked", result.tracked_count()));
            }
            None => {
                failures += 1;
                let (prev, curr) = pending.timestamps();
                log::warn!("Tick [{:.3}s -> {:.3}s] did not complete within {:?}, discarding", prev, curr, timeout);
                if failures >= opts.max_failures {
                    log::error!("{} ticks in a row did not complete, stopping", failures);
                    break;
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    for sink in sinks.iter_mut() {
        sink.finish()?;
    }
    tracker.shutdown();
    log::info!("Done in {:.2}s", time.elapsed().as_secs_f64());
    Ok(())
}
