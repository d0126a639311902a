// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::path::PathBuf;
use flowtrack_core::{ ResultSink, Result, TrackerError, TrackingResult, TrackStatus };
use image::{ Rgb, RgbImage };

/// One log line per tick.
#[derive(Default)]
pub struct LogSink {
    ticks: usize,
    corners: usize,
    tracked: usize,
}

impl ResultSink for LogSink {
    fn consume(&mut self, r: &TrackingResult) -> Result<()> {
        let tracked = r.tracked_count();
        let mean_motion = mean_motion(r);
        log::info!("Tick {:>4} [{:.3}s -> {:.3}s] corners: {:>3}, tracked: {:>3}, mean motion: {:.2}px",
            r.sequence, r.prev_timestamp, r.curr_timestamp, r.corner_count, tracked, mean_motion);
        self.ticks += 1;
        self.corners += r.corner_count;
        self.tracked += tracked;
        Ok(())
    }
    fn finish(&mut self) -> Result<()> {
        if self.ticks > 0 {
            log::info!("{} ticks, {:.1} corners per tick, {:.1}% tracked", self.ticks, self.corners as f64 / self.ticks as f64,
                if self.corners > 0 { 100.0 * self.tracked as f64 / self.corners as f64 } else { 0.0 });
        }
        Ok(())
    }
}

fn mean_motion(r: &TrackingResult) -> f32 {
    let (sum, n) = r.tracked_pairs().fold((0.0f32, 0usize), |(sum, n), (a, b)| {
        (sum + ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt(), n + 1)
    });
    if n > 0 { sum / n as f32 } else { 0.0 }
}

/// Prints every result as a JSON line on stdout.
pub struct JsonSink;

impl ResultSink for JsonSink {
    fn consume(&mut self, r: &TrackingResult) -> Result<()> {
        println!("{}", serde_json::to_string(r)?);
        Ok(())
    }
}

/// Writes the RGB frame of every tick as PNG, with tracked corners in green and lost ones in red.
pub struct ExportSink {
    dir: PathBuf,
}

impl ExportSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        log::info!("Exporting frames to {}", dir.display());
        Ok(Self { dir })
    }
}

impl ResultSink for ExportSink {
    fn consume(&mut self, r: &TrackingResult) -> Result<()> {
        let img = annotate(r)?;
        let path = self.dir.join(format!("frame_{:05}.png", r.sequence));
        img.save(&path)?;
        log::debug!("Saved {}", path.display());
        Ok(())
    }
}

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

pub fn annotate(r: &TrackingResult) -> Result<RgbImage> {
    let mut img = RgbImage::from_raw(r.width, r.height, r.rgb.clone())
        .ok_or_else(|| TrackerError::InvalidBuffer(format!("{} bytes do not fit {}x{} RGB", r.rgb.len(), r.width, r.height)))?;
    for ((from, to), status) in r.prev_corners.iter().zip(&r.curr_corners).zip(&r.status) {
        match status {
            TrackStatus::Tracked => {
                draw_line(&mut img, *from, *to, GREEN);
                draw_cross(&mut img, *to, 2, GREEN);
            }
            TrackStatus::Lost => draw_cross(&mut img, *from, 2, RED),
        }
    }
    Ok(img)
}

fn put(img: &mut RgbImage, x: i64, y: i64, c: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, c);
    }
}

fn draw_cross(img: &mut RgbImage, p: (f32, f32), r: i64, c: Rgb<u8>) {
    let (x, y) = (p.0.round() as i64, p.1.round() as i64);
    for d in -r..=r {
        put(img, x + d, y, c);
        put(img, x, y + d, c);
    }
}

// Bresenham
fn draw_line(img: &mut RgbImage, a: (f32, f32), b: (f32, f32), c: Rgb<u8>) {
    let (mut x0, mut y0) = (a.0.round() as i64, a.1.round() as i64);
    let (x1, y1) = (b.0.round() as i64, b.1.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, c);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> TrackingResult {
        TrackingResult {
            width: 16,
            height: 8,
            rgb: vec![0; 16 * 8 * 3],
            prev_corners: vec![(2.0, 2.0), (12.0, 5.0)],
            curr_corners: vec![(6.0, 2.0), (12.0, 5.0)],
            corner_count: 2,
            status: vec![TrackStatus::Tracked, TrackStatus::Lost],
            error: vec![0.5, f32::MAX],
            ..Default::default()
        }
    }

    #[test]
    fn annotate_marks_tracked_and_lost() {
        let img = annotate(&result()).unwrap();
        for x in 2..=6 { assert_eq!(*img.get_pixel(x, 2), GREEN); }
        assert_eq!(*img.get_pixel(12, 5), RED);
        assert_eq!(*img.get_pixel(0, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn annotate_rejects_short_buffer() {
        let mut r = result();
        r.rgb.truncate(10);
        assert!(annotate(&r).is_err());
    }

    #[test]
    fn mean_motion_ignores_lost() {
        assert_eq!(mean_motion(&result()), 4.0);
    }

    #[test]
    fn export_writes_png() {
        let dir = std::env::temp_dir().join(format!("flowtrack-export-{}", std::process::id()));
        let mut sink = ExportSink::new(&dir).unwrap();
        sink.consume(&result()).unwrap();
        assert!(dir.join("frame_00000.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
