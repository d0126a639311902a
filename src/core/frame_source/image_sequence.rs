// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::path::{ Path, PathBuf };
use itertools::Itertools;
use walkdir::WalkDir;

use super::FrameSource;
use crate::error::{ Result, TrackerError };
use crate::frame::RawImage;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Image files of a directory, in file name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    index: usize,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, looping: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(TrackerError::capture(format!("{} is not a directory", dir.display())));
        }
        let files: Vec<PathBuf> = WalkDir::new(&dir).max_depth(1).into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|x| x.to_str()).map(|x| EXTENSIONS.contains(&x.to_ascii_lowercase().as_str())).unwrap_or(false))
            .sorted()
            .collect();
        log::info!("Found {} images in {}", files.len(), dir.display());
        Ok(Self { dir, files, index: 0, looping })
    }

    pub fn len(&self) -> usize { self.files.len() }
    pub fn is_empty(&self) -> bool { self.files.is_empty() }
}

impl FrameSource for ImageSequenceSource {
    fn acquire_frame(&mut self) -> Result<RawImage> {
        if self.files.is_empty() {
            return Err(TrackerError::capture(format!("no images in {}", self.dir.display())));
        }
        if self.index >= self.files.len() {
            if !self.looping {
                return Err(TrackerError::capture("end of image sequence"));
            }
            self.index = 0;
        }
        let path = &self.files[self.index];
        self.index += 1;
        let img = image::open(path).map_err(|e| TrackerError::capture(format!("{}: {}", path.display(), e)))?;
        Ok(RawImage::bgr_from_rgb(&img.to_rgb8()))
    }
    fn describe(&self) -> String { format!("image sequence {}", self.dir.display()) }
}
