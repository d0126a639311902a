// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use image::GrayImage;

/// Multi-resolution copies of a frame. Level 0 is full size, every next level is half of the previous one.
/// Storage is allocated once and rebuilt in place for every frame.
pub struct Pyramid {
    levels: Vec<GrayImage>,
}

impl Pyramid {
    pub fn new(width: u32, height: u32, num_levels: usize) -> Self {
        let mut levels = Vec::with_capacity(num_levels.max(1));
        let (mut w, mut h) = (width, height);
        for _ in 0..num_levels.max(1) {
            levels.push(GrayImage::new(w, h));
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize { self.levels.len() }
    pub fn level(&self, i: usize) -> &GrayImage { &self.levels[i] }
    pub fn levels(&self) -> &[GrayImage] { &self.levels }

    pub fn rebuild(&mut self, base: &GrayImage) {
        let Some((first, rest)) = self.levels.split_first_mut() else { return; };
        if first.dimensions() == base.dimensions() {
            first.copy_from_slice(base.as_raw());
        } else {
            *first = base.clone();
        }
        let mut prev: &GrayImage = first;
        for level in rest.iter_mut() {
            downsample_into(prev, level);
            prev = level;
        }
    }
}

// 2x2 box filter, edge pixels replicated
fn downsample_into(src: &GrayImage, dst: &mut GrayImage) {
    let (sw, sh) = src.dimensions();
    let (dw, dh) = dst.dimensions();
    for y in 0..dh {
        let sy0 = (y * 2).min(sh - 1);
        let sy1 = (y * 2 + 1).min(sh - 1);
        for x in 0..dw {
            let sx0 = (x * 2).min(sw - 1);
            let sx1 = (x * 2 + 1).min(sw - 1);
            let sum = src.get_pixel(sx0, sy0).0[0] as u32
                    + src.get_pixel(sx1, sy0).0[0] as u32
                    + src.get_pixel(sx0, sy1).0[0] as u32
                    + src.get_pixel(sx1, sy1).0[0] as u32;
            dst.put_pixel(x, y, image::Luma([((sum + 2) / 4) as u8]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_sizes_halve_down_to_one() {
        let p = Pyramid::new(10, 3, 4);
        let sizes: Vec<_> = p.levels().iter().map(|l| l.dimensions()).collect();
        assert_eq!(sizes, vec![(10, 3), (5, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn rebuild_averages_blocks() {
        let mut base = GrayImage::new(4, 4);
        for y in 0..2 { for x in 0..2 { base.put_pixel(x, y, image::Luma([200])); } }
        let mut p = Pyramid::new(4, 4, 2);
        p.rebuild(&base);
        assert_eq!(p.level(0), &base);
        assert_eq!(p.level(1).get_pixel(0, 0).0[0], 200);
        assert_eq!(p.level(1).get_pixel(1, 1).0[0], 0);
    }
}
