// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Adrian <adrian.eddy at gmail>

use std::path::Path;
use crate::error::{ Result, TrackerError };

pub const MAX_PYRAMID_LEVELS: usize = 16;
pub const MAX_WIN_SIZE: u32 = 255;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub feature_count: usize,          // max corners per tick
    pub feature_quality: f32,          // relative to the strongest corner
    pub feature_min_dist: f32,         // pixels
    pub optical_flow_pyramid: usize,   // pyramid levels, 1 = no pyramid
    pub optical_flow_win_size: u32,    // search window side length
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            feature_count: 10,
            feature_quality: 0.01,
            feature_min_dist: 0.01,
            optical_flow_pyramid: 3,
            optical_flow_win_size: 10,
        }
    }
}

impl TrackerParams {
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading tracker params from {}", path.display());
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TrackerError::InvalidParams(msg));
        if self.feature_count == 0 { return fail("feature_count must be at least 1".into()); }
        if !(self.feature_quality > 0.0 && self.feature_quality <= 1.0) { return fail(format!("feature_quality must be in (0, 1], got {}", self.feature_quality)); }
        if !(self.feature_min_dist >= 0.0) { return fail(format!("feature_min_dist must be non-negative, got {}", self.feature_min_dist)); }
        if !(1..=MAX_PYRAMID_LEVELS).contains(&self.optical_flow_pyramid) {
            return fail(format!("optical_flow_pyramid must be in [1, {}], got {}", MAX_PYRAMID_LEVELS, self.optical_flow_pyramid));
        }
        if !(3..=MAX_WIN_SIZE).contains(&self.optical_flow_win_size) {
            return fail(format!("optical_flow_win_size must be in [3, {}], got {}", MAX_WIN_SIZE, self.optical_flow_win_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn partial_json_keeps_defaults() {
        let p = TrackerParams::from_json(r#"{ "feature_count": 50, "optical_flow_win_size": 21 }"#).unwrap();
        assert_eq!(p.feature_count, 50);
        assert_eq!(p.optical_flow_win_size, 21);
        assert_eq!(p.optical_flow_pyramid, 3);
        assert_eq!(p.feature_quality, 0.01);
    }

    #[test_case(r#"{ "feature_count": 0 }"#; "zero features")]
    #[test_case(r#"{ "feature_quality": 0.0 }"#; "zero quality")]
    #[test_case(r#"{ "feature_quality": 1.5 }"#; "quality above one")]
    #[test_case(r#"{ "feature_min_dist": -1.0 }"#; "negative distance")]
    #[test_case(r#"{ "optical_flow_pyramid": 0 }"#; "no pyramid levels")]
    #[test_case(r#"{ "optical_flow_pyramid": 40 }"#; "too many pyramid levels")]
    #[test_case(r#"{ "optical_flow_win_size": 2 }"#; "tiny window")]
    #[test_case(r#"{ "optical_flow_win_size": 50000 }"#; "huge window")]
    fn rejects_invalid(json: &str) {
        assert!(matches!(TrackerParams::from_json(json), Err(TrackerError::InvalidParams(_))));
    }

    #[test]
    fn accepts_upper_bounds() {
        let p = TrackerParams { optical_flow_pyramid: MAX_PYRAMID_LEVELS, optical_flow_win_size: MAX_WIN_SIZE, ..Default::default() };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(TrackerParams::from_json("{ feature_count"), Err(TrackerError::JsonError(_))));
    }
}
