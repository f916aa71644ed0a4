//! Zoom requests, zoom state and zoom level arithmetic
//!
//! Layouts resolve a [`ZoomRequest`] into a concrete factor, clamp it to the
//! configured bounds and keep a [`ZoomState`] describing whether further
//! stepping in either direction is possible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Zoom levels used when the configuration does not list any
pub const DEFAULT_ZOOM_LEVELS: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0];

/// A level this close to its predecessor (as a ratio) is merged into it
pub const ZOOM_LEVEL_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Tolerance for comparing zoom factors
pub const ZOOM_EPSILON: f64 = 1e-6;

#[must_use]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= ZOOM_EPSILON
}

/// Zoom factors derived from the viewport rather than given as numbers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomMode {
    Auto,
    FitWidth,
    FitHeight,
}

impl ZoomMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoomMode::Auto => "auto",
            ZoomMode::FitWidth => "fitwidth",
            ZoomMode::FitHeight => "fitheight",
        }
    }
}

/// Stepping direction through the zoom levels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Argument of `set_zoom`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawZoom", into = "RawZoom")]
pub enum ZoomRequest {
    Value(f64),
    Mode(ZoomMode),
    Step(ZoomDirection),
}

impl Default for ZoomRequest {
    fn default() -> Self {
        ZoomRequest::Mode(ZoomMode::Auto)
    }
}

impl fmt::Display for ZoomRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomRequest::Value(value) => write!(f, "{value}"),
            ZoomRequest::Mode(mode) => f.write_str(mode.as_str()),
            ZoomRequest::Step(ZoomDirection::In) => f.write_str("in"),
            ZoomRequest::Step(ZoomDirection::Out) => f.write_str("out"),
        }
    }
}

impl FromStr for ZoomRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ZoomRequest::Mode(ZoomMode::Auto)),
            "fitwidth" => Ok(ZoomRequest::Mode(ZoomMode::FitWidth)),
            "fitheight" => Ok(ZoomRequest::Mode(ZoomMode::FitHeight)),
            "in" => Ok(ZoomRequest::Step(ZoomDirection::In)),
            "out" => Ok(ZoomRequest::Step(ZoomDirection::Out)),
            other => match other.parse::<f64>() {
                Ok(value) if value.is_finite() && value > 0.0 => Ok(ZoomRequest::Value(value)),
                _ => Err(format!("invalid zoom '{s}'")),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawZoom {
    Number(f64),
    Name(String),
}

impl TryFrom<RawZoom> for ZoomRequest {
    type Error = String;

    fn try_from(raw: RawZoom) -> Result<Self, Self::Error> {
        match raw {
            RawZoom::Number(value) if value.is_finite() && value > 0.0 => {
                Ok(ZoomRequest::Value(value))
            }
            RawZoom::Number(value) => Err(format!("invalid zoom {value}")),
            RawZoom::Name(name) => name.parse(),
        }
    }
}

impl From<ZoomRequest> for RawZoom {
    fn from(request: ZoomRequest) -> Self {
        match request {
            ZoomRequest::Value(value) => RawZoom::Number(value),
            other => RawZoom::Name(other.to_string()),
        }
    }
}

/// Zoom part of a layout's state
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoomState {
    pub zoom: f64,
    pub prev_zoom: f64,
    /// Named mode the current zoom landed on, if any
    pub zoom_mode: Option<ZoomMode>,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub can_zoom_in: bool,
    pub can_zoom_out: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            prev_zoom: 1.0,
            zoom_mode: None,
            min_zoom: DEFAULT_ZOOM_LEVELS[0],
            max_zoom: DEFAULT_ZOOM_LEVELS[DEFAULT_ZOOM_LEVELS.len() - 1],
            can_zoom_in: false,
            can_zoom_out: false,
        }
    }
}

impl ZoomState {
    #[must_use]
    pub fn clamp(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return self.zoom;
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Merge configured levels with the viewport presets.
///
/// The result is sorted and free of duplicates. A level within
/// [`ZOOM_LEVEL_SIMILARITY_THRESHOLD`] of its predecessor is dropped, unless
/// it is a preset, in which case it replaces the predecessor.
#[must_use]
pub fn merge_zoom_levels(configured: &[f64], presets: &[f64]) -> Vec<f64> {
    let mut all: Vec<f64> = configured
        .iter()
        .chain(presets)
        .copied()
        .filter(|zoom| zoom.is_finite() && *zoom > 0.0)
        .collect();
    all.sort_by(f64::total_cmp);

    let is_preset = |zoom: f64| presets.iter().any(|preset| approx_eq(*preset, zoom));

    let mut levels: Vec<f64> = Vec::with_capacity(all.len());
    for level in all {
        let Some(&last) = levels.last() else {
            levels.push(level);
            continue;
        };
        if approx_eq(last, level) {
            continue;
        }
        if last / level < ZOOM_LEVEL_SIMILARITY_THRESHOLD {
            levels.push(level);
        } else if is_preset(level) {
            levels.pop();
            levels.push(level);
        }
    }
    levels
}

/// Next level strictly beyond `current` in `direction`
#[must_use]
pub fn next_zoom_level(levels: &[f64], current: f64, direction: ZoomDirection) -> Option<f64> {
    match direction {
        ZoomDirection::In => levels
            .iter()
            .copied()
            .find(|level| *level > current + ZOOM_EPSILON),
        ZoomDirection::Out => levels
            .iter()
            .rev()
            .copied()
            .find(|level| *level < current - ZOOM_EPSILON),
    }
}

/// Auto zoom for layouts that flow pages down the viewport.
///
/// Mobile viewports fit the width even beyond 100%. Elsewhere auto zoom never
/// magnifies: portrait documents fit the width, landscape documents fit the
/// whole page.
#[must_use]
pub fn flow_auto_zoom(fit_width: f64, fit_height: f64, landscape: bool, mobile: bool) -> f64 {
    if mobile {
        return fit_width;
    }
    if landscape {
        fit_width.min(fit_height).min(1.0)
    } else {
        fit_width.min(1.0)
    }
}
