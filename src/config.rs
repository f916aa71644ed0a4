//! Viewer configuration
//!
//! One [`Config`] is shared by every component of a viewer through its
//! [`Scope`](crate::scope::Scope): a write made by one component is seen by
//! every later reader. Fields are grouped by who writes them:
//!
//! - host fields (everything deserialised) are set before the viewer starts;
//!   `layout` is later rewritten by `Viewer::set_layout` and by the
//!   vertical-single-column layout on init
//! - `metadata`, `num_pages` and `viewport` are written by the viewer
//! - `zoom` and `page` are written back by the active layout

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::data::DocumentMetadata;
use crate::error::ConfigError;
use crate::types::{Padding, Viewport};
use crate::zoom::{DEFAULT_ZOOM_LEVELS, ZoomRequest};

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "crocodoc";

static VIEWER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Configuration shared by reference across a viewer
pub type SharedConfig = Rc<RefCell<Config>>;

/// Page layout presented by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    #[default]
    Vertical,
    VerticalSingleColumn,
    Presentation,
    PresentationTwoPage,
    Text,
}

impl LayoutMode {
    pub const ALL: [LayoutMode; 5] = [
        LayoutMode::Vertical,
        LayoutMode::VerticalSingleColumn,
        LayoutMode::Presentation,
        LayoutMode::PresentationTwoPage,
        LayoutMode::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Vertical => "vertical",
            LayoutMode::VerticalSingleColumn => "vertical-single-column",
            LayoutMode::Presentation => "presentation",
            LayoutMode::PresentationTwoPage => "presentation-two-page",
            LayoutMode::Text => "text",
        }
    }
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown layout '{s}'"))
    }
}

/// Host capability flags, detected outside the viewer core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Small touch viewport; auto zoom may magnify
    pub mobile: bool,
    /// Rendering engine that caches web fonts across viewers by family name
    pub legacy_text_engine: bool,
    /// Native subpixel positioning of SVG text
    pub svg_subpixel_rendering: bool,
    /// Server-sent events transport available
    pub event_stream: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            mobile: false,
            legacy_text_engine: false,
            svg_subpixel_rendering: true,
            event_stream: true,
        }
    }
}

/// Asset paths relative to the document URL; `{{page}}` is substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetTemplates {
    pub svg: String,
    pub img: String,
    pub html: String,
    pub css: String,
    pub json: String,
}

impl Default for AssetTemplates {
    fn default() -> Self {
        Self {
            svg: "page-{{page}}.svg".to_string(),
            img: "page-{{page}}.png".to_string(),
            html: "text-{{page}}.html".to_string(),
            css: "stylesheet.css".to_string(),
            json: "info.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Viewer instance id; scopes fonts in legacy engines
    pub id: String,
    /// Base URL of the converted document assets
    pub url: String,
    pub query_params: BTreeMap<String, String>,
    pub template: AssetTemplates,
    pub layout: LayoutMode,
    pub zoom: ZoomRequest,
    pub zoom_levels: Vec<f64>,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    /// Page shown first (1-based)
    pub page: usize,
    pub enable_text_selection: bool,
    /// Render pages from SVG; PNG otherwise
    pub use_svg: bool,
    /// False while the document is still being converted
    pub conversion_is_complete: bool,
    pub realtime_url: Option<String>,
    pub page_padding: Padding,
    /// Pages beyond the visible ones to keep loaded on each side
    pub page_load_range: usize,
    pub fetch_workers: usize,
    pub capabilities: Capabilities,

    #[serde(skip)]
    pub metadata: Option<DocumentMetadata>,
    #[serde(skip)]
    pub num_pages: usize,
    #[serde(skip)]
    pub viewport: Viewport,
}

impl Default for Config {
    fn default() -> Self {
        let id = VIEWER_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            id: format!("crocodoc-viewer-{id}"),
            url: String::new(),
            query_params: BTreeMap::new(),
            template: AssetTemplates::default(),
            layout: LayoutMode::default(),
            zoom: ZoomRequest::default(),
            zoom_levels: DEFAULT_ZOOM_LEVELS.to_vec(),
            min_zoom: None,
            max_zoom: None,
            page: 1,
            enable_text_selection: true,
            use_svg: true,
            conversion_is_complete: true,
            realtime_url: None,
            page_padding: Padding::default(),
            page_load_range: 2,
            fetch_workers: 4,
            capabilities: Capabilities::default(),
            metadata: None,
            num_pages: 0,
            viewport: Viewport::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn shared(self) -> SharedConfig {
        Rc::new(RefCell::new(self))
    }

    /// `?key=value&...` built from `query_params`, or empty
    #[must_use]
    pub fn query_string(&self) -> String {
        if self.query_params.is_empty() {
            return String::new();
        }
        reqwest::Url::parse_with_params("http://localhost/", &self.query_params)
            .ok()
            .and_then(|encoded| encoded.query().map(|query| format!("?{query}")))
            .unwrap_or_default()
    }

    /// Document base URL, always ending in `/`
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.url.is_empty() || self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        }
    }

    /// Zoom levels in ascending order, falling back to the defaults
    #[must_use]
    pub fn sorted_zoom_levels(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = self
            .zoom_levels
            .iter()
            .copied()
            .filter(|level| level.is_finite() && *level > 0.0)
            .collect();
        if levels.is_empty() {
            levels = DEFAULT_ZOOM_LEVELS.to_vec();
        }
        levels.sort_by(f64::total_cmp);
        levels
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page == 0 {
            return Err(ConfigError::Invalid("page numbers start at 1".into()));
        }
        if self.fetch_workers == 0 {
            return Err(ConfigError::Invalid("fetch_workers must be at least 1".into()));
        }
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min_zoom {min} is greater than max_zoom {max}"
                )));
            }
        }
        Ok(())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` or YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {path:?}");
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Load the user config file, or defaults when there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                info!("Config file not found at {path:?}, using defaults");
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using default settings");
                Ok(Self::default())
            }
        }
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::zoom::ZoomMode;

    #[test]
    fn defaults_match_asset_layout() {
        let config = Config::default();
        assert!(config.id.starts_with("crocodoc-viewer-"));
        assert_eq!(config.template.svg, "page-{{page}}.svg");
        assert_eq!(config.template.json, "info.json");
        assert_eq!(config.zoom, ZoomRequest::Mode(ZoomMode::Auto));
        assert_eq!(config.page, 1);
        assert!(config.capabilities.svg_subpixel_rendering);
    }

    #[test]
    fn viewer_ids_are_unique() {
        assert_ne!(Config::default().id, Config::default().id);
    }

    #[test]
    fn query_string_encodes_params() {
        let mut config = Config::with_url("https://cdn.example.com/doc");
        assert_eq!(config.query_string(), "");

        config.query_params.insert("token".into(), "a b&c".into());
        config.query_params.insert("v".into(), "2".into());
        assert_eq!(config.query_string(), "?token=a+b%26c&v=2");

        config.query_params.insert("é=".into(), "x/y?".into());
        assert_eq!(config.query_string(), "?token=a+b%26c&v=2&%C3%A9%3D=x%2Fy%3F");
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        assert_eq!(Config::with_url("https://x/doc").base_url(), "https://x/doc/");
        assert_eq!(Config::with_url("https://x/doc/").base_url(), "https://x/doc/");
    }

    #[test]
    fn yaml_overrides_defaults() {
        let config = Config::from_yaml_str(
            "url: https://x/doc\nlayout: presentation-two-page\nzoom: fitwidth\npage: 3\ncapabilities:\n  mobile: true\n",
        )
        .unwrap();
        assert_eq!(config.layout, LayoutMode::PresentationTwoPage);
        assert_eq!(config.zoom, ZoomRequest::Mode(ZoomMode::FitWidth));
        assert_eq!(config.page, 3);
        assert!(config.capabilities.mobile);
        assert!(config.capabilities.event_stream);
        assert_eq!(config.template, AssetTemplates::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_yaml_str("page: 0\n").is_err());
        assert!(Config::from_yaml_str("min_zoom: 2.0\nmax_zoom: 1.0\n").is_err());
        assert!(Config::from_json_str("{\"zoom\": \"sideways\"}").is_err());
    }

    #[test]
    fn load_reads_json_and_yaml_files() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("viewer.json");
        let mut file = fs::File::create(&json_path).unwrap();
        write!(file, "{{\"url\": \"https://x/doc\", \"zoom\": 1.5}}").unwrap();
        let config = Config::load(&json_path).unwrap();
        assert_eq!(config.zoom, ZoomRequest::Value(1.5));

        let yaml_path = dir.path().join("viewer.yaml");
        fs::write(&yaml_path, "layout: text\n").unwrap();
        assert_eq!(Config::load(&yaml_path).unwrap().layout, LayoutMode::Text);

        assert!(matches!(
            Config::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn layout_mode_round_trips_names() {
        for mode in LayoutMode::ALL {
            assert_eq!(mode.as_str().parse::<LayoutMode>(), Ok(mode));
        }
    }
}
