use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use ratatui::style::{Color, Modifier, Style};
use serde::{Deserialize, Serialize};

use crate::layout::BoxStyle;
use crate::span::StatusClass;

const DEFAULT_ENV_PREFIX: &str = "ALT_TIMELINE";
const APP_DIR: &str = "alt-timeline";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineConfig {
    #[serde(default = "default_true")]
    pub show_status_line: bool,
    #[serde(default = "default_true")]
    pub show_action_line: bool,
    #[serde(default = "default_true")]
    pub show_timestamp: bool,
    #[serde(default = "default_true")]
    pub shorten_urls: bool,
    #[serde(default = "default_true")]
    pub box_boosted_content: bool,
    #[serde(default)]
    // Positive: absolute columns. Zero or negative: relative to the surface.
    pub box_width: Option<i32>,
    #[serde(default)]
    pub box_prefix: String,
    #[serde(default)]
    pub box_style: BoxStyle,
    #[serde(default)]
    pub status_faces: StatusFaces,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            show_status_line: true,
            show_action_line: true,
            show_timestamp: true,
            shorten_urls: true,
            box_boosted_content: true,
            box_width: None,
            box_prefix: String::new(),
            box_style: BoxStyle::default(),
            status_faces: StatusFaces::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FaceSpec {
    #[serde(default)]
    pub fg: Option<String>,
    #[serde(default)]
    pub bg: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub dim: bool,
}

impl FaceSpec {
    fn fg(color: &str) -> Self {
        Self {
            fg: Some(color.to_string()),
            ..Self::default()
        }
    }

    pub fn to_style(&self) -> Style {
        let mut style = Style::default();
        if let Some(color) = self.fg.as_deref().and_then(|raw| Color::from_str(raw).ok()) {
            style = style.fg(color);
        }
        if let Some(color) = self.bg.as_deref().and_then(|raw| Color::from_str(raw).ok()) {
            style = style.bg(color);
        }
        let mut modifiers = Modifier::empty();
        if self.bold {
            modifiers |= Modifier::BOLD;
        }
        if self.italic {
            modifiers |= Modifier::ITALIC;
        }
        if self.underline {
            modifiers |= Modifier::UNDERLINED;
        }
        if self.dim {
            modifiers |= Modifier::DIM;
        }
        style.add_modifier(modifiers)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusFaces {
    #[serde(default = "default_face_default")]
    pub default: FaceSpec,
    #[serde(default = "default_face_active")]
    pub active: FaceSpec,
    #[serde(default = "default_face_user")]
    pub user: FaceSpec,
}

impl Default for StatusFaces {
    fn default() -> Self {
        Self {
            default: default_face_default(),
            active: default_face_active(),
            user: default_face_user(),
        }
    }
}

fn default_face_default() -> FaceSpec {
    FaceSpec {
        dim: true,
        ..FaceSpec::fg("darkgray")
    }
}

fn default_face_active() -> FaceSpec {
    FaceSpec::fg("gray")
}

fn default_face_user() -> FaceSpec {
    FaceSpec {
        bold: true,
        ..FaceSpec::fg("yellow")
    }
}

impl StatusFaces {
    pub fn style_for(&self, class: StatusClass) -> Style {
        match class {
            StatusClass::Default => self.default.to_style(),
            StatusClass::Active => self.active.to_style(),
            StatusClass::User => self.user.to_style(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_media_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_thumbnail_px")]
    pub thumbnail_px: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_workers(),
            timeout: default_media_timeout(),
            thumbnail_px: default_thumbnail_px(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_media_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_thumbnail_px() -> u32 {
    96
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            file: None,
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    let path = options.config_file.clone().or_else(default_config_path);
    if let Some(path) = path.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim(),
        "1" | "true" | "TRUE" | "True" | "yes" | "YES"
    )
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "timeline.show_status_line" => cfg.timeline.show_status_line = truthy(&value),
        "timeline.show_action_line" => cfg.timeline.show_action_line = truthy(&value),
        "timeline.show_timestamp" => cfg.timeline.show_timestamp = truthy(&value),
        "timeline.shorten_urls" => cfg.timeline.shorten_urls = truthy(&value),
        "timeline.box_boosted_content" => cfg.timeline.box_boosted_content = truthy(&value),
        "timeline.box_width" => {
            cfg.timeline.box_width = value.trim().parse::<i32>().ok();
        }
        "timeline.box_prefix" => cfg.timeline.box_prefix = value,
        "timeline.box_style" => cfg.timeline.box_style = BoxStyle::from_name(&value),
        "media.enabled" => cfg.media.enabled = truthy(&value),
        "media.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.workers = parsed;
            }
        }
        "media.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.timeout = duration;
            }
        }
        "media.thumbnail_px" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.media.thumbnail_px = parsed;
            }
        }
        "feed.file" => cfg.feed.file = Some(PathBuf::from(value)),
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "log.level" => cfg.log.level = value,
        "log.dir" => cfg.log.dir = Some(PathBuf::from(value)),
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}

pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(APP_DIR))
}
