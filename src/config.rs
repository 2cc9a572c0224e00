use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub curve: CurveConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
}

#[derive(Debug, Deserialize)]
pub struct CurveConfig {
    #[serde(default = "default_zoom")]
    pub zoom: usize,
    #[serde(default = "default_wave_scale")]
    pub wave_scale: f32,
    #[serde(default = "default_fill")]
    pub fill: [u8; 3],
    #[serde(default = "default_background")]
    pub background: [u8; 3],
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
        }
    }
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            zoom: default_zoom(),
            wave_scale: default_wave_scale(),
            fill: default_fill(),
            background: default_background(),
        }
    }
}

pub fn default_width() -> u32 { 1280 }
pub fn default_height() -> u32 { 720 }
pub fn default_fps() -> u32 { 60 }
pub fn default_crf() -> u32 { 18 }
pub fn default_codec() -> String { "libx264".into() }
pub fn default_zoom() -> usize { 4 }
pub fn default_wave_scale() -> f32 { 2.0 }
fn default_fill() -> [u8; 3] { [255, 0, 0] }
fn default_background() -> [u8; 3] { [0, 0, 0] }

/// Explicit path, else `wavecurve.toml` in the working directory, else the
/// per-user config file.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("wavecurve.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("wavecurve").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("wavecurve").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
