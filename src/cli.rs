use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config;

/// Largest accepted video width or height.
pub const MAX_DIMENSION: u32 = 16384;

#[derive(Parser, Debug)]
#[command(name = "wavecurve", about = "Spectrum curve visualizer synchronized to audio playback")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Render to this video file instead of playing live in the terminal
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to wavecurve.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video width in pixels
    #[arg(long, default_value_t = config::default_width())]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = config::default_height())]
    pub height: u32,

    /// Spectrum frames per second
    #[arg(long, default_value_t = config::default_fps())]
    pub fps: u32,

    /// Draw every Nth frequency bin (must be at least 2)
    #[arg(long, default_value_t = config::default_zoom())]
    pub zoom: usize,

    /// Vertical scale applied to bin magnitudes
    #[arg(long, default_value_t = config::default_wave_scale())]
    pub wave_scale: f32,

    /// Start playback as soon as analysis completes, exit when it ends
    #[arg(long)]
    pub autostart: bool,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = config::default_crf())]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value_t = config::default_codec())]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,
}

impl Cli {
    /// Config values apply only where the command line is at its default.
    pub fn merge(&mut self, cfg: &config::Config) {
        if self.width == config::default_width() { self.width = cfg.output.width; }
        if self.height == config::default_height() { self.height = cfg.output.height; }
        if self.fps == config::default_fps() { self.fps = cfg.output.fps; }
        if self.crf == config::default_crf() { self.crf = cfg.output.crf; }
        if self.codec == config::default_codec() { self.codec = cfg.output.codec.clone(); }
        if self.zoom == config::default_zoom() { self.zoom = cfg.curve.zoom; }
        if self.wave_scale == config::default_wave_scale() { self.wave_scale = cfg.curve.wave_scale; }
    }

    pub fn sanitize(&mut self) -> Result<()> {
        if self.fps == 0 {
            log::warn!("fps must be positive, using {}", config::default_fps());
            self.fps = config::default_fps();
        }
        if self.zoom < 2 {
            log::warn!("zoom must be at least 2, using 2");
            self.zoom = 2;
        }
        if self.width == 0 || self.height == 0 {
            log::warn!(
                "Invalid resolution {}x{}, using {}x{}",
                self.width,
                self.height,
                config::default_width(),
                config::default_height()
            );
            self.width = config::default_width();
            self.height = config::default_height();
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            bail!(
                "Resolution {}x{} exceeds the {}px limit",
                self.width,
                self.height,
                MAX_DIMENSION
            );
        }
        Ok(())
    }
}
