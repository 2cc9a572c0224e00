pub mod ffmpeg;

pub use ffmpeg::{EncoderSettings, FfmpegEncoder};
