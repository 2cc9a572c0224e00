use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::render::raster::rgba_len;

/// Video settings for the encoder.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

/// Pipes raw RGBA frames into ffmpeg, muxing in the source audio.
pub struct FfmpegEncoder {
    child: Child,
    frame_bytes: usize,
    frames_written: usize,
}

impl EncoderSettings {
    /// Bytes per raw RGBA frame piped to ffmpeg.
    pub fn frame_bytes(&self) -> Option<usize> {
        rgba_len(self.width, self.height)
    }
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &EncoderSettings) -> Result<Self> {
        let frame_bytes = settings.frame_bytes().with_context(|| {
            format!("Video size {}x{} is too large", settings.width, settings.height)
        })?;
        let args = build_args(output_path, input_audio, settings);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child,
            frame_bytes,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_bytes {
            anyhow::bail!(
                "Frame has {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_bytes
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete: {} frames", self.frames_written);
        Ok(self.frames_written)
    }
}

fn build_args(output_path: &Path, input_audio: &Path, settings: &EncoderSettings) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height),
        "-framerate".into(), settings.fps.to_string(),
        "-i".into(), "pipe:0".into(),
        "-i".into(), input_audio.to_string_lossy().into_owned(),
        "-c:v".into(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
    ];

    if let Some(ref br) = settings.bitrate {
        args.extend(["-b:v".to_string(), br.clone()]);
    } else {
        args.extend(["-crf".to_string(), settings.crf.to_string()]);
        args.extend(["-preset".to_string(), "medium".to_string()]);
    }

    args.extend([
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        "-shortest".into(),
        output_path.to_string_lossy().into_owned(),
    ]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 360,
            fps: 60,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            bitrate: None,
        }
    }

    #[test]
    fn args_describe_raw_rgba_input() {
        let args = build_args(Path::new("out.mp4"), Path::new("in.wav"), &settings());
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgba -video_size 640x360 -framerate 60"));
        assert!(joined.contains("-i pipe:0 -i in.wav"));
        assert!(joined.contains("-crf 18 -preset medium"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn bitrate_replaces_crf() {
        let mut settings = settings();
        settings.bitrate = Some("5M".into());
        let args = build_args(Path::new("out.mp4"), Path::new("in.wav"), &settings);
        assert!(args.windows(2).any(|w| w[0] == "-b:v" && w[1] == "5M"));
        assert!(!args.iter().any(|a| a == "-crf"));
    }

    #[test]
    fn frame_size_rejects_overflowing_resolutions() {
        assert_eq!(settings().frame_bytes(), Some(640 * 360 * 4));

        let mut huge = settings();
        huge.width = u32::MAX;
        huge.height = u32::MAX;
        assert_eq!(huge.frame_bytes(), None);
        let err = FfmpegEncoder::new(Path::new("out.mp4"), Path::new("in.wav"), &huge)
            .err()
            .unwrap();
        assert!(err.to_string().contains("too large"));
    }
}
