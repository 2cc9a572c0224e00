mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cli::Cli;
use wavecurve::audio::{decode_audio, FrameSequence, FramingJob, RawAudio};
use wavecurve::encode::{EncoderSettings, FfmpegEncoder};
use wavecurve::playback::{
    AudioSink, ClockState, CpalSink, DeadlineTicker, FrameClock, ManualTicker, NullSink, TickSource,
};
use wavecurve::render::terminal::CELL_STEPS;
use wavecurve::render::{render_curve, Canvas, CurveStyle, Rgb, TerminalSurface};

/// How often progress counters are polled while analysis runs.
const PROGRESS_POLL: Duration = Duration::from_millis(30);

struct Palette {
    fill: Rgb,
    background: Rgb,
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Live mode draws on the terminal, so keep stderr quiet unless asked
    let default_level = if cli.output.is_some() { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let mut palette = Palette {
        fill: [255, 0, 0],
        background: [0, 0, 0],
    };
    if let Some(path) = config::find_config(cli.config.clone()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cli.merge(&cfg);
                palette = Palette {
                    fill: cfg.curve.fill,
                    background: cfg.curve.background,
                };
            }
            Err(err) => log::warn!("Failed to load config: {:#}", err),
        }
    }
    cli.sanitize()?;

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("wavecurve - spectrum curve visualizer");
    log::info!("Input: {}", cli.input.display());
    log::info!("Frame rate: {}fps, zoom {}, wave scale {}", cli.fps, cli.zoom, cli.wave_scale);

    log::info!("Decoding audio...");
    let audio = Arc::new(decode_audio(&cli.input)?);

    let style = CurveStyle {
        stride: cli.zoom,
        scale: cli.wave_scale,
    };

    match cli.output.clone() {
        Some(output) => render_video(&cli, &palette, &style, audio, &output),
        None => play_live(&cli, &palette, &style, audio),
    }
}

fn analyze_with_progress(audio: Arc<RawAudio>, fps: u32) -> Result<FrameSequence> {
    let job = FramingJob::spawn(audio, fps).context("Failed to start analysis thread")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames analyzed")?
            .progress_chars("=>-"),
    );

    while !job.is_finished() {
        let progress = job.progress();
        pb.set_length(progress.total as u64);
        pb.set_position(progress.current as u64);
        thread::sleep(PROGRESS_POLL);
    }

    let sequence = job.join().context("Failed to analyze audio")?;
    pb.finish_and_clear();

    log::info!(
        "Analyzed {} frames, {} bins each",
        sequence.len(),
        sequence.bin_count()
    );
    Ok(sequence)
}

fn render_video(
    cli: &Cli,
    palette: &Palette,
    style: &CurveStyle,
    audio: Arc<RawAudio>,
    output: &Path,
) -> Result<()> {
    log::info!("Output: {}", output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    let sequence = Arc::new(analyze_with_progress(audio, cli.fps)?);
    let total_frames = sequence.len();
    let fps = sequence.frame_rate();
    if total_frames == 0 {
        anyhow::bail!("Audio is shorter than one frame at {}fps", fps);
    }

    let mut clock = FrameClock::new(NullSink);
    clock.begin_framing();
    clock.publish(sequence);

    let settings = EncoderSettings {
        width: cli.width,
        height: cli.height,
        fps,
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
        bitrate: cli.bitrate.clone(),
    };
    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(output, &cli.input, &settings)?;
    let mut canvas = Canvas::new(cli.width, cli.height)?;
    let mut ticker = ManualTicker::new(fps);

    let pb = ProgressBar::new(total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    clock.start();
    while clock.state() == ClockState::Playing {
        let due = ticker.next_tick();
        let frame = clock.tick();
        // The tick that runs past the last frame only resets the clock
        let Some(index) = frame.index() else {
            break;
        };
        log::trace!("Frame {} at {:?}", index, due);

        let cmd = render_curve(
            frame.bins(),
            canvas.width() as f32,
            canvas.height() as f32,
            style,
        );
        canvas.clear(palette.background);
        canvas.fill_curve(&cmd, palette.fill);
        encoder.write_frame(canvas.pixels())?;
        pb.set_position(index as u64 + 1);
    }

    pb.finish_with_message("Rendering complete");

    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", output.display());
    Ok(())
}

enum Analysis {
    Running(FramingJob),
    Ready { frames: usize },
    Failed(String),
}

fn play_live(cli: &Cli, palette: &Palette, style: &CurveStyle, audio: Arc<RawAudio>) -> Result<()> {
    let sink = CpalSink::new(Arc::clone(&audio))?;
    let mut clock = FrameClock::new(sink);
    clock.begin_framing();

    let job = FramingJob::spawn(audio, cli.fps).context("Failed to start analysis thread")?;
    let mut analysis = Analysis::Running(job);

    let mut surface = TerminalSurface::enter(palette.fill)?;
    let mut ticker = DeadlineTicker::new(cli.fps);
    let mut autostarted = false;

    loop {
        ticker.next_tick();

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return shutdown(analysis),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return shutdown(analysis)
                }
                KeyCode::Char(' ') => {
                    clock.start();
                }
                KeyCode::Char('s') => clock.stop(),
                _ => {}
            }
        }

        analysis = poll_analysis(analysis, &mut clock);

        if cli.autostart {
            if !autostarted {
                autostarted = clock.start();
            } else if clock.state() == ClockState::Idle {
                break;
            }
            if let Analysis::Failed(ref err) = analysis {
                drop(surface);
                anyhow::bail!("Analysis failed: {}", err);
            }
        }

        let status = status_line(&analysis, &clock, cli.fps);
        let (cols, rows) = surface.area()?;
        let frame = clock.tick();
        let cmd = render_curve(
            frame.bins(),
            cols as f32,
            (rows * CELL_STEPS) as f32,
            style,
        );
        surface.draw(&cmd, &status)?;
    }

    log::debug!("Late ticks: {}", ticker.late_ticks());
    Ok(())
}

fn poll_analysis<S: AudioSink>(analysis: Analysis, clock: &mut FrameClock<S>) -> Analysis {
    match analysis {
        Analysis::Running(job) if job.is_finished() => match job.join() {
            Ok(sequence) => {
                let frames = sequence.len();
                clock.publish(Arc::new(sequence));
                Analysis::Ready { frames }
            }
            Err(err) => {
                log::error!("Analysis failed: {}", err);
                clock.framing_failed();
                Analysis::Failed(err.to_string())
            }
        },
        other => other,
    }
}

fn status_line<S: AudioSink>(analysis: &Analysis, clock: &FrameClock<S>, fps: u32) -> String {
    match analysis {
        Analysis::Running(job) => {
            let progress = job.progress();
            if progress.total > 0 && progress.is_complete() {
                return "finishing analysis  [q] quit".to_string();
            }
            format!(
                "analyzing {}/{} frames  [q] quit",
                progress.current, progress.total
            )
        }
        Analysis::Failed(err) => format!("error: {}  [q] quit", err),
        Analysis::Ready { frames } => match clock.cursor() {
            Some(cursor) => format!("playing {}/{}  [s] stop  [q] quit", cursor, frames),
            None => format!("ready: {} frames @ {}fps  [space] play  [q] quit", frames, fps),
        },
    }
}

fn shutdown(analysis: Analysis) -> Result<()> {
    if let Analysis::Running(job) = analysis {
        job.cancel();
    }
    Ok(())
}
