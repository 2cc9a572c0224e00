use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use super::decode::RawAudio;
use super::progress::{Progress, ProgressUpdate};

/// Frames computed between two progress publications / cancellation checks.
const BATCH_FRAMES: usize = 32;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidAudioError {
    #[error("audio has no channels")]
    NoChannels,
    #[error("channel {channel} has {len} samples, expected {expected}")]
    UnequalChannels {
        channel: usize,
        len: usize,
        expected: usize,
    },
    #[error("{sample_rate}Hz at {frame_rate}fps leaves fewer than 2 samples per transform")]
    DegenerateRatio { sample_rate: u32, frame_rate: u32 },
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("invalid audio: {0}")]
    InvalidAudio(#[from] InvalidAudioError),
    #[error("framing cancelled after {completed} of {total} frames")]
    Cancelled { completed: usize, total: usize },
    #[error("framing worker panicked")]
    WorkerPanicked,
}

/// Frame geometry derived from the sample rate / frame rate ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePlan {
    pub sample_rate: u32,
    pub frame_rate: u32,
    pub frame_count: usize,
    pub transform_size: usize,
}

impl FramePlan {
    pub fn new(audio: &RawAudio, frame_rate: u32) -> Result<Self, InvalidAudioError> {
        let expected = audio
            .channels
            .first()
            .ok_or(InvalidAudioError::NoChannels)?
            .len();

        if let Some((channel, samples)) = audio
            .channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != expected)
        {
            return Err(InvalidAudioError::UnequalChannels {
                channel,
                len: samples.len(),
                expected,
            });
        }

        let degenerate = InvalidAudioError::DegenerateRatio {
            sample_rate: audio.sample_rate,
            frame_rate,
        };
        if frame_rate == 0 {
            return Err(degenerate);
        }

        // A power of two fits in samples_per_frame iff it fits in its integer part
        let whole_samples = (audio.sample_rate / frame_rate) as usize;
        let transform_size = prev_power_of_two(whole_samples);
        if transform_size < 2 {
            return Err(degenerate);
        }

        // floor(N / (R / F)) without the rounding error of the fractional ratio
        let frame_count =
            (expected as u64 * frame_rate as u64 / audio.sample_rate as u64) as usize;

        Ok(Self {
            sample_rate: audio.sample_rate,
            frame_rate,
            frame_count,
            transform_size,
        })
    }

    pub fn samples_per_frame(&self) -> f64 {
        self.sample_rate as f64 / self.frame_rate as f64
    }

    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// First sample of frame `index`, i.e. floor(index * samples_per_frame).
    pub fn frame_start(&self, index: usize) -> usize {
        (index as u64 * self.sample_rate as u64 / self.frame_rate as u64) as usize
    }
}

fn prev_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Magnitude spectra for every frame of one piece of audio. Immutable once built.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    frames: Vec<Vec<f32>>,
    transform_size: usize,
    frame_rate: u32,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.frames.iter().map(Vec::as_slice)
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Slices audio into `1 / frame_rate` second frames and computes the
/// magnitude spectrum of each with a rectangular window.
pub struct SpectralFramer<'a> {
    audio: &'a RawAudio,
    plan: FramePlan,
    fft: Arc<dyn Fft<f32>>,
}

impl<'a> SpectralFramer<'a> {
    pub fn new(audio: &'a RawAudio, frame_rate: u32) -> Result<Self, InvalidAudioError> {
        let plan = FramePlan::new(audio, frame_rate)?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(plan.transform_size);
        Ok(Self { audio, plan, fft })
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    /// Magnitudes of frame `index`, channels summed to mono.
    pub fn frame(&self, index: usize) -> Vec<f32> {
        let size = self.plan.transform_size;
        let start = self.plan.frame_start(index);
        let end = (start + size).min(self.audio.len());

        // Positions past the end of the audio stay zero
        let mut buffer = vec![Complex::new(0.0f32, 0.0); size];
        if start < end {
            for channel in &self.audio.channels {
                for (slot, &sample) in buffer.iter_mut().zip(&channel[start..end]) {
                    slot.re += sample;
                }
            }
        }

        self.fft.process(&mut buffer);
        buffer[..size / 2].iter().map(|c| c.norm()).collect()
    }

    /// Computes all frames in order, publishing progress and checking `cancel`
    /// between batches.
    pub fn run(&self, progress: &Progress, cancel: &CancelToken) -> Result<FrameSequence, FramingError> {
        let total = self.plan.frame_count;
        progress.set_total(total);

        log::info!(
            "Framing {} frames: {:.2} samples/frame, transform size {}",
            total,
            self.plan.samples_per_frame(),
            self.plan.transform_size
        );

        let mut frames: Vec<Vec<f32>> = Vec::with_capacity(total);
        for batch_start in (0..total).step_by(BATCH_FRAMES) {
            if cancel.is_cancelled() {
                log::warn!("Framing cancelled at {}/{}", frames.len(), total);
                return Err(FramingError::Cancelled {
                    completed: frames.len(),
                    total,
                });
            }

            let batch_end = (batch_start + BATCH_FRAMES).min(total);
            let batch: Vec<Vec<f32>> = (batch_start..batch_end)
                .into_par_iter()
                .map(|index| self.frame(index))
                .collect();
            frames.extend(batch);
            progress.advance_to(frames.len());
        }

        Ok(FrameSequence {
            frames,
            transform_size: self.plan.transform_size,
            frame_rate: self.plan.frame_rate,
        })
    }
}

/// Frames `audio` on the calling thread.
pub fn frame_audio(audio: &RawAudio, frame_rate: u32) -> Result<FrameSequence, FramingError> {
    let framer = SpectralFramer::new(audio, frame_rate)?;
    framer.run(&Progress::new(), &CancelToken::new())
}

/// A framing pass running on its own thread, off the tick loop.
pub struct FramingJob {
    handle: JoinHandle<Result<FrameSequence, FramingError>>,
    progress: Progress,
    cancel: CancelToken,
}

impl FramingJob {
    pub fn spawn(audio: Arc<RawAudio>, frame_rate: u32) -> std::io::Result<Self> {
        let progress = Progress::new();
        let cancel = CancelToken::new();

        let handle = {
            let progress = progress.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("wavecurve-framer".into())
                .spawn(move || {
                    let framer = SpectralFramer::new(&audio, frame_rate)?;
                    framer.run(&progress, &cancel)
                })?
        };

        Ok(Self {
            handle,
            progress,
            cancel,
        })
    }

    pub fn progress(&self) -> ProgressUpdate {
        self.progress.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> Result<FrameSequence, FramingError> {
        self.handle.join().map_err(|_| FramingError::WorkerPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn mono(samples: Vec<f32>, sample_rate: u32) -> RawAudio {
        RawAudio::new(vec![samples], sample_rate)
    }

    #[test]
    fn plan_for_fractional_samples_per_frame() {
        let audio = mono(vec![0.0; 8000], 8000);
        let plan = FramePlan::new(&audio, 60).unwrap();
        assert!((plan.samples_per_frame() - 133.333).abs() < 0.001);
        assert_eq!(plan.frame_count, 60);
        assert_eq!(plan.transform_size, 128);
        assert_eq!(plan.bin_count(), 64);
        assert_eq!(plan.frame_start(1), 133);
        assert_eq!(plan.frame_start(3), 400);
    }

    #[test]
    fn frame_count_is_floor_of_length_over_ratio() {
        let cases = [
            (44_100, 44_100 * 3, 30, 90),
            (44_100, 44_100 * 3 + 1469, 30, 90),
            (44_100, 44_100 * 3 + 1470, 30, 91),
            (48_000, 1000, 60, 1),
            (48_000, 799, 60, 0),
            (22_050, 22_050, 24, 24),
        ];
        for (rate, len, fps, expected) in cases {
            let audio = mono(vec![0.0; len], rate);
            let frames = frame_audio(&audio, fps).unwrap();
            assert_eq!(frames.len(), expected, "rate={} len={} fps={}", rate, len, fps);
        }
    }

    #[test]
    fn frames_share_length_and_are_non_negative() {
        let samples: Vec<f32> = (0..8000).map(|i| ((i * 7919) % 200) as f32 / 100.0 - 1.0).collect();
        let audio = RawAudio::new(vec![samples.clone(), samples], 8000);
        let frames = frame_audio(&audio, 60).unwrap();

        assert_eq!(frames.len(), 60);
        assert_eq!(frames.transform_size(), 128);
        assert!(frames.transform_size() as f64 <= 8000.0 / 60.0);
        for frame in frames.iter() {
            assert_eq!(frame.len(), 64);
            assert!(frame.iter().all(|&m| m >= 0.0));
        }
    }

    #[test]
    fn channels_are_summed() {
        let audio = RawAudio::new(vec![vec![0.25; 200], vec![0.75; 200]], 100);
        let frames = frame_audio(&audio, 1).unwrap();
        // spf = 100 -> transform 64; a constant 1.0 puts all energy in bin 0
        assert_eq!(frames.len(), 2);
        let frame = frames.get(0).unwrap();
        assert!((frame[0] - 64.0).abs() < 1e-3);
        assert!(frame[1..].iter().all(|&m| m < 1e-3));
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let bin = 10;
        let tone: Vec<f32> = (0..128)
            .map(|j| (2.0 * PI * bin as f32 * j as f32 / 128.0).sin())
            .collect();
        let audio = RawAudio::new(vec![vec![0.0; 128], tone], 128 * 60);
        let frames = frame_audio(&audio, 60).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = frames.get(0).unwrap();
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(peak.abs_diff(bin) <= 1);
        assert!((frame[bin] - 64.0).abs() < 0.1);
    }

    #[test]
    fn tail_beyond_audio_is_zero_padded() {
        let audio = mono(vec![1.0; 100], 100);
        let framer = SpectralFramer::new(&audio, 1).unwrap();
        // frame 1 starts at sample 100, past the end
        let frame = framer.frame(1);
        assert_eq!(frame.len(), 32);
        assert!(frame.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn frames_start_at_the_floor_of_their_fractional_offset() {
        // 8000 / 60 = 133.33 samples per frame, so frame 1 begins at sample 133
        let mut samples = vec![0.0; 8000];
        samples[133] = 1.0;
        let frames = frame_audio(&mono(samples, 8000), 60).unwrap();
        assert_eq!(frames.frame_rate(), 60);

        // an impulse at position 0 has a flat unit spectrum
        let first = frames.get(1).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.iter().all(|&m| (m - 1.0).abs() < 1e-5), "{:?}", first);

        // frame 0 covers samples 0..128 and frame 2 starts at 266
        assert!(frames.get(0).unwrap().iter().all(|&m| m == 0.0));
        assert!(frames.get(2).unwrap().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn rejects_degenerate_input() {
        let no_channels = RawAudio::new(Vec::new(), 44_100);
        assert_eq!(FramePlan::new(&no_channels, 60), Err(InvalidAudioError::NoChannels));

        let too_slow = mono(vec![0.0; 100], 100);
        assert!(matches!(
            FramePlan::new(&too_slow, 60),
            Err(InvalidAudioError::DegenerateRatio { .. })
        ));
        assert!(matches!(
            FramePlan::new(&too_slow, 0),
            Err(InvalidAudioError::DegenerateRatio { .. })
        ));

        let unequal = RawAudio::new(vec![vec![0.0; 10], vec![0.0; 9]], 8000);
        assert_eq!(
            FramePlan::new(&unequal, 60),
            Err(InvalidAudioError::UnequalChannels { channel: 1, len: 9, expected: 10 })
        );

        assert!(matches!(
            frame_audio(&no_channels, 60),
            Err(FramingError::InvalidAudio(InvalidAudioError::NoChannels))
        ));
    }

    #[test]
    fn smallest_valid_transform_is_two() {
        let audio = mono(vec![0.0; 30], 3);
        let plan = FramePlan::new(&audio, 1).unwrap();
        assert_eq!(plan.transform_size, 2);
        assert_eq!(frame_audio(&audio, 1).unwrap().bin_count(), 1);
    }

    #[test]
    fn publishes_complete_progress() {
        let audio = mono(vec![0.1; 8000], 8000);
        let framer = SpectralFramer::new(&audio, 60).unwrap();
        let progress = Progress::new();
        framer.run(&progress, &CancelToken::new()).unwrap();
        assert_eq!(progress.snapshot(), ProgressUpdate { current: 60, total: 60 });
    }

    #[test]
    fn cancelled_pass_produces_nothing() {
        let audio = mono(vec![0.1; 8000], 8000);
        let framer = SpectralFramer::new(&audio, 60).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = framer.run(&Progress::new(), &cancel);
        assert!(matches!(
            result,
            Err(FramingError::Cancelled { completed: 0, total: 60 })
        ));
    }

    #[test]
    fn background_job_matches_direct_framing() {
        let samples: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.05).sin()).collect();
        let audio = Arc::new(mono(samples, 8000));
        let direct = frame_audio(&audio, 60).unwrap();

        let job = FramingJob::spawn(Arc::clone(&audio), 60).unwrap();
        let threaded = job.join().unwrap();

        assert_eq!(threaded.len(), direct.len());
        for (a, b) in threaded.iter().zip(direct.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn background_job_reports_invalid_audio() {
        let job = FramingJob::spawn(Arc::new(RawAudio::new(Vec::new(), 8000)), 60).unwrap();
        assert!(matches!(job.join(), Err(FramingError::InvalidAudio(_))));
    }
}
