use std::sync::Arc;

use super::sink::AudioSink;
use crate::audio::FrameSequence;

/// Drawn whenever nothing is playing.
pub const SILENT_FRAME: [f32; 2] = [0.0; 2];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Playing,
}

/// What the renderer should draw for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderFrame<'a> {
    Playing { index: usize, bins: &'a [f32] },
    Silent,
}

impl<'a> RenderFrame<'a> {
    pub fn bins(&self) -> &'a [f32] {
        match *self {
            RenderFrame::Playing { bins, .. } => bins,
            RenderFrame::Silent => &SILENT_FRAME,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match *self {
            RenderFrame::Playing { index, .. } => Some(index),
            RenderFrame::Silent => None,
        }
    }
}

/// Advances a playback cursor over a frame sequence, one frame per tick,
/// and keeps the audio sink in step with it.
pub struct FrameClock<S> {
    sink: S,
    sequence: Option<Arc<FrameSequence>>,
    framing: bool,
    cursor: Option<usize>,
}

impl<S: AudioSink> FrameClock<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sequence: None,
            framing: false,
            cursor: None,
        }
    }

    pub fn state(&self) -> ClockState {
        if self.cursor.is_some() {
            ClockState::Playing
        } else {
            ClockState::Idle
        }
    }

    /// Next frame due, or `None` when idle.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_framing(&self) -> bool {
        self.framing
    }

    pub fn sequence(&self) -> Option<&Arc<FrameSequence>> {
        self.sequence.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Marks a framing pass as in flight. Rejected while playing.
    pub fn begin_framing(&mut self) -> bool {
        if self.cursor.is_some() {
            log::debug!("Ignoring new audio while playing");
            return false;
        }
        self.framing = true;
        self.sequence = None;
        true
    }

    pub fn publish(&mut self, sequence: Arc<FrameSequence>) {
        log::debug!("Frame sequence ready: {} frames", sequence.len());
        self.framing = false;
        self.sequence = Some(sequence);
    }

    /// The framing pass failed; stay idle until new audio arrives.
    pub fn framing_failed(&mut self) {
        self.framing = false;
        self.sequence = None;
    }

    /// Begins playback from frame 0. Returns `false` (and does nothing) while
    /// framing, while already playing, or with no sequence.
    pub fn start(&mut self) -> bool {
        if self.framing || self.cursor.is_some() || self.sequence.is_none() {
            return false;
        }

        if let Err(err) = self.sink.start_at_zero() {
            log::warn!("Audio playback failed to start: {:#}", err);
            return false;
        }

        self.cursor = Some(0);
        log::info!("Playback started");
        true
    }

    /// Stops playback early through the same path as reaching the end.
    pub fn stop(&mut self) {
        if self.cursor.is_some() {
            self.finish();
        }
    }

    /// Selects the frame for this tick and advances the cursor.
    pub fn tick(&mut self) -> RenderFrame<'_> {
        let Some(index) = self.cursor else {
            return RenderFrame::Silent;
        };

        let available = self
            .sequence
            .as_ref()
            .is_some_and(|sequence| index < sequence.len());

        if !available {
            self.finish();
            return RenderFrame::Silent;
        }

        self.cursor = Some(index + 1);
        match self.sequence.as_deref().and_then(|sequence| sequence.get(index)) {
            Some(bins) => RenderFrame::Playing { index, bins },
            None => RenderFrame::Silent,
        }
    }

    fn finish(&mut self) {
        self.sink.stop_and_reset();
        self.cursor = None;
        log::info!("Playback finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{frame_audio, RawAudio};
    use anyhow::{bail, Result};

    #[derive(Debug, Default)]
    struct RecordingSink {
        events: Vec<&'static str>,
        fail_start: bool,
    }

    impl AudioSink for RecordingSink {
        fn start_at_zero(&mut self) -> Result<()> {
            if self.fail_start {
                bail!("device unavailable");
            }
            self.events.push("start");
            Ok(())
        }

        fn stop_and_reset(&mut self) {
            self.events.push("stop");
        }
    }

    fn sequence(samples: usize) -> Arc<FrameSequence> {
        let audio = RawAudio::new(vec![vec![0.5; samples]], 8000);
        Arc::new(frame_audio(&audio, 60).unwrap())
    }

    fn ready_clock(samples: usize) -> FrameClock<RecordingSink> {
        let mut clock = FrameClock::new(RecordingSink::default());
        assert!(clock.begin_framing());
        clock.publish(sequence(samples));
        clock
    }

    #[test]
    fn idle_clock_renders_silence() {
        let mut clock = FrameClock::new(RecordingSink::default());
        assert_eq!(clock.state(), ClockState::Idle);
        let frame = clock.tick();
        assert_eq!(frame, RenderFrame::Silent);
        assert_eq!(frame.bins(), &[0.0, 0.0]);
        assert_eq!(clock.cursor(), None);
    }

    #[test]
    fn full_playback_visits_every_frame_once() {
        let mut clock = ready_clock(8000);
        assert!(clock.start());
        assert_eq!(clock.state(), ClockState::Playing);

        let mut drawn = Vec::new();
        let mut ticks = 0;
        while clock.state() == ClockState::Playing {
            if let Some(index) = clock.tick().index() {
                drawn.push(index);
            }
            ticks += 1;
        }

        assert_eq!(drawn, (0..60).collect::<Vec<_>>());
        assert_eq!(ticks, 61);
        assert_eq!(clock.cursor(), None);
        assert_eq!(clock.sink().events, vec!["start", "stop"]);
    }

    #[test]
    fn one_second_at_sixty_fps_draws_sixty_curves() {
        use crate::render::{render_curve, CurveStyle};

        let mut clock = ready_clock(8000);
        clock.start();

        let style = CurveStyle::default();
        let mut drawn = 0;
        while clock.state() == ClockState::Playing {
            let frame = clock.tick();
            let cmd = render_curve(frame.bins(), 640.0, 480.0, &style);
            if frame.index().is_some() {
                assert_eq!(cmd.control_points().len(), 16);
                drawn += 1;
            }
        }
        assert_eq!(drawn, 60);
        assert!(render_curve(clock.tick().bins(), 640.0, 480.0, &style)
            .control_points()
            .iter()
            .all(|p| p.y == 480.0));
    }

    #[test]
    fn playing_frames_carry_sequence_bins() {
        let mut clock = ready_clock(8000);
        clock.start();
        let frame = clock.tick();
        assert_eq!(frame.index(), Some(0));
        assert_eq!(frame.bins().len(), 64);
        assert_eq!(clock.cursor(), Some(1));
    }

    #[test]
    fn double_start_is_a_single_start() {
        let mut clock = ready_clock(8000);
        assert!(clock.start());
        assert!(!clock.start());
        assert_eq!(clock.cursor(), Some(0));
        assert_eq!(clock.sink().events, vec!["start"]);
    }

    #[test]
    fn start_is_ignored_while_framing_or_without_sequence() {
        let mut clock = FrameClock::new(RecordingSink::default());
        assert!(!clock.start());

        clock.begin_framing();
        assert!(clock.is_framing());
        assert!(!clock.start());
        assert_eq!(clock.state(), ClockState::Idle);

        clock.framing_failed();
        assert!(!clock.start());
        assert!(clock.sink().events.is_empty());
    }

    #[test]
    fn new_audio_is_rejected_while_playing() {
        let mut clock = ready_clock(8000);
        clock.start();
        assert!(!clock.begin_framing());
        assert!(clock.sequence().is_some());
    }

    #[test]
    fn replay_after_finish_starts_from_zero() {
        let mut clock = ready_clock(400);
        clock.start();
        while clock.state() == ClockState::Playing {
            clock.tick();
        }
        assert!(clock.start());
        assert_eq!(clock.tick().index(), Some(0));
    }

    #[test]
    fn stop_resets_like_end_of_stream() {
        let mut clock = ready_clock(8000);
        clock.start();
        clock.tick();
        clock.stop();
        assert_eq!(clock.cursor(), None);
        assert_eq!(clock.tick(), RenderFrame::Silent);
        assert_eq!(clock.sink().events, vec!["start", "stop"]);

        clock.stop();
        assert_eq!(clock.sink().events.len(), 2);
    }

    #[test]
    fn empty_sequence_finishes_on_first_tick() {
        let mut clock = ready_clock(100);
        assert_eq!(clock.sequence().map(|s| s.len()), Some(0));
        assert!(clock.start());
        assert_eq!(clock.tick(), RenderFrame::Silent);
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn sink_failure_keeps_clock_idle() {
        let mut clock = FrameClock::new(RecordingSink {
            fail_start: true,
            ..Default::default()
        });
        clock.begin_framing();
        clock.publish(sequence(8000));
        assert!(!clock.start());
        assert_eq!(clock.state(), ClockState::Idle);
    }
}
