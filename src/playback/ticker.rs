use std::thread;
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Drives the render loop at a fixed rate.
pub trait TickSource {
    /// Waits until the next tick is due and returns its scheduled offset from the first tick.
    fn next_tick(&mut self) -> Duration;

    fn period(&self) -> Duration;
}

/// Tick `n` is due `n / rate` seconds after the first tick. Deadlines are
/// computed from the tick index, so a late tick never pushes later ones back.
#[derive(Clone, Copy, Debug)]
pub struct TickSchedule {
    rate: u64,
    issued: u64,
}

impl TickSchedule {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: rate.max(1) as u64,
            issued: 0,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(NANOS_PER_SEC / self.rate)
    }

    pub fn deadline(&self, tick: u64) -> Duration {
        let nanos = tick as u128 * NANOS_PER_SEC as u128 / self.rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Deadline of the next tick.
    pub fn advance(&mut self) -> Duration {
        let due = self.deadline(self.issued);
        self.issued += 1;
        due
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }
}

/// Wall-clock ticker. Sleeps until each deadline; when behind, returns
/// immediately until it has caught up.
pub struct DeadlineTicker {
    schedule: TickSchedule,
    start: Option<Instant>,
    late_ticks: u64,
}

impl DeadlineTicker {
    pub fn new(rate: u32) -> Self {
        Self {
            schedule: TickSchedule::new(rate),
            start: None,
            late_ticks: 0,
        }
    }

    /// Ticks that started more than one period after their deadline.
    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }
}

impl TickSource for DeadlineTicker {
    fn next_tick(&mut self) -> Duration {
        let start = *self.start.get_or_insert_with(Instant::now);
        let due = self.schedule.advance();
        let elapsed = start.elapsed();

        if due > elapsed {
            thread::sleep(due - elapsed);
        } else if elapsed - due > self.schedule.period() {
            self.late_ticks += 1;
            log::trace!(
                "Tick {} is {:?} behind schedule",
                self.schedule.issued() - 1,
                elapsed - due
            );
        }

        due
    }

    fn period(&self) -> Duration {
        self.schedule.period()
    }
}

/// Virtual-time ticker for offline rendering: every tick is due immediately.
pub struct ManualTicker {
    schedule: TickSchedule,
}

impl ManualTicker {
    pub fn new(rate: u32) -> Self {
        Self {
            schedule: TickSchedule::new(rate),
        }
    }
}

impl TickSource for ManualTicker {
    fn next_tick(&mut self) -> Duration {
        self.schedule.advance()
    }

    fn period(&self) -> Duration {
        self.schedule.period()
    }
}
