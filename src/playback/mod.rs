pub mod clock;
pub mod sink;
pub mod ticker;

pub use clock::{ClockState, FrameClock, RenderFrame, SILENT_FRAME};
pub use sink::{AudioSink, CpalSink, NullSink};
pub use ticker::{DeadlineTicker, ManualTicker, TickSchedule, TickSource};
