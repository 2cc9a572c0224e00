pub mod audio;
pub mod encode;
pub mod playback;
pub mod render;

pub use audio::{decode_audio, frame_audio, FrameSequence, FramingJob, RawAudio};
pub use playback::{FrameClock, RenderFrame, TickSource};
pub use render::{render_curve, CurveStyle, DrawCommand};
