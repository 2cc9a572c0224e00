pub mod decode;
pub mod framer;
pub mod progress;

pub use decode::{decode_audio, RawAudio};
pub use framer::{
    frame_audio, CancelToken, FramePlan, FrameSequence, FramingError, FramingJob,
    InvalidAudioError, SpectralFramer,
};
pub use progress::{Progress, ProgressUpdate};
