pub mod encoder;
pub mod pipeline;

pub use encoder::{
    EncoderFactory, EncoderSink, FfmpegEncoder, FfmpegEncoderFactory, WavEncoder,
    WavEncoderFactory,
};
pub use pipeline::{Recorder, RecordingArtifact};
