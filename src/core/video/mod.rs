pub mod aggregator;
pub mod frame;
pub mod sampler;
pub mod source;

pub use aggregator::{AggregationOptions, VideoAggregator, VideoTranscript};
pub use frame::{FrameSample, ProgressState};
pub use sampler::{FrameSampler, SamplerEnd};
pub use source::{
    FfmpegConfig, FfmpegOpener, FfmpegVideoSource, MemoryVideoSource, VideoOpener, VideoSource,
};
