pub mod cancel;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod process;
pub mod video;

pub use cancel::CancelToken;
pub use config::PipelineConfig;
