pub mod api;
pub mod core;

pub use crate::core::media::{
    DecodeError, Diagnostic, Diagnostics, EngineError, Language, MediaInput, MediaKind, ModelError,
};
pub use crate::core::pipeline::{ExtractionOutput, MediaPipeline, RunStatus};

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("media_text"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // desktop hosts install their own `log` backend
    }
}
