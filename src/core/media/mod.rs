//! 单张图像的识别与描述
//!
//! - `recognizer`：OCR 适配器（灰度归一化 + 失败隔离）
//! - `describer`：图像描述适配器（模型惰性加载一次）
//! - `tesseract` / `caption`：基于外部命令的默认引擎实现

pub mod caption;
pub mod describer;
pub mod diagnostics;
pub mod error;
pub mod input;
pub mod language;
pub mod recognizer;
pub mod tesseract;

pub use caption::{CommandCaptionLoader, CommandCaptionModel, DEFAULT_CAPTION_MODEL};
pub use describer::{CaptionModel, DescriptionService, ModelLoader, ModelRegistry};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Stage};
pub use error::{ConfigError, DecodeError, EngineError, ModelError};
pub use input::{MediaInput, MediaKind, MediaSource};
pub use language::Language;
pub use recognizer::{
    MockTextRecognizer, RecognitionAdapter, RecognitionResult, RecognitionStatus, TextRecognizer,
};
pub use tesseract::{TesseractConfig, TesseractEngine};
