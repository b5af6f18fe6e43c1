use thiserror::Error;

/// 媒体无法打开或解析（整体解码失败时本次运行终止）
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("Probe failed: {0}")]
    Probe(String),
    #[error("Probe output invalid: {0}")]
    ProbeJson(#[from] serde_json::Error),
    #[error("Frame stream error: {0}")]
    Stream(String),
}

/// OCR 引擎调用失败（单个识别单元）
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write engine input: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to launch OCR engine `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Language data not found: {0}")]
    MissingLanguage(String),
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("OCR engine failed: {0}")]
    Failed(String),
}

/// 描述模型加载或推理失败
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model load failed: {0}")]
    LoadFailed(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frame_stride must be within [{min}, {max}], got {value}")]
    StrideOutOfRange { value: u32, min: u32, max: u32 },
    #[error("batch_size must be at least 1")]
    InvalidBatchSize,
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
