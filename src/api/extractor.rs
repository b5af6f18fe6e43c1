//! 媒体文字提取器 - 上传一个文件，得到文字与（图片的）描述
//!
//! ```ignore
//! let extractor = MediaTextExtractor::create(ExtractorConfig::default())?;
//! let report = extractor.extract_file("receipt.jpg")?;
//! for blob in report.downloads() { /* offer blob.data as blob.file_name */ }
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::models::ExtractionReport;
use crate::core::cancel::CancelToken;
use crate::core::config::PipelineConfig;
use crate::core::media::{
    CommandCaptionLoader, ConfigError, DecodeError, DescriptionService, MediaInput, ModelRegistry,
    TesseractConfig, TesseractEngine, DEFAULT_CAPTION_MODEL,
};
use crate::core::media::tesseract::DEFAULT_PSM;
use crate::core::pipeline::MediaPipeline;
use crate::core::video::{FfmpegConfig, FfmpegOpener, ProgressState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    /// 为空时使用 `TESSERACT_CMD` 或 PATH 中的 tesseract
    pub tesseract_cmd: Option<PathBuf>,
    /// 为空时使用 `TESSDATA_PREFIX`
    pub tessdata_dir: Option<PathBuf>,
    pub psm: u8,
    pub ffmpeg_cmd: PathBuf,
    pub ffprobe_cmd: PathBuf,
    /// 未配置时不提供图片描述
    pub caption_cmd: Option<PathBuf>,
    pub caption_model: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let ffmpeg = FfmpegConfig::default();
        Self {
            pipeline: PipelineConfig::default(),
            tesseract_cmd: None,
            tessdata_dir: None,
            psm: DEFAULT_PSM,
            ffmpeg_cmd: ffmpeg.ffmpeg,
            ffprobe_cmd: ffmpeg.ffprobe,
            caption_cmd: None,
            caption_model: DEFAULT_CAPTION_MODEL.to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    fn tesseract(&self) -> TesseractConfig {
        let mut config = TesseractConfig::default();
        if let Some(cmd) = &self.tesseract_cmd {
            config.executable = cmd.clone();
        }
        if let Some(dir) = &self.tessdata_dir {
            config.tessdata_dir = Some(dir.clone());
        }
        config.psm = self.psm;
        config
    }

    /// 同一命令 + 模型在进程内共用一个描述服务
    fn caption_service(&self) -> Option<Arc<DescriptionService>> {
        let cmd = self.caption_cmd.as_ref()?;
        let key = format!("{}#{}", cmd.display(), self.caption_model);
        Some(ModelRegistry::global().service(&key, || {
            Box::new(CommandCaptionLoader::new(cmd.clone(), self.caption_model.clone()))
        }))
    }

    fn ffmpeg(&self) -> FfmpegConfig {
        FfmpegConfig {
            ffmpeg: self.ffmpeg_cmd.clone(),
            ffprobe: self.ffprobe_cmd.clone(),
        }
    }
}

pub struct MediaTextExtractor {
    pipeline: MediaPipeline,
}

impl MediaTextExtractor {
    /// 组装 Tesseract + ffmpeg（+ 可选描述命令）。
    /// 描述服务取自进程级 `ModelRegistry`，多个提取器共用同一个已加载模型
    pub fn create(config: ExtractorConfig) -> Result<Self, ConfigError> {
        let describer = config.caption_service();
        Self::build(config, describer)
    }

    /// 使用调用方持有的描述服务，忽略 `caption_cmd`
    pub fn create_with_describer(
        config: ExtractorConfig,
        describer: Arc<DescriptionService>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Some(describer))
    }

    fn build(
        config: ExtractorConfig,
        describer: Option<Arc<DescriptionService>>,
    ) -> Result<Self, ConfigError> {
        info!("🔍 MediaTextExtractor: initializing");
        crate::init_logging();

        let engine = Arc::new(TesseractEngine::with_config(config.tesseract()));
        let opener = Box::new(FfmpegOpener::new(config.ffmpeg()));
        let mut pipeline = MediaPipeline::new(engine, opener, config.pipeline.clone())?;

        if let Some(describer) = describer {
            info!("🖼️ Image descriptions enabled ({})", describer.model_id());
            pipeline = pipeline.with_describer(describer);
        }

        info!("✅ MediaTextExtractor ready");
        Ok(Self::from_pipeline(pipeline))
    }

    /// 使用自定义引擎/解码器组装好的 pipeline
    pub fn from_pipeline(pipeline: MediaPipeline) -> Self {
        Self { pipeline }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.pipeline.config()
    }

    pub fn describer(&self) -> Option<&Arc<DescriptionService>> {
        self.pipeline.describer()
    }

    /// 文件类型无法识别时返回错误；其余失败体现在 report 的状态和诊断里
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<ExtractionReport, DecodeError> {
        let path = path.as_ref();
        let media = MediaInput::from_path(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.run(&file_name, &media, &CancelToken::new(), |_| {}))
    }

    pub fn extract_bytes(&self, bytes: Vec<u8>, file_name: &str) -> Result<ExtractionReport, DecodeError> {
        let media = MediaInput::from_bytes(bytes, file_name)?;
        Ok(self.run(file_name, &media, &CancelToken::new(), |_| {}))
    }

    pub fn extract_with_progress<F>(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        cancel: &CancelToken,
        on_progress: F,
    ) -> Result<ExtractionReport, DecodeError>
    where
        F: FnMut(&ProgressState),
    {
        let media = MediaInput::from_bytes(bytes, file_name)?;
        Ok(self.run(file_name, &media, cancel, on_progress))
    }

    fn run<F>(&self, file_name: &str, media: &MediaInput, cancel: &CancelToken, on_progress: F) -> ExtractionReport
    where
        F: FnMut(&ProgressState),
    {
        let config = self.pipeline.config();
        let output = self.pipeline.process_with(
            media,
            config.language,
            config.want_description,
            cancel,
            on_progress,
        );
        info!(
            "📄 {}: {:?}, {} chars, {} diagnostics",
            file_name,
            output.status,
            output.text.len(),
            output.diagnostics.len()
        );
        ExtractionReport::from_output(file_name, output)
    }
}

impl Drop for MediaTextExtractor {
    fn drop(&mut self) {
        info!("🗑️ MediaTextExtractor: released");
    }
}
