//! 流水线编排：图片走识别（+可选描述），视频走采样聚合

use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::core::cancel::CancelToken;
use crate::core::config::PipelineConfig;
use crate::core::media::{
    ConfigError, DescriptionService, Diagnostic, Diagnostics, Language, MediaInput, MediaKind,
    RecognitionAdapter, Stage, TextRecognizer,
};
use crate::core::video::{
    FrameSampler, ProgressState, SamplerEnd, VideoAggregator, VideoOpener, VideoTranscript,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    /// 媒体整体无法解码
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoStats {
    pub frames_decoded: u64,
    pub frames_sampled: u64,
    pub units_kept: usize,
}

impl From<&VideoTranscript> for VideoStats {
    fn from(t: &VideoTranscript) -> Self {
        Self {
            frames_decoded: t.frames_decoded,
            frames_sampled: t.frames_sampled,
            units_kept: t.units_kept,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub kind: MediaKind,
    pub text: String,
    pub description: Option<String>,
    pub status: RunStatus,
    pub video: Option<VideoStats>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionOutput {
    fn failed(kind: MediaKind, diagnostics: Diagnostics) -> Self {
        Self {
            kind,
            text: String::new(),
            description: None,
            status: RunStatus::Failed,
            video: None,
            diagnostics: diagnostics.into_vec(),
        }
    }
}

pub struct MediaPipeline {
    adapter: RecognitionAdapter,
    aggregator: VideoAggregator,
    describer: Option<Arc<DescriptionService>>,
    opener: Box<dyn VideoOpener>,
    config: PipelineConfig,
}

impl MediaPipeline {
    pub fn new(
        engine: Arc<dyn TextRecognizer>,
        opener: Box<dyn VideoOpener>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let adapter = RecognitionAdapter::new(engine);
        Ok(Self {
            aggregator: VideoAggregator::with_options(adapter.clone(), config.aggregation_options()),
            adapter,
            describer: None,
            opener,
            config,
        })
    }

    /// 描述服务可在多个 pipeline / 多次运行间共享，模型只加载一次
    pub fn with_describer(mut self, describer: Arc<DescriptionService>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn describer(&self) -> Option<&Arc<DescriptionService>> {
        self.describer.as_ref()
    }

    pub fn process(&self, media: &MediaInput, language: Language, want_description: bool) -> ExtractionOutput {
        self.process_with(media, language, want_description, &CancelToken::new(), |_| {})
    }

    pub fn process_with<F>(
        &self,
        media: &MediaInput,
        language: Language,
        want_description: bool,
        cancel: &CancelToken,
        on_progress: F,
    ) -> ExtractionOutput
    where
        F: FnMut(&ProgressState),
    {
        info!(
            "🚀 Processing {:?} (.{}), language {}",
            media.kind(),
            media.extension(),
            language
        );
        match media.kind() {
            MediaKind::Image => self.process_image(media, language, want_description),
            MediaKind::Video => {
                self.process_video(media, language, want_description, cancel, on_progress)
            }
        }
    }

    fn process_image(&self, media: &MediaInput, language: Language, want_description: bool) -> ExtractionOutput {
        let diagnostics = Diagnostics::new();

        let image = match media.decode_image() {
            Ok(image) => image,
            Err(e) => {
                diagnostics.error(Stage::Decode, None, format!("Processing error: {}", e));
                return ExtractionOutput::failed(MediaKind::Image, diagnostics);
            }
        };

        let result = self.adapter.recognize(&image, language, &diagnostics);
        let text = if result.is_empty() {
            String::new()
        } else {
            result.text.trim().to_string()
        };

        let description = if want_description {
            match &self.describer {
                Some(describer) => Some(describer.describe(&image, &diagnostics)),
                None => {
                    diagnostics.warn(Stage::Description, "No description model configured");
                    None
                }
            }
        } else {
            None
        };

        ExtractionOutput {
            kind: MediaKind::Image,
            text,
            description,
            status: RunStatus::Completed,
            video: None,
            diagnostics: diagnostics.into_vec(),
        }
    }

    fn process_video<F>(
        &self,
        media: &MediaInput,
        language: Language,
        want_description: bool,
        cancel: &CancelToken,
        on_progress: F,
    ) -> ExtractionOutput
    where
        F: FnMut(&ProgressState),
    {
        let diagnostics = Diagnostics::new();
        if want_description {
            diagnostics.warn(Stage::Description, "Descriptions are generated for images only");
        }

        let stride = match self.config.stride() {
            Ok(stride) => stride,
            Err(e) => {
                diagnostics.error(Stage::Sampling, None, e.to_string());
                return ExtractionOutput::failed(MediaKind::Video, diagnostics);
            }
        };

        let source = match self.opener.open(media) {
            Ok(source) => source,
            Err(e) => {
                diagnostics.error(Stage::Decode, None, format!("Error in video processing: {}", e));
                return ExtractionOutput::failed(MediaKind::Video, diagnostics);
            }
        };

        let sampler = FrameSampler::new(source, stride)
            .with_cancel(cancel.clone())
            .with_progress(on_progress);
        let transcript = self.aggregator.extract_with(sampler, language, &diagnostics);

        // 一帧都没解出来：整个视频无法解码
        if let SamplerEnd::ReadFailed(reason) = &transcript.end {
            if transcript.frames_decoded == 0 {
                diagnostics.error(
                    Stage::Decode,
                    None,
                    format!("Error in video processing: {}", reason),
                );
                return ExtractionOutput::failed(MediaKind::Video, diagnostics);
            }
        }

        let status = if transcript.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        ExtractionOutput {
            kind: MediaKind::Video,
            video: Some(VideoStats::from(&transcript)),
            text: transcript.text,
            description: None,
            status,
            diagnostics: diagnostics.into_vec(),
        }
    }
}
