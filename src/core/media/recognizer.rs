//! 识别适配器 - 包装 OCR 引擎，单次调用失败不外溢

use image::{DynamicImage, GrayImage};
use log::debug;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::diagnostics::{Diagnostics, Stage};
use super::error::EngineError;
use super::language::Language;

/// OCR 引擎协作方：灰度图 + 语言代码 -> 文本
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage, language_code: &str) -> Result<String, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionStatus {
    Recognized,
    Failed(String),
}

/// 单次识别结果，失败时文本为空
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub text: String,
    pub status: RecognitionStatus,
}

impl RecognitionResult {
    pub fn recognized(text: String) -> Self {
        Self {
            text,
            status: RecognitionStatus::Recognized,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            text: String::new(),
            status: RecognitionStatus::Failed(message),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, RecognitionStatus::Failed(_))
    }

    /// 去掉首尾空白后为空（OCR 对空白帧的噪声输出）
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// 已是单通道时直接借用，否则转换
pub fn to_grayscale(image: &DynamicImage) -> Cow<'_, GrayImage> {
    match image {
        DynamicImage::ImageLuma8(gray) => Cow::Borrowed(gray),
        other => Cow::Owned(other.to_luma8()),
    }
}

#[derive(Clone)]
pub struct RecognitionAdapter {
    engine: Arc<dyn TextRecognizer>,
}

impl RecognitionAdapter {
    pub fn new(engine: Arc<dyn TextRecognizer>) -> Self {
        Self { engine }
    }

    pub fn recognize(
        &self,
        image: &DynamicImage,
        language: Language,
        diagnostics: &Diagnostics,
    ) -> RecognitionResult {
        self.recognize_unit(image, language, None, diagnostics)
    }

    /// `frame_index` 只用于诊断信息
    pub fn recognize_unit(
        &self,
        image: &DynamicImage,
        language: Language,
        frame_index: Option<u64>,
        diagnostics: &Diagnostics,
    ) -> RecognitionResult {
        let gray = to_grayscale(image);
        if gray.width() == 0 || gray.height() == 0 {
            return Self::report(EngineError::EmptyImage, frame_index, diagnostics);
        }

        match self.engine.recognize(&gray, language.code()) {
            Ok(text) => {
                debug!(
                    "🔤 Recognized {} chars (frame {:?}, lang {})",
                    text.len(),
                    frame_index,
                    language.code()
                );
                RecognitionResult::recognized(text)
            }
            Err(e) => Self::report(e, frame_index, diagnostics),
        }
    }

    fn report(
        err: EngineError,
        frame_index: Option<u64>,
        diagnostics: &Diagnostics,
    ) -> RecognitionResult {
        let message = match frame_index {
            Some(index) => format!("Error in text extraction (frame {}): {}", index, err),
            None => format!("Error in text extraction: {}", err),
        };
        diagnostics.error(Stage::Recognition, frame_index, message.clone());
        RecognitionResult::failed(message)
    }
}

type RecognizePattern = Box<dyn Fn(&GrayImage, &str) -> Result<String, EngineError> + Send + Sync>;

/// 测试用引擎：按图像内容决定输出，并统计调用次数
pub struct MockTextRecognizer {
    pattern: RecognizePattern,
    calls: AtomicUsize,
}

impl MockTextRecognizer {
    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&GrayImage, &str) -> Result<String, EngineError> + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(pattern),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::with_pattern(move |_, _| Ok(text.clone()))
    }

    pub fn blank() -> Self {
        Self::fixed("")
    }

    /// 左上角像素亮度作为帧标记，配合 `marker_frame` 使用
    pub fn by_marker<F>(lookup: F) -> Self
    where
        F: Fn(u8) -> Result<String, EngineError> + Send + Sync + 'static,
    {
        Self::with_pattern(move |img, _| lookup(img.get_pixel(0, 0)[0]))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(&self, image: &GrayImage, language_code: &str) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.pattern)(image, language_code)
    }
}

/// 纯色灰度帧，像素值即标记
#[cfg(test)]
pub(crate) fn marker_frame(marker: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, image::Luma([marker])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_grayscale_passthrough_borrows() {
        let img = marker_frame(7);
        assert!(matches!(to_grayscale(&img), Cow::Borrowed(_)));

        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let gray = to_grayscale(&rgb);
        assert!(matches!(gray, Cow::Owned(_)));
        assert_eq!(gray.dimensions(), (2, 2));
    }

    #[test]
    fn test_engine_receives_language_code() {
        let engine = Arc::new(MockTextRecognizer::with_pattern(|_, code| Ok(code.to_string())));
        let adapter = RecognitionAdapter::new(engine);
        let diagnostics = Diagnostics::new();

        let result = adapter.recognize(&marker_frame(0), Language::ChineseSimplified, &diagnostics);
        assert_eq!(result.text, "chi_sim");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_engine_failure_downgraded_to_empty() {
        let engine = Arc::new(MockTextRecognizer::with_pattern(|_, code| {
            Err(EngineError::MissingLanguage(code.to_string()))
        }));
        let adapter = RecognitionAdapter::new(engine);
        let diagnostics = Diagnostics::new();

        let result = adapter.recognize(&marker_frame(0), Language::Russian, &diagnostics);
        assert!(result.is_failure());
        assert!(result.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.snapshot()[0].message.contains("rus"));
    }

    #[test]
    fn test_empty_image_not_sent_to_engine() {
        let engine = Arc::new(MockTextRecognizer::fixed("never"));
        let adapter = RecognitionAdapter::new(engine.clone());
        let diagnostics = Diagnostics::new();

        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let result = adapter.recognize(&empty, Language::English, &diagnostics);
        assert!(result.is_failure());
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_recognize_is_idempotent() {
        let engine = Arc::new(MockTextRecognizer::by_marker(|m| Ok(format!("unit-{}", m))));
        let adapter = RecognitionAdapter::new(engine);
        let diagnostics = Diagnostics::new();
        let img = marker_frame(42);

        let first = adapter.recognize(&img, Language::English, &diagnostics);
        let second = adapter.recognize(&img, Language::English, &diagnostics);
        assert_eq!(first, second);
        assert_eq!(first.text, "unit-42");
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let result = RecognitionResult::recognized(" \n\x0c".to_string());
        assert!(result.is_empty());
        assert!(!result.is_failure());
    }
}
