use serde::Serialize;

use crate::core::media::{Diagnostic, MediaKind};
use crate::core::pipeline::{ExtractionOutput, RunStatus, VideoStats};

pub const TEXT_FILE_NAME: &str = "extracted_text.txt";
pub const DESCRIPTION_FILE_NAME: &str = "image_description.txt";
pub const TEXT_MIME: &str = "text/plain";

/// 可供下载的纯文本结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadBlob {
    pub file_name: String,
    pub mime: String,
    pub data: String,
}

impl DownloadBlob {
    fn text(file_name: &str, data: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime: TEXT_MIME.to_string(),
            data: data.to_string(),
        }
    }
}

/// 一次上传的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub file_name: String,
    pub kind: MediaKind,
    pub text: String,
    pub description: Option<String>,
    pub status: RunStatus,
    pub video: Option<VideoStats>,
    /// 人类可读的诊断消息
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionReport {
    pub fn from_output(file_name: &str, output: ExtractionOutput) -> Self {
        Self {
            file_name: file_name.to_string(),
            kind: output.kind,
            text: output.text,
            description: output.description,
            status: output.status,
            video: output.video,
            diagnostics: output.diagnostics,
        }
    }

    /// 非空的文本与描述才提供下载
    pub fn downloads(&self) -> Vec<DownloadBlob> {
        let mut blobs = Vec::new();
        if !self.text.is_empty() {
            blobs.push(DownloadBlob::text(TEXT_FILE_NAME, &self.text));
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            blobs.push(DownloadBlob::text(DESCRIPTION_FILE_NAME, description));
        }
        blobs
    }

    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(text: &str, description: Option<&str>) -> ExtractionReport {
        ExtractionReport {
            file_name: "upload.png".to_string(),
            kind: MediaKind::Image,
            text: text.to_string(),
            description: description.map(str::to_string),
            status: RunStatus::Completed,
            video: None,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_downloads_only_non_empty() {
        assert!(report("", None).downloads().is_empty());
        assert!(report("", Some("")).downloads().is_empty());

        let blobs = report("Total: 12.00", Some("a receipt on a table")).downloads();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].file_name, "extracted_text.txt");
        assert_eq!(blobs[0].mime, "text/plain");
        assert_eq!(blobs[1].file_name, "image_description.txt");
        assert_eq!(blobs[1].data, "a receipt on a table");
    }

    #[test]
    fn test_json_shape() {
        let json = report("hi", None).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "image");
        assert_eq!(value["status"], "completed");
        assert!(value["description"].is_null());
    }
}
