use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::error::DecodeError;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "avi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// 按文件头识别：PNG / JPEG / BMP 签名，mp4/mov 的 `ftyp` box，AVI 的 RIFF 头
    pub fn sniff(bytes: &[u8]) -> Option<(Self, &'static str)> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some((MediaKind::Image, "png"));
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some((MediaKind::Image, "jpg"));
        }
        if bytes.starts_with(b"BM") && bytes.len() >= 14 {
            return Some((MediaKind::Image, "bmp"));
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            let ext = if &bytes[8..10] == b"qt" { "mov" } else { "mp4" };
            return Some((MediaKind::Video, ext));
        }
        if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"AVI " {
            return Some((MediaKind::Video, "avi"));
        }
        None
    }
}

#[derive(Debug, Clone)]
pub enum MediaSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// 一次上传的媒体，构造后不可变
#[derive(Debug, Clone)]
pub struct MediaInput {
    kind: MediaKind,
    source: MediaSource,
    extension: String,
}

impl MediaInput {
    /// 扩展名优先，识别不了再看文件头
    pub fn from_bytes(bytes: Vec<u8>, file_name: &str) -> Result<Self, DecodeError> {
        let declared = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        let (kind, extension) = match declared
            .as_deref()
            .and_then(|ext| MediaKind::from_extension(ext).map(|k| (k, ext.to_string())))
        {
            Some(found) => found,
            None => MediaKind::sniff(&bytes)
                .map(|(k, ext)| (k, ext.to_string()))
                .ok_or_else(|| DecodeError::UnsupportedFormat(file_name.to_string()))?,
        };

        Ok(Self {
            kind,
            source: MediaSource::Bytes(bytes),
            extension,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let declared = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        if let Some(ext) = declared.as_deref() {
            if let Some(kind) = MediaKind::from_extension(ext) {
                return Ok(Self {
                    kind,
                    source: MediaSource::File(path.to_path_buf()),
                    extension: ext.to_string(),
                });
            }
        }

        let mut header = [0u8; 16];
        let read = read_prefix(path, &mut header)?;
        let (kind, ext) = MediaKind::sniff(&header[..read])
            .ok_or_else(|| DecodeError::UnsupportedFormat(path.display().to_string()))?;

        Ok(Self {
            kind,
            source: MediaSource::File(path.to_path_buf()),
            extension: ext.to_string(),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn decode_image(&self) -> Result<DynamicImage, DecodeError> {
        let img = match &self.source {
            MediaSource::Bytes(bytes) => image::load_from_memory(bytes)?,
            MediaSource::File(path) => image::open(path)?,
        };
        Ok(img)
    }
}

fn read_prefix(path: &Path, buf: &mut [u8]) -> Result<usize, DecodeError> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
