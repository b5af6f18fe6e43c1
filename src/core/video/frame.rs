use image::{DynamicImage, RgbImage};

use crate::core::media::DecodeError;

/// 采样出的一帧（用完即丢，不保留）
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub index: u64,
    pub image: DynamicImage,
}

impl FrameSample {
    pub fn new(index: u64, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 解码进度。`total` 来自容器元数据，仅供参考
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    /// 已解码帧数
    pub current: u64,
    pub total: Option<u64>,
}

impl ProgressState {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            current: 0,
            total: total.filter(|&t| t > 0),
        }
    }

    pub(crate) fn advance(&mut self) {
        self.current += 1;
    }

    /// 总帧数未知或为 0 时返回 None（不确定进度）
    pub fn fraction(&self) -> Option<f32> {
        self.total
            .map(|total| (self.current as f64 / total as f64).clamp(0.0, 1.0) as f32)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.total.is_none()
    }

    pub fn status_line(&self) -> String {
        match self.total {
            Some(total) => format!("Processing frame {} of ~{}...", self.current, total),
            None => format!("Processing frame {}...", self.current),
        }
    }
}

/// 把 ffmpeg 输出的 rgb24 原始帧包成图像
pub fn frame_from_rgb24(width: u32, height: u32, data: Vec<u8>) -> Result<DynamicImage, DecodeError> {
    let expected = (width as usize) * (height as usize) * 3;
    let actual = data.len();
    RgbImage::from_raw(width, height, data)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            DecodeError::Stream(format!(
                "rgb24 frame {}x{} needs {} bytes, got {}",
                width, height, expected, actual
            ))
        })
}
