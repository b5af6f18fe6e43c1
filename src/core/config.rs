use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use crate::core::media::{ConfigError, Language};
use crate::core::video::AggregationOptions;

pub const MIN_FRAME_STRIDE: u32 = 1;
pub const MAX_FRAME_STRIDE: u32 = 60;
pub const DEFAULT_FRAME_STRIDE: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub language: Language,
    /// 每 N 帧识别一次
    pub frame_stride: u32,
    /// 仅对图片生效
    pub want_description: bool,
    pub collapse_repeats: bool,
    pub parallel_recognition: bool,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            frame_stride: DEFAULT_FRAME_STRIDE,
            want_description: false,
            collapse_repeats: false,
            parallel_recognition: false,
            batch_size: num_cpus::get().max(1),
        }
    }
}

impl PipelineConfig {
    pub fn for_short_clips() -> Self {
        Self {
            frame_stride: 5,
            ..Default::default()
        }
    }

    pub fn for_long_videos() -> Self {
        Self {
            frame_stride: MAX_FRAME_STRIDE,
            collapse_repeats: true,
            parallel_recognition: true,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stride()?;
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }

    pub fn stride(&self) -> Result<NonZeroU32, ConfigError> {
        if !(MIN_FRAME_STRIDE..=MAX_FRAME_STRIDE).contains(&self.frame_stride) {
            return Err(ConfigError::StrideOutOfRange {
                value: self.frame_stride,
                min: MIN_FRAME_STRIDE,
                max: MAX_FRAME_STRIDE,
            });
        }
        NonZeroU32::new(self.frame_stride).ok_or(ConfigError::StrideOutOfRange {
            value: self.frame_stride,
            min: MIN_FRAME_STRIDE,
            max: MAX_FRAME_STRIDE,
        })
    }

    pub fn aggregation_options(&self) -> AggregationOptions {
        AggregationOptions {
            collapse_repeats: self.collapse_repeats,
            parallel: self.parallel_recognition,
            batch_size: self.batch_size.max(1),
        }
    }
}
