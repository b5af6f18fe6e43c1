//! 图像描述适配器
//!
//! 描述模型初始化代价高：每个 `DescriptionService` 最多成功加载一次，之后
//! 一直复用。服务放在 `Arc` 里跨多次运行、多个提取器共享；`ModelRegistry`
//! 按模型标识去重，同一进程里同一模型只有一个服务。

use image::DynamicImage;
use log::{debug, info};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::diagnostics::{Diagnostics, Stage};
use super::error::ModelError;

pub trait CaptionModel: Send + Sync {
    fn caption(&self, image: &DynamicImage) -> Result<String, ModelError>;
}

/// 模型工厂，`model_id` 标识被缓存的模型
pub trait ModelLoader: Send + Sync {
    fn model_id(&self) -> &str;
    fn load(&self) -> Result<Arc<dyn CaptionModel>, ModelError>;
}

pub struct DescriptionService {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Arc<dyn CaptionModel>>,
}

impl DescriptionService {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.loader.model_id()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// 首次调用时加载；并发首次调用只有一个会真正执行 `load`。
    /// 加载失败不缓存，下次调用会重试
    fn model(&self) -> Result<&Arc<dyn CaptionModel>, ModelError> {
        self.model.get_or_try_init(|| {
            info!("🔧 Loading caption model: {}", self.loader.model_id());
            let model = self.loader.load()?;
            info!("✅ Caption model ready: {}", self.loader.model_id());
            Ok(model)
        })
    }

    pub fn try_describe(&self, image: &DynamicImage) -> Result<String, ModelError> {
        let model = self.model()?;
        let caption = model.caption(image)?;
        debug!("Caption: {}", caption);
        Ok(caption.trim().to_string())
    }

    /// 失败时返回空字符串并记录诊断
    pub fn describe(&self, image: &DynamicImage, diagnostics: &Diagnostics) -> String {
        match self.try_describe(image) {
            Ok(caption) => caption,
            Err(e) => {
                diagnostics.error(
                    Stage::Description,
                    None,
                    format!("Error in generating description: {}", e),
                );
                String::new()
            }
        }
    }
}

/// 模型标识 -> 描述服务
#[derive(Default)]
pub struct ModelRegistry {
    services: Mutex<HashMap<String, Arc<DescriptionService>>>,
}

static GLOBAL_REGISTRY: Lazy<ModelRegistry> = Lazy::new(ModelRegistry::new);

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享表
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL_REGISTRY
    }

    /// `key` 已登记时返回已有服务，`loader` 不会被调用
    pub fn service<F>(&self, key: &str, loader: F) -> Arc<DescriptionService>
    where
        F: FnOnce() -> Box<dyn ModelLoader>,
    {
        let mut services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        services
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Registering description service: {}", key);
                Arc::new(DescriptionService::new(loader()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.services.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
