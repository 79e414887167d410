//! 织入配置
//!
//! 从 TOML 读取，环境变量优先级更高：
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [weaving]
//! reweave = "error"
//! ```

use crate::constants::ENV_REWEAVE;
use crate::error::CoreError;
use crate::logging::LoggingConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 同一个类被第二次织入时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReweavePolicy {
    /// 跳过已织入的方法，weave 幂等
    #[default]
    Skip,
    /// 遇到已织入的方法直接报错
    Error,
}

impl FromStr for ReweavePolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(ReweavePolicy::Skip),
            "error" => Ok(ReweavePolicy::Error),
            _ => Err(CoreError::InvalidConfigValue {
                key: "weaving.reweave".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// `[weaving]` 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeavingConfig {
    pub reweave: ReweavePolicy,
}

/// 顶层配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub logging: LoggingConfig,
    pub weaving: WeavingConfig,
}

impl AnnotatorConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CoreError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded annotator config from '{}'", path.display());
        Ok(config)
    }

    /// 环境变量覆盖：日志相关变量见 [`LoggingConfig::with_env_overrides`]，
    /// 另外读取 `ANNOTATOR_REWEAVE`
    pub fn with_env_overrides(mut self) -> Result<Self, CoreError> {
        self.logging = self.logging.with_env_overrides();
        if let Ok(value) = std::env::var(ENV_REWEAVE) {
            self.weaving.reweave = value.parse()?;
        }
        Ok(self)
    }
}
