/// 统一的错误处理类型
///
/// 通用路径使用 anyhow::Result，通过 .context() 方法添加错误上下文信息。
/// 需要调用方区分的错误使用下面的 CoreError。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::Context;
///
/// let config = AnnotatorConfig::from_file(path)
///     .with_context(|| format!("Failed to load '{}'", path.display()))?;
/// ```
pub use anyhow::Result;

use thiserror::Error;

/// 核心层错误（日志、配置）
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidConfigValue { key: String, value: String },
}
