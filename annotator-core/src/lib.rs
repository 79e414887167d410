// annotator-core: 织入引擎的基础设施
//
// 提供：
// - 日志初始化（tracing-subscriber）
// - TOML 配置与环境变量覆盖
// - 内置指令等共享常量

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// 重新导出常用类型
pub use config::{AnnotatorConfig, ReweavePolicy, WeavingConfig};
pub use constants::*;
pub use error::{CoreError, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::config::{AnnotatorConfig, ReweavePolicy, WeavingConfig};
    pub use crate::error::{CoreError, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use anyhow::{anyhow, Context};
}
