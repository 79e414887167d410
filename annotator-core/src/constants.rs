//! 内置指令与保留名称常量
//!
//! 解析器、注册表和配置层共用这些标识符，避免各处硬编码

/// 内置 INFO 指令名
pub const INFO_DIRECTIVE: &str = "info";
/// 内置 BEFORE 指令名
pub const BEFORE_DIRECTIVE: &str = "before";
/// 内置 AFTER 指令名
pub const AFTER_DIRECTIVE: &str = "after";
/// 内置 AROUND 指令名
pub const AROUND_DIRECTIVE: &str = "around";

/// 所有内置指令，按解析优先级排列
pub const BUILTIN_DIRECTIVES: &[&str] = &[
    INFO_DIRECTIVE,
    BEFORE_DIRECTIVE,
    AFTER_DIRECTIVE,
    AROUND_DIRECTIVE,
];

/// 不允许自定义注册的名称
///
/// `info` 不在其中：可以注册，但解析时内置 `info` 优先
pub const RESERVED_ANNOTATION_NAMES: &[&str] = &[BEFORE_DIRECTIVE, AFTER_DIRECTIVE, AROUND_DIRECTIVE];

/// 环境变量：覆盖重复织入策略
pub const ENV_REWEAVE: &str = "ANNOTATOR_REWEAVE";

/// 检查名称是否为内置指令
///
/// # Example
/// ```
/// use annotator_core::constants::is_builtin_directive;
///
/// assert!(is_builtin_directive("around"));
/// assert!(!is_builtin_directive("cache"));
/// ```
pub fn is_builtin_directive(name: &str) -> bool {
    BUILTIN_DIRECTIVES.contains(&name)
}

/// 检查名称是否为保留名称（大小写敏感）
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_ANNOTATION_NAMES.contains(&name)
}
