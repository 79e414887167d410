//! 注解注册表
//!
//! 保存注解名到处理器的绑定，以及内置指令按名称引用的通知函数

use crate::advice::{AnnotationType, Handler};
use crate::error::{AnnotatorError, AnnotatorResult};
use annotator_core::constants::{is_reserved_name, BUILTIN_DIRECTIVES};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

static ANNOTATION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9_]+$").expect("annotation name pattern is valid"));

/// 全局注册表
///
/// 首次访问时加载标准通知函数和所有通过 inventory 提交的注解。
/// 写锁只在注册时持有；织入前在读锁下取一份快照，织入期间的注册不影响本次织入。
static GLOBAL_REGISTRY: Lazy<Arc<RwLock<Registry>>> = Lazy::new(|| {
    let mut registry = Registry::new();
    crate::aspect::register_standard_functions(&mut registry);
    if let Err(e) = registry.auto_load() {
        tracing::error!("Failed to auto-load annotations: {}", e);
    }
    Arc::new(RwLock::new(registry))
});

/// 获取全局注册表
///
/// 使用示例：
/// ```ignore
/// use annotator_aop::{get_global_registry, AnnotationType, Handler};
///
/// get_global_registry().write().register(
///     "audit",
///     Handler::before(|jp, _, _| {
///         tracing::info!("audit {}", jp);
///         Ok(())
///     }),
///     AnnotationType::Before,
/// )?;
/// ```
pub fn get_global_registry() -> &'static Arc<RwLock<Registry>> {
    &GLOBAL_REGISTRY
}

/// 注解绑定，注册后不再修改
#[derive(Debug, Clone)]
pub struct AnnotationBinding {
    pub name: String,
    pub kind: AnnotationType,
    pub handler: Handler,
}

/// 注解注册表
///
/// 处理器以 `Arc` 共享，克隆只复制名称表
#[derive(Debug, Clone, Default)]
pub struct Registry {
    annotations: HashMap<String, AnnotationBinding>,
    functions: HashMap<String, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册注解
    ///
    /// 依次检查：名称格式、保留名、重复、处理器能否按该类型调用。
    /// 失败时注册表保持不变。
    pub fn register(
        &mut self,
        name: &str,
        handler: Handler,
        kind: AnnotationType,
    ) -> AnnotatorResult<()> {
        self.try_register(name, handler, Ok(kind))
    }

    /// 以数值类型码注册（0..=3），越界返回 `InvalidType`
    pub fn register_with_code(
        &mut self,
        name: &str,
        handler: Handler,
        code: i64,
    ) -> AnnotatorResult<()> {
        self.try_register(name, handler, AnnotationType::try_from(code))
    }

    fn try_register(
        &mut self,
        name: &str,
        handler: Handler,
        kind: AnnotatorResult<AnnotationType>,
    ) -> AnnotatorResult<()> {
        if !ANNOTATION_NAME.is_match(name) {
            return Err(AnnotatorError::InvalidName(name.to_string()));
        }
        if is_reserved_name(name) {
            return Err(AnnotatorError::ReservedName(name.to_string()));
        }
        if self.annotations.contains_key(name) {
            return Err(AnnotatorError::DuplicateName(name.to_string()));
        }
        if let Ok(expected) = kind {
            if !handler.is_invocable_as(expected) {
                return Err(AnnotatorError::NotInvocable {
                    name: name.to_string(),
                    expected,
                });
            }
        }
        let kind = kind?;

        tracing::debug!("Registering annotation @{} ({})", name, kind);
        self.annotations.insert(
            name.to_string(),
            AnnotationBinding {
                name: name.to_string(),
                kind,
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationBinding> {
        self.annotations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.annotations.contains_key(name)
    }

    /// 已注册的注解数量（不含通知函数）
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// 定义可以被内置指令按名称引用的通知函数
    ///
    /// 例如 `@before log_entry` 中的 `log_entry`
    pub fn define_function(&mut self, name: &str, handler: Handler) -> AnnotatorResult<()> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(AnnotatorError::InvalidName(name.to_string()));
        }
        if self.functions.contains_key(name) {
            return Err(AnnotatorError::DuplicateName(name.to_string()));
        }
        tracing::debug!("Defining advice function '{}' ({})", name, handler.kind());
        self.functions.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Handler> {
        self.functions.get(name)
    }

    /// 解析器可识别的全部名称：内置指令加已注册注解
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_DIRECTIVES.iter().map(|s| s.to_string()).collect();
        let mut custom: Vec<&String> = self.annotations.keys().collect();
        custom.sort();
        names.extend(custom.into_iter().cloned());
        names
    }

    /// 从 inventory 加载所有提交的注解和通知函数
    ///
    /// 返回新注册的数量
    pub fn auto_load(&mut self) -> AnnotatorResult<usize> {
        let functions: Vec<_> = crate::aspect::get_all_function_registrations().collect();
        for registration in &functions {
            tracing::debug!("  ├─ Loading advice function: {}", registration.name);
            self.define_function(registration.name, registration.create_handler())?;
        }

        let annotations: Vec<_> = crate::aspect::get_all_annotation_registrations().collect();
        for registration in &annotations {
            tracing::debug!(
                "  ├─ Loading annotation: @{} ({})",
                registration.name,
                registration.kind
            );
            self.register(registration.name, registration.create_handler(), registration.kind)?;
        }

        let loaded = functions.len() + annotations.len();
        tracing::info!("Auto-loaded {} annotation(s) and advice function(s)", loaded);
        Ok(loaded)
    }
}
