//! 注解提交与预定义通知
//!
//! 注解和通知函数可以通过 inventory 在编译期提交，
//! 全局注册表首次访问时统一加载

use crate::advice::{AfterAdvice, AnnotationType, AroundAdvice, BeforeAdvice, Handler};
use crate::joinpoint::{JoinPoint, ParameterMap, Proceed};
use crate::registry::Registry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// 注解提交
///
/// ```ignore
/// annotator_aop::inventory::submit! {
///     AnnotationRegistration::new("audit", AnnotationType::Before, || {
///         Handler::before(|jp, _, _| {
///             tracing::info!("audit {}", jp);
///             Ok(())
///         })
///     })
/// }
/// ```
pub struct AnnotationRegistration {
    /// 注解名称
    pub name: &'static str,

    /// 注解类型
    pub kind: AnnotationType,

    /// 创建处理器的函数
    pub creator: fn() -> Handler,
}

impl AnnotationRegistration {
    pub const fn new(name: &'static str, kind: AnnotationType, creator: fn() -> Handler) -> Self {
        Self {
            name,
            kind,
            creator,
        }
    }

    pub fn create_handler(&self) -> Handler {
        (self.creator)()
    }
}

inventory::collect!(AnnotationRegistration);

/// 通知函数提交（供内置指令按名称引用）
pub struct FunctionRegistration {
    pub name: &'static str,
    pub creator: fn() -> Handler,
}

impl FunctionRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Handler) -> Self {
        Self { name, creator }
    }

    pub fn create_handler(&self) -> Handler {
        (self.creator)()
    }
}

inventory::collect!(FunctionRegistration);

pub fn get_all_annotation_registrations() -> impl Iterator<Item = &'static AnnotationRegistration> {
    inventory::iter::<AnnotationRegistration>()
}

pub fn get_all_function_registrations() -> impl Iterator<Item = &'static FunctionRegistration> {
    inventory::iter::<FunctionRegistration>()
}

// ============================================================================
// 预定义的常用通知
// ============================================================================

/// 日志通知 - 记录方法进入和返回
///
/// 作为 before 使用时记录参数，作为 after 使用时记录结果和耗时，结果原样返回
pub struct LoggingAdvice {
    log_args: bool,
    log_result: bool,
}

impl LoggingAdvice {
    pub fn new() -> Self {
        Self {
            log_args: true,
            log_result: true,
        }
    }

    pub fn without_args(mut self) -> Self {
        self.log_args = false;
        self
    }

    pub fn without_result(mut self) -> Self {
        self.log_result = false;
        self
    }
}

impl Default for LoggingAdvice {
    fn default() -> Self {
        Self::new()
    }
}

impl BeforeAdvice for LoggingAdvice {
    fn before(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
    ) -> anyhow::Result<()> {
        if self.log_args {
            tracing::info!(
                tags = ?options,
                "→ Entering: {} {}",
                join_point,
                params.snapshot()
            );
        } else {
            tracing::info!(tags = ?options, "→ Entering: {}", join_point);
        }
        Ok(())
    }
}

impl AfterAdvice for LoggingAdvice {
    fn after(
        &self,
        join_point: &JoinPoint,
        _params: &ParameterMap,
        options: &[String],
        result: Value,
    ) -> anyhow::Result<Value> {
        let elapsed = join_point.timestamp.elapsed();
        if self.log_result {
            tracing::info!(
                tags = ?options,
                "← Exiting: {} = {} (took {:?})",
                join_point,
                result,
                elapsed
            );
        } else {
            tracing::info!(tags = ?options, "← Exiting: {} (took {:?})", join_point, elapsed);
        }
        Ok(result)
    }
}

/// 性能监控通知
///
/// 第一个选项是阈值（毫秒），缺省使用构造时的阈值
pub struct TimingAdvice {
    threshold_ms: u128,
}

impl TimingAdvice {
    pub fn new(threshold_ms: u128) -> Self {
        Self { threshold_ms }
    }

    fn threshold(&self, options: &[String]) -> u128 {
        options
            .first()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(self.threshold_ms)
    }
}

impl AroundAdvice for TimingAdvice {
    fn around(
        &self,
        join_point: &JoinPoint,
        _params: &ParameterMap,
        options: &[String],
        proceed: &Proceed<'_>,
    ) -> anyhow::Result<Value> {
        let threshold = self.threshold(options);
        let started = Instant::now();
        let result = proceed.proceed();
        let elapsed = started.elapsed().as_millis();

        if elapsed > threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {}ms (threshold: {}ms)",
                join_point,
                elapsed,
                threshold
            );
        } else {
            tracing::debug!("{} took {}ms", join_point, elapsed);
        }
        result
    }
}

/// 标准通知函数名
pub const LOG_ENTRY_FUNCTION: &str = "log_entry";
pub const LOG_EXIT_FUNCTION: &str = "log_exit";
pub const TIME_CALL_FUNCTION: &str = "time_call";

/// 注册标准通知函数：`log_entry`（before）、`log_exit`（after）、`time_call`（around）
pub fn register_standard_functions(registry: &mut Registry) {
    let logging = Arc::new(LoggingAdvice::new());
    let functions = [
        (LOG_ENTRY_FUNCTION, Handler::Before(logging.clone())),
        (LOG_EXIT_FUNCTION, Handler::After(logging)),
        (TIME_CALL_FUNCTION, Handler::Around(Arc::new(TimingAdvice::new(500)))),
    ];

    for (name, handler) in functions {
        if let Err(e) = registry.define_function(name, handler) {
            tracing::warn!("Skipping standard advice function '{}': {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Receiver;

    inventory::submit! {
        AnnotationRegistration::new("submitted_marker", AnnotationType::Info, || {
            Handler::info(|_, _, _| Ok(()))
        })
    }

    inventory::submit! {
        FunctionRegistration::new("submitted_function", || Handler::before(|_, _, _| Ok(())))
    }

    #[test]
    fn test_auto_load_collects_submissions() {
        let mut registry = Registry::new();
        let loaded = registry.auto_load().unwrap();

        assert!(loaded >= 2);
        assert_eq!(
            registry.get("submitted_marker").map(|b| b.kind),
            Some(AnnotationType::Info)
        );
        assert!(registry.function("submitted_function").is_some());
    }

    #[test]
    fn test_standard_functions() {
        let mut registry = Registry::new();
        register_standard_functions(&mut registry);

        let kinds: Vec<_> = [LOG_ENTRY_FUNCTION, LOG_EXIT_FUNCTION, TIME_CALL_FUNCTION]
            .iter()
            .map(|name| registry.function(name).map(Handler::kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(AnnotationType::Before),
                Some(AnnotationType::After),
                Some(AnnotationType::Around)
            ]
        );

        // 重复注册只记录警告
        register_standard_functions(&mut registry);
    }

    #[test]
    fn test_logging_after_passes_result_through() {
        let jp = JoinPoint::new("Account".into(), "balance".into(), Receiver::Static);
        let params = ParameterMap::new();
        let result = LoggingAdvice::new()
            .after(&jp, &params, &[], serde_json::json!(42))
            .unwrap();
        assert_eq!(result, serde_json::json!(42));
    }

    #[test]
    fn test_timing_threshold_option() {
        let advice = TimingAdvice::new(500);
        assert_eq!(advice.threshold(&[]), 500);
        assert_eq!(advice.threshold(&["20".to_string()]), 20);
        assert_eq!(advice.threshold(&["soon".to_string()]), 500);
    }
}
