//! 通知（Advice）定义
//!
//! 四种注解类型各对应一个处理器 trait，闭包通过 blanket impl 直接满足这些 trait

use crate::error::AnnotatorError;
use crate::joinpoint::{JoinPoint, ParameterMap, Proceed};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 注解类型
///
/// 数值编码与注册接口保持一致：INFO=0, BEFORE=1, AFTER=2, AROUND=3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnnotationType {
    /// 织入时立即执行一次，不进入调用链
    Info = 0,
    /// 前置通知
    Before = 1,
    /// 后置通知（串联返回值）
    After = 2,
    /// 环绕通知（可以控制方法执行）
    Around = 3,
}

impl AnnotationType {
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for AnnotationType {
    type Error = AnnotatorError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AnnotationType::Info),
            1 => Ok(AnnotationType::Before),
            2 => Ok(AnnotationType::After),
            3 => Ok(AnnotationType::Around),
            other => Err(AnnotatorError::InvalidType(other)),
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationType::Info => write!(f, "info"),
            AnnotationType::Before => write!(f, "before"),
            AnnotationType::After => write!(f, "after"),
            AnnotationType::Around => write!(f, "around"),
        }
    }
}

/// INFO 处理器
///
/// 织入时调用，参数为 `(类名, 方法名, 选项)`。
/// [`weave_class`](crate::weaver::weave_class) 在注册表快照上织入，处理器里可以再注册注解；
/// 直接把全局注册表的读锁交给 [`Weaver`](crate::weaver::Weaver) 时不能这样做，写锁会死锁。
pub trait InfoHandler: Send + Sync {
    fn info(&self, class: &str, method: &str, options: &[String]) -> anyhow::Result<()>;
}

/// 前置通知
///
/// 不接收也不影响返回值，可以通过参数表检查或修改实参
pub trait BeforeAdvice: Send + Sync {
    fn before(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
    ) -> anyhow::Result<()>;
}

/// 后置通知
///
/// 接收上一步的结果，返回值作为下一步的输入
pub trait AfterAdvice: Send + Sync {
    fn after(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
        result: Value,
    ) -> anyhow::Result<Value>;
}

/// 环绕通知
///
/// 由通知决定是否、何时、调用几次 `proceed`
pub trait AroundAdvice: Send + Sync {
    fn around(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
        proceed: &Proceed<'_>,
    ) -> anyhow::Result<Value>;
}

impl<F> InfoHandler for F
where
    F: Fn(&str, &str, &[String]) -> anyhow::Result<()> + Send + Sync,
{
    fn info(&self, class: &str, method: &str, options: &[String]) -> anyhow::Result<()> {
        self(class, method, options)
    }
}

impl<F> BeforeAdvice for F
where
    F: Fn(&JoinPoint, &ParameterMap, &[String]) -> anyhow::Result<()> + Send + Sync,
{
    fn before(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
    ) -> anyhow::Result<()> {
        self(join_point, params, options)
    }
}

impl<F> AfterAdvice for F
where
    F: Fn(&JoinPoint, &ParameterMap, &[String], Value) -> anyhow::Result<Value> + Send + Sync,
{
    fn after(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
        result: Value,
    ) -> anyhow::Result<Value> {
        self(join_point, params, options, result)
    }
}

impl<F> AroundAdvice for F
where
    F: Fn(&JoinPoint, &ParameterMap, &[String], &Proceed<'_>) -> anyhow::Result<Value>
        + Send
        + Sync,
{
    fn around(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        options: &[String],
        proceed: &Proceed<'_>,
    ) -> anyhow::Result<Value> {
        self(join_point, params, options, proceed)
    }
}

/// 处理器
///
/// 注册表和函数表中保存的值，变体决定了它能以哪种类型被调用
#[derive(Clone)]
pub enum Handler {
    Info(Arc<dyn InfoHandler>),
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    Around(Arc<dyn AroundAdvice>),
}

impl Handler {
    pub fn info<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Info(Arc::new(f))
    }

    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &ParameterMap, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Before(Arc::new(f))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &ParameterMap, &[String], Value) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        Handler::After(Arc::new(f))
    }

    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &ParameterMap, &[String], &Proceed<'_>) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        Handler::Around(Arc::new(f))
    }

    /// 该处理器可以被调用的注解类型
    pub fn kind(&self) -> AnnotationType {
        match self {
            Handler::Info(_) => AnnotationType::Info,
            Handler::Before(_) => AnnotationType::Before,
            Handler::After(_) => AnnotationType::After,
            Handler::Around(_) => AnnotationType::Around,
        }
    }

    pub fn is_invocable_as(&self, kind: AnnotationType) -> bool {
        self.kind() == kind
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{:?}", self.kind())
    }
}
