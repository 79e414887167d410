//! Annotator AOP - 基于文档指令的声明式织入
//!
//! 方法文档中的 `@before`、`@after`、`@around`、`@info` 以及自定义注解
//! 在织入时被解析成通知链，原方法体被替换为带通知的方法体：
//! - 注解注册表（全局单例，支持 inventory 编译期提交）
//! - 指令解析
//! - 通知链构建与方法体合成
//! - 类表：反射、方法重定义和调用

pub mod advice;
pub mod aspect;
pub mod chain;
pub mod class;
pub mod directive;
pub mod error;
pub mod joinpoint;
pub mod registry;
pub mod synthesizer;
pub mod weaver;

// 重新导出核心类型
pub use advice::{AfterAdvice, AnnotationType, AroundAdvice, BeforeAdvice, Handler, InfoHandler};
pub use aspect::{AnnotationRegistration, FunctionRegistration, LoggingAdvice, TimingAdvice};
pub use chain::{AdviceChain, ChainBuilder, Invocation};
pub use class::{
    method_body, CallSite, ClassDefinition, ClassTable, MethodBody, MethodDescriptor,
    ParameterDescriptor, Receiver, Redefinition, Reflection, Visibility,
};
pub use directive::{Directive, DirectiveParser};
pub use error::{AnnotatorError, AnnotatorResult};
pub use joinpoint::{JoinPoint, ParameterMap, Proceed};
pub use registry::{get_global_registry, AnnotationBinding, Registry};
pub use synthesizer::Synthesizer;
pub use weaver::{is_wrapped, weave_class, weave_class_with_config, WeaveReport, Weaver};

// 导出 inventory 供注解提交使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::aspect::{AnnotationRegistration, FunctionRegistration};
    pub use crate::class::{
        method_body, CallSite, ClassDefinition, ClassTable, MethodDescriptor, ParameterDescriptor,
        Receiver, Redefinition, Reflection, Visibility,
    };
    pub use crate::error::{AnnotatorError, AnnotatorResult};
    pub use crate::joinpoint::{JoinPoint, ParameterMap, Proceed};
    pub use crate::registry::{get_global_registry, Registry};
    pub use crate::weaver::{is_wrapped, weave_class, WeaveReport, Weaver};
}
