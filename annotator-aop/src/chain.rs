//! 通知链构建
//!
//! 把一个方法的指令按出现顺序分成前置序列、后置序列和环绕链；INFO 指令在构建时立即执行

use crate::advice::{AfterAdvice, AnnotationType, AroundAdvice, BeforeAdvice, Handler};
use crate::directive::Directive;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::registry::Registry;
use std::fmt;
use std::sync::Arc;

/// 一次通知调用：处理器加上指令里的字面选项
pub struct Invocation<H: ?Sized> {
    /// 来源指令名
    pub annotation: String,
    pub handler: Arc<H>,
    pub options: Vec<String>,
}

impl<H: ?Sized> Clone for Invocation<H> {
    fn clone(&self) -> Self {
        Self {
            annotation: self.annotation.clone(),
            handler: self.handler.clone(),
            options: self.options.clone(),
        }
    }
}

impl<H: ?Sized> fmt::Debug for Invocation<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("annotation", &self.annotation)
            .field("options", &self.options)
            .finish()
    }
}

/// 通知链
///
/// `around` 按声明顺序保存，最后声明的在最外层
#[derive(Debug, Clone, Default)]
pub struct AdviceChain {
    pub before: Vec<Invocation<dyn BeforeAdvice>>,
    pub after: Vec<Invocation<dyn AfterAdvice>>,
    pub around: Vec<Invocation<dyn AroundAdvice>>,
    /// 构建时执行的 INFO 处理器数量
    pub info_invocations: usize,
}

impl AdviceChain {
    /// 没有任何运行时通知，方法不需要包装
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.around.is_empty()
    }

    pub fn len(&self) -> usize {
        self.before.len() + self.after.len() + self.around.len()
    }
}

/// 通知链构建器
pub struct ChainBuilder<'r> {
    registry: &'r Registry,
}

impl<'r> ChainBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// 构建 `class::method` 的通知链
    ///
    /// 内置指令的第一个选项是通知函数名，其余选项是参数；
    /// 自定义注解（包括 INFO 类型）的选项全部作为参数。
    pub fn build(
        &self,
        class: &str,
        method: &str,
        directives: &[Directive],
    ) -> AnnotatorResult<AdviceChain> {
        let mut chain = AdviceChain::default();

        for directive in directives {
            let (handler, options) = self.resolve(class, method, directive)?;
            let annotation = directive.name.clone();

            match handler {
                Handler::Info(handler) => {
                    tracing::debug!("Running @{} for {}::{}", annotation, class, method);
                    handler.info(class, method, &options).map_err(|e| {
                        AnnotatorError::InfoHandlerFailed {
                            class: class.to_string(),
                            method: method.to_string(),
                            directive: annotation.clone(),
                            message: format!("{:#}", e),
                        }
                    })?;
                    chain.info_invocations += 1;
                }
                Handler::Before(handler) => chain.before.push(Invocation {
                    annotation,
                    handler,
                    options,
                }),
                Handler::After(handler) => chain.after.push(Invocation {
                    annotation,
                    handler,
                    options,
                }),
                Handler::Around(handler) => chain.around.push(Invocation {
                    annotation,
                    handler,
                    options,
                }),
            }
        }

        Ok(chain)
    }

    fn resolve(
        &self,
        class: &str,
        method: &str,
        directive: &Directive,
    ) -> AnnotatorResult<(Handler, Vec<String>)> {
        let Some(kind) = builtin_kind(&directive.name) else {
            let binding = self.registry.get(&directive.name).ok_or_else(|| {
                AnnotatorError::UnknownHandler {
                    class: class.to_string(),
                    method: method.to_string(),
                    directive: directive.name.clone(),
                    function: directive.name.clone(),
                    line: directive.line,
                }
            })?;
            return Ok((binding.handler.clone(), directive.options.clone()));
        };

        let (function, rest) =
            directive
                .options
                .split_first()
                .ok_or_else(|| AnnotatorError::MissingHandler {
                    class: class.to_string(),
                    method: method.to_string(),
                    directive: directive.name.clone(),
                    line: directive.line,
                })?;

        let handler = self
            .registry
            .function(function)
            .ok_or_else(|| AnnotatorError::UnknownHandler {
                class: class.to_string(),
                method: method.to_string(),
                directive: directive.name.clone(),
                function: function.clone(),
                line: directive.line,
            })?;

        if !handler.is_invocable_as(kind) {
            return Err(AnnotatorError::HandlerKindMismatch {
                class: class.to_string(),
                method: method.to_string(),
                directive: directive.name.clone(),
                function: function.clone(),
                expected: kind,
                actual: handler.kind(),
                line: directive.line,
            });
        }

        Ok((handler.clone(), rest.to_vec()))
    }
}

fn builtin_kind(name: &str) -> Option<AnnotationType> {
    use annotator_core::constants::*;

    match name {
        INFO_DIRECTIVE => Some(AnnotationType::Info),
        BEFORE_DIRECTIVE => Some(AnnotationType::Before),
        AFTER_DIRECTIVE => Some(AnnotationType::After),
        AROUND_DIRECTIVE => Some(AnnotationType::Around),
        _ => None,
    }
}
