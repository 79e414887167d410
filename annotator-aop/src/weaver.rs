//! 织入器
//!
//! 读取类中每个方法的文档指令，构建通知链并替换方法体

use crate::chain::ChainBuilder;
use crate::class::{ClassTable, Redefinition, Reflection};
use crate::directive::DirectiveParser;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::registry::{get_global_registry, Registry};
use crate::synthesizer::Synthesizer;
use annotator_core::config::{AnnotatorConfig, ReweavePolicy};
use serde::Serialize;

/// 一次织入的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    pub class: String,

    /// 安装了织入方法体的方法
    pub wrapped: Vec<String>,

    /// 之前已处理过而跳过的方法（包括只有 INFO 指令的方法）
    pub skipped: Vec<String>,

    /// 织入期间执行的 INFO 处理器数量
    pub info_invocations: usize,
}

impl WeaveReport {
    fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            ..Default::default()
        }
    }
}

/// 织入器
///
/// 织入期间注册表不会变化：借用的注册表要么是调用方持有读锁的全局表，要么是快照
pub struct Weaver<'a, T: Reflection + Redefinition> {
    registry: &'a Registry,
    table: &'a T,
    policy: ReweavePolicy,
}

impl<'a, T: Reflection + Redefinition> Weaver<'a, T> {
    pub fn new(registry: &'a Registry, table: &'a T) -> Self {
        Self {
            registry,
            table,
            policy: ReweavePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReweavePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn from_config(registry: &'a Registry, table: &'a T, config: &AnnotatorConfig) -> Self {
        Self::new(registry, table).with_policy(config.weaving.reweave)
    }

    /// 织入一个类
    ///
    /// 按反射给出的顺序处理方法；任何一步失败都会中止，已替换的方法保持替换
    pub fn weave(&self, class: &str) -> AnnotatorResult<WeaveReport> {
        let methods = self
            .table
            .list_methods(class)
            .ok_or_else(|| AnnotatorError::ClassNotFound(class.to_string()))?;

        tracing::debug!("🔷 Weaving class {} ({} method(s))", class, methods.len());

        let parser = DirectiveParser::new(self.registry.known_names());
        let builder = ChainBuilder::new(self.registry);
        let mut report = WeaveReport::new(class);

        for descriptor in methods {
            let Some(documentation) = descriptor.documentation.as_deref() else {
                continue;
            };
            if documentation.trim().is_empty() {
                continue;
            }

            let directives = parser.parse(documentation);
            if directives.is_empty() {
                continue;
            }

            if self.table.is_processed(class, &descriptor.name) {
                match self.policy {
                    ReweavePolicy::Skip => {
                        tracing::warn!(
                            "⚠️ {}::{} was already processed, skipping",
                            class,
                            descriptor.name
                        );
                        report.skipped.push(descriptor.name.clone());
                        continue;
                    }
                    ReweavePolicy::Error => {
                        return Err(AnnotatorError::AlreadyWoven {
                            class: class.to_string(),
                            method: descriptor.name.clone(),
                        });
                    }
                }
            }

            let chain = builder.build(class, &descriptor.name, &directives)?;
            report.info_invocations += chain.info_invocations;
            if chain.is_empty() {
                tracing::debug!("{}::{} has no runtime advice", class, descriptor.name);
                self.table.mark_processed(class, &descriptor.name)?;
                continue;
            }

            tracing::debug!(
                "  ├─ {}::{} ({} advice)",
                class,
                descriptor.name,
                chain.len()
            );
            let original = self.table.original_body(class, &descriptor.name)?;
            let body = Synthesizer::synthesize(class, &descriptor, chain, original);
            self.table.replace(class, &descriptor.name, body)?;
            report.wrapped.push(descriptor.name);
        }

        tracing::info!(
            "Woven {}: {} wrapped, {} skipped, {} info handler(s) run",
            report.class,
            report.wrapped.len(),
            report.skipped.len(),
            report.info_invocations
        );
        Ok(report)
    }

    /// 方法是否装有织入后的方法体
    pub fn is_wrapped(&self, class: &str, method: &str) -> bool {
        self.table.is_woven(class, method)
    }
}

/// 使用全局注册表织入
///
/// 织入基于注册表的快照，读锁在织入开始前释放，INFO 处理器可以继续注册注解
pub fn weave_class(table: &ClassTable, class: &str) -> AnnotatorResult<WeaveReport> {
    let registry = global_snapshot();
    Weaver::new(&registry, table).weave(class)
}

/// 同 [`weave_class`]，再按配置选择重复织入策略
pub fn weave_class_with_config(
    table: &ClassTable,
    class: &str,
    config: &AnnotatorConfig,
) -> AnnotatorResult<WeaveReport> {
    let registry = global_snapshot();
    Weaver::from_config(&registry, table, config).weave(class)
}

fn global_snapshot() -> Registry {
    get_global_registry().read().clone()
}

pub fn is_wrapped(table: &ClassTable, class: &str, method: &str) -> bool {
    table.is_woven(class, method)
}
