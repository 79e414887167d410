//! 类表：反射与方法重定义
//!
//! Rust 没有运行时反射，这里提供一个最小的宿主运行时：
//! 类由方法描述和方法体组成，织入器只通过 [`Reflection`] 和 [`Redefinition`] 两个 trait 访问它

use crate::error::{AnnotatorError, AnnotatorResult};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// 方法可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    /// 从给定调用位置是否可以调用
    pub fn allows(self, call_site: CallSite) -> bool {
        match self {
            Visibility::Public => true,
            Visibility::Protected => call_site != CallSite::External,
            Visibility::Private => call_site == CallSite::Internal,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// 调用发生的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// 类外部
    External,
    /// 子类内部
    Subclass,
    /// 类自身内部
    Internal,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSite::External => write!(f, "global"),
            CallSite::Subclass => write!(f, "subclass"),
            CallSite::Internal => write!(f, "class"),
        }
    }
}

/// 调用接收者
#[derive(Clone)]
pub enum Receiver {
    /// 静态调用，没有实例
    Static,
    /// 实例调用
    Instance(Arc<dyn Any + Send + Sync>),
}

impl Receiver {
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Receiver::Instance(Arc::new(value))
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Receiver::Static => None,
            Receiver::Instance(value) => value.downcast_ref::<T>(),
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::Static => write!(f, "Static"),
            Receiver::Instance(_) => write!(f, "Instance(..)"),
        }
    }
}

/// 参数描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    /// 默认值字面量（没有默认值为 None）
    pub default: Option<Value>,
    /// 是否按引用传递
    pub by_reference: bool,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            by_reference: false,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.by_reference = true;
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// 方法描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub is_static: bool,
    pub visibility: Visibility,
    pub parameters: Vec<ParameterDescriptor>,
    /// 文档文本，指令从这里解析
    pub documentation: Option<String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_static: false,
            visibility: Visibility::Public,
            parameters: Vec::new(),
            documentation: None,
        }
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn param(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn doc(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    /// 检查签名：参数名不能重复，必填参数不能出现在可选参数之后
    pub fn validate_signature(&self, class: &str) -> AnnotatorResult<()> {
        let malformed = |reason: String| AnnotatorError::MalformedSignature {
            class: class.to_string(),
            method: self.name.clone(),
            reason,
        };

        let mut seen = HashSet::new();
        let mut optional_seen = false;
        for parameter in &self.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(malformed(format!("duplicate parameter ${}", parameter.name)));
            }
            if parameter.has_default() {
                optional_seen = true;
            } else if optional_seen {
                return Err(malformed(format!(
                    "required parameter ${} follows an optional parameter",
                    parameter.name
                )));
            }
        }
        Ok(())
    }

    /// 按签名补齐实参：缺省的尾部参数使用默认值
    pub fn bind_arguments(&self, class: &str, args: &mut Vec<Value>) -> AnnotatorResult<()> {
        if args.len() > self.parameters.len() {
            return Err(AnnotatorError::TooManyArguments {
                class: class.to_string(),
                method: self.name.clone(),
                expected: self.parameters.len(),
                given: args.len(),
            });
        }

        for parameter in &self.parameters[args.len()..] {
            match &parameter.default {
                Some(default) => args.push(default.clone()),
                None => {
                    return Err(AnnotatorError::MissingArgument {
                        class: class.to_string(),
                        method: self.name.clone(),
                        parameter: parameter.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// 方法体
///
/// 实参按签名顺序传入，按引用参数的修改直接写回切片
pub type MethodBody = Arc<dyn Fn(&Receiver, &mut [Value]) -> anyhow::Result<Value> + Send + Sync>;

/// 把闭包包装为方法体
pub fn method_body<F>(f: F) -> MethodBody
where
    F: Fn(&Receiver, &mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct MethodEntry {
    descriptor: Arc<MethodDescriptor>,
    body: MethodBody,
    woven: bool,
    /// 织入器已处理过（包括只有 INFO 指令、没有安装方法体的方法）
    processed: bool,
}

/// 类定义
pub struct ClassDefinition {
    name: String,
    methods: Vec<MethodEntry>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method<F>(mut self, descriptor: MethodDescriptor, body: F) -> Self
    where
        F: Fn(&Receiver, &mut [Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(MethodEntry {
            descriptor: Arc::new(descriptor),
            body: Arc::new(body),
            woven: false,
            processed: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, method: &str) -> Option<&MethodEntry> {
        self.methods.iter().find(|entry| entry.descriptor.name == method)
    }

    fn find_mut(&mut self, method: &str) -> Option<&mut MethodEntry> {
        self.methods
            .iter_mut()
            .find(|entry| entry.descriptor.name == method)
    }

    fn validate(&self) -> AnnotatorResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.methods {
            if !seen.insert(entry.descriptor.name.as_str()) {
                return Err(AnnotatorError::MethodExists {
                    class: self.name.clone(),
                    method: entry.descriptor.name.clone(),
                });
            }
            entry.descriptor.validate_signature(&self.name)?;
        }
        Ok(())
    }
}

/// 反射能力
pub trait Reflection {
    /// 列出类的所有方法，类不存在时返回 None
    fn list_methods(&self, class: &str) -> Option<Vec<MethodDescriptor>>;

    /// 查找单个方法
    fn method(&self, class: &str, method: &str) -> Option<MethodDescriptor>;

    fn documentation(&self, class: &str, method: &str) -> Option<String> {
        self.method(class, method)?.documentation
    }

    fn parameters(&self, class: &str, method: &str) -> Option<Vec<ParameterDescriptor>> {
        self.method(class, method).map(|m| m.parameters)
    }

    fn is_static(&self, class: &str, method: &str) -> Option<bool> {
        self.method(class, method).map(|m| m.is_static)
    }

    fn visibility(&self, class: &str, method: &str) -> Option<Visibility> {
        self.method(class, method).map(|m| m.visibility)
    }
}

/// 方法重定义能力
pub trait Redefinition {
    /// 重命名方法，`old` 不存在或 `new` 已存在时失败
    fn rename(&self, class: &str, old: &str, new: &str) -> AnnotatorResult<()>;

    /// 安装新方法，同名方法已存在或签名非法时失败
    fn install(&self, class: &str, descriptor: MethodDescriptor, body: MethodBody)
        -> AnnotatorResult<()>;

    /// 取出当前方法体，织入后的方法通过它调用原实现
    fn original_body(&self, class: &str, method: &str) -> AnnotatorResult<MethodBody>;

    /// 替换方法体并标记为已织入，签名、静态性和可见性保持不变
    fn replace(&self, class: &str, method: &str, body: MethodBody) -> AnnotatorResult<()>;

    /// 方法是否已被织入
    fn is_woven(&self, class: &str, method: &str) -> bool;

    /// 标记方法已被织入器处理，不替换方法体
    fn mark_processed(&self, class: &str, method: &str) -> AnnotatorResult<()>;

    /// 方法是否已被织入器处理过，已织入的方法也算
    fn is_processed(&self, class: &str, method: &str) -> bool;
}

/// 类表
///
/// 同时实现反射、重定义和方法调用
#[derive(Default)]
pub struct ClassTable {
    classes: RwLock<HashMap<String, ClassDefinition>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定义类，同名类会被替换
    pub fn define(&self, class: ClassDefinition) -> AnnotatorResult<()> {
        class.validate()?;
        tracing::debug!(
            "Defining class '{}' with {} method(s)",
            class.name,
            class.methods.len()
        );
        let name = class.name.clone();
        if self.classes.write().insert(name.clone(), class).is_some() {
            tracing::warn!("Class '{}' was already defined, definition replaced", name);
        }
        Ok(())
    }

    pub fn contains_class(&self, class: &str) -> bool {
        self.classes.read().contains_key(class)
    }

    /// 调用方法
    ///
    /// 补齐默认参数，检查可见性和静态上下文，按引用参数的修改写回 `args`。
    /// 方法体在锁外执行，通知可以重入类表。
    pub fn invoke(
        &self,
        class: &str,
        method: &str,
        receiver: Receiver,
        args: &mut Vec<Value>,
        call_site: CallSite,
    ) -> anyhow::Result<Value> {
        let (descriptor, body) = {
            let classes = self.classes.read();
            let definition = classes
                .get(class)
                .ok_or_else(|| AnnotatorError::ClassNotFound(class.to_string()))?;
            let entry = definition
                .find(method)
                .ok_or_else(|| AnnotatorError::MethodNotFound {
                    class: class.to_string(),
                    method: method.to_string(),
                })?;
            (entry.descriptor.clone(), entry.body.clone())
        };

        if !descriptor.visibility.allows(call_site) {
            return Err(AnnotatorError::NotAccessible {
                class: class.to_string(),
                method: method.to_string(),
                visibility: descriptor.visibility,
                call_site,
            }
            .into());
        }

        let receiver = match (descriptor.is_static, receiver) {
            (true, _) => Receiver::Static,
            (false, Receiver::Static) => {
                return Err(AnnotatorError::MissingReceiver {
                    class: class.to_string(),
                    method: method.to_string(),
                }
                .into())
            }
            (false, instance) => instance,
        };

        descriptor.bind_arguments(class, args)?;
        body(&receiver, args.as_mut_slice())
    }

    /// 从类外部调用，实参按值传入
    pub fn call(
        &self,
        class: &str,
        method: &str,
        receiver: Receiver,
        mut args: Vec<Value>,
    ) -> anyhow::Result<Value> {
        self.invoke(class, method, receiver, &mut args, CallSite::External)
    }

    fn with_class_mut<T>(
        &self,
        class: &str,
        f: impl FnOnce(&mut ClassDefinition) -> AnnotatorResult<T>,
    ) -> AnnotatorResult<T> {
        let mut classes = self.classes.write();
        let definition = classes
            .get_mut(class)
            .ok_or_else(|| AnnotatorError::ClassNotFound(class.to_string()))?;
        f(definition)
    }
}

impl Reflection for ClassTable {
    fn list_methods(&self, class: &str) -> Option<Vec<MethodDescriptor>> {
        let classes = self.classes.read();
        let definition = classes.get(class)?;
        Some(
            definition
                .methods
                .iter()
                .map(|entry| entry.descriptor.as_ref().clone())
                .collect(),
        )
    }

    fn method(&self, class: &str, method: &str) -> Option<MethodDescriptor> {
        let classes = self.classes.read();
        let entry = classes.get(class)?.find(method)?;
        Some(entry.descriptor.as_ref().clone())
    }
}

impl Redefinition for ClassTable {
    fn rename(&self, class: &str, old: &str, new: &str) -> AnnotatorResult<()> {
        self.with_class_mut(class, |definition| {
            if definition.find(new).is_some() {
                return Err(AnnotatorError::MethodExists {
                    class: class.to_string(),
                    method: new.to_string(),
                });
            }
            let entry = definition
                .find_mut(old)
                .ok_or_else(|| AnnotatorError::MethodNotFound {
                    class: class.to_string(),
                    method: old.to_string(),
                })?;
            let mut descriptor = entry.descriptor.as_ref().clone();
            descriptor.name = new.to_string();
            entry.descriptor = Arc::new(descriptor);
            tracing::debug!("Renamed {}::{} to {}", class, old, new);
            Ok(())
        })
    }

    fn install(
        &self,
        class: &str,
        descriptor: MethodDescriptor,
        body: MethodBody,
    ) -> AnnotatorResult<()> {
        descriptor.validate_signature(class)?;
        self.with_class_mut(class, |definition| {
            if definition.find(&descriptor.name).is_some() {
                return Err(AnnotatorError::MethodExists {
                    class: class.to_string(),
                    method: descriptor.name.clone(),
                });
            }
            tracing::debug!("Installed {}::{}", class, descriptor.name);
            definition.methods.push(MethodEntry {
                descriptor: Arc::new(descriptor),
                body,
                woven: false,
                processed: false,
            });
            Ok(())
        })
    }

    fn original_body(&self, class: &str, method: &str) -> AnnotatorResult<MethodBody> {
        let classes = self.classes.read();
        let definition = classes
            .get(class)
            .ok_or_else(|| AnnotatorError::ClassNotFound(class.to_string()))?;
        definition
            .find(method)
            .map(|entry| entry.body.clone())
            .ok_or_else(|| AnnotatorError::MethodNotFound {
                class: class.to_string(),
                method: method.to_string(),
            })
    }

    fn replace(&self, class: &str, method: &str, body: MethodBody) -> AnnotatorResult<()> {
        self.with_class_mut(class, |definition| {
            let entry = definition
                .find_mut(method)
                .ok_or_else(|| AnnotatorError::MethodNotFound {
                    class: class.to_string(),
                    method: method.to_string(),
                })?;
            entry.body = body;
            entry.woven = true;
            entry.processed = true;
            Ok(())
        })
    }

    fn mark_processed(&self, class: &str, method: &str) -> AnnotatorResult<()> {
        self.with_class_mut(class, |definition| {
            let entry = definition
                .find_mut(method)
                .ok_or_else(|| AnnotatorError::MethodNotFound {
                    class: class.to_string(),
                    method: method.to_string(),
                })?;
            entry.processed = true;
            Ok(())
        })
    }

    fn is_processed(&self, class: &str, method: &str) -> bool {
        self.classes
            .read()
            .get(class)
            .and_then(|definition| definition.find(method))
            .is_some_and(|entry| entry.processed)
    }

    fn is_woven(&self, class: &str, method: &str) -> bool {
        self.classes
            .read()
            .get(class)
            .and_then(|definition| definition.find(method))
            .is_some_and(|entry| entry.woven)
    }
}
