//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次被织入方法的调用：目标类、方法、接收者，
//! 以及通知可以读写的参数表和环绕通知的继续执行函数

use crate::class::Receiver;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// 连接点信息
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标类名
    pub class: Arc<str>,

    /// 方法名
    pub method: Arc<str>,

    /// 调用接收者（静态调用为 `Receiver::Static`）
    pub receiver: Receiver,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    pub fn new(class: Arc<str>, method: Arc<str>, receiver: Receiver) -> Self {
        Self {
            class,
            method,
            receiver,
            timestamp: Instant::now(),
        }
    }

    /// 完整的方法签名，例如 `Account::deposit`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.class, self.method)
    }

    pub fn is_static(&self) -> bool {
        matches!(self.receiver, Receiver::Static)
    }

    /// 尝试把接收者还原为具体类型
    pub fn instance<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.receiver.downcast_ref::<T>()
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("static", &self.is_static())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 参数槽，按引用传递的参数与调用方共享同一个槽
pub(crate) type Slot = Arc<Mutex<Value>>;

struct ParameterEntry {
    name: String,
    by_reference: bool,
    slot: Slot,
}

/// 参数表
///
/// 按参数名访问本次调用的实参。按引用传递的参数写入后对原方法和调用方可见；
/// 按值传递的参数是调用时的快照，写入只影响后续通知看到的值。
pub struct ParameterMap {
    entries: Vec<ParameterEntry>,
}

impl ParameterMap {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, by_reference: bool, slot: Slot) {
        self.entries.push(ParameterEntry {
            name: name.into(),
            by_reference,
            slot,
        });
    }

    fn entry(&self, name: &str) -> Option<&ParameterEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// 读取参数当前值
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entry(name).map(|entry| entry.slot.lock().clone())
    }

    /// 写入参数，参数不存在时返回 false
    pub fn set(&self, name: &str, value: Value) -> bool {
        match self.entry(name) {
            Some(entry) => {
                *entry.slot.lock() = value;
                true
            }
            None => false,
        }
    }

    /// 修改参数，参数不存在时返回 false
    ///
    /// 闭包作用在当前值的副本上，执行期间不持有槽锁，闭包内可以再读写参数表
    pub fn update<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        let Some(entry) = self.entry(name) else {
            return false;
        };
        let mut value = entry.slot.lock().clone();
        f(&mut value);
        *entry.slot.lock() = value;
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn is_by_reference(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|entry| entry.by_reference)
    }

    /// 参数名，按声明顺序
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 当前值的 JSON 对象快照，便于日志输出
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.slot.lock().clone()))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Debug for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (&entry.name, entry.slot.lock().clone())),
            )
            .finish()
    }
}

/// 环绕通知的继续执行函数
///
/// 调用 `proceed` 进入内层环绕通知，最内层是原方法。
/// 通知可以不调用（短路）、调用一次或多次。
pub struct Proceed<'a> {
    next: &'a dyn Fn() -> anyhow::Result<Value>,
}

impl<'a> Proceed<'a> {
    pub(crate) fn new(next: &'a dyn Fn() -> anyhow::Result<Value>) -> Self {
        Self { next }
    }

    /// 继续执行内层调用链
    pub fn proceed(&self) -> anyhow::Result<Value> {
        (self.next)()
    }
}

impl fmt::Debug for Proceed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slot(value: Value) -> Slot {
        Arc::new(Mutex::new(value))
    }

    #[test]
    fn test_parameter_map_access() {
        let shared = slot(json!(1));
        let mut params = ParameterMap::new();
        params.insert("count", true, shared.clone());
        params.insert("label", false, slot(json!("a")));

        assert_eq!(params.len(), 2);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["count", "label"]);
        assert!(params.is_by_reference("count"));
        assert!(!params.is_by_reference("label"));
        assert!(!params.is_by_reference("missing"));

        assert!(params.set("count", json!(5)));
        assert_eq!(*shared.lock(), json!(5));
        assert!(params.update("label", |v| *v = json!("b")));
        assert_eq!(params.get("label"), Some(json!("b")));
        assert!(!params.set("missing", json!(0)));
        assert_eq!(params.snapshot(), json!({"count": 5, "label": "b"}));
    }

    #[test]
    fn test_update_closure_can_read_the_map() {
        let mut params = ParameterMap::new();
        params.insert("total", true, slot(json!(2)));
        params.insert("factor", false, slot(json!(5)));

        let updated = params.update("total", |total| {
            let current = params.get("total").and_then(|v| v.as_i64()).unwrap_or_default();
            let factor = params.get("factor").and_then(|v| v.as_i64()).unwrap_or_default();
            *total = json!(current * factor);
        });

        assert!(updated);
        assert_eq!(params.get("total"), Some(json!(10)));
    }

    #[test]
    fn test_proceed_can_run_more_than_once() {
        let calls = Mutex::new(0);
        let next = || -> anyhow::Result<Value> {
            *calls.lock() += 1;
            Ok(json!("done"))
        };
        let proceed = Proceed::new(&next);

        assert_eq!(proceed.proceed().unwrap(), json!("done"));
        assert_eq!(proceed.proceed().unwrap(), json!("done"));
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_join_point_signature() {
        let jp = JoinPoint::new("Account".into(), "deposit".into(), Receiver::Static);
        assert_eq!(jp.signature(), "Account::deposit");
        assert_eq!(jp.to_string(), "Account::deposit");
        assert!(jp.is_static());
        assert!(jp.instance::<u32>().is_none());
    }
}
