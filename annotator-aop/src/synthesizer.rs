//! 织入方法体合成
//!
//! 合成后的方法体按固定顺序执行：
//! 1. 构建参数表
//! 2. 前置通知（全部、按序）
//! 3. 最外层环绕通知，最内层调用原方法
//! 4. 后置通知（全部、按序、串联结果）
//! 5. 按引用参数写回调用方

use crate::chain::AdviceChain;
use crate::class::{MethodBody, MethodDescriptor, ParameterDescriptor, Receiver};
use crate::joinpoint::{JoinPoint, ParameterMap, Proceed, Slot};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

type Continuation<'a> = Box<dyn Fn() -> anyhow::Result<Value> + 'a>;

/// 方法体合成器
pub struct Synthesizer;

impl Synthesizer {
    /// 为 `class::descriptor.name` 合成织入后的方法体
    ///
    /// `original` 是捕获的原实现，签名、静态性和可见性由描述保留，
    /// 替换方法体时不需要改动。
    pub fn synthesize(
        class: &str,
        descriptor: &MethodDescriptor,
        chain: AdviceChain,
        original: MethodBody,
    ) -> MethodBody {
        let woven = WovenMethod {
            class: Arc::from(class),
            method: Arc::from(descriptor.name.as_str()),
            parameters: descriptor.parameters.clone(),
            chain,
            original,
        };
        tracing::debug!(
            "Synthesized {}::{} ({} before, {} around, {} after)",
            woven.class,
            woven.method,
            woven.chain.before.len(),
            woven.chain.around.len(),
            woven.chain.after.len()
        );
        Arc::new(move |receiver: &Receiver, args: &mut [Value]| woven.invoke(receiver, args))
    }
}

struct WovenMethod {
    class: Arc<str>,
    method: Arc<str>,
    parameters: Vec<ParameterDescriptor>,
    chain: AdviceChain,
    original: MethodBody,
}

impl WovenMethod {
    fn invoke(&self, receiver: &Receiver, args: &mut [Value]) -> anyhow::Result<Value> {
        let join_point = JoinPoint::new(self.class.clone(), self.method.clone(), receiver.clone());
        let span = tracing::trace_span!("woven_call", class = %self.class, method = %self.method);
        let _guard = span.enter();
        tracing::trace!("Woven call: {}", join_point);

        let originals: Vec<Value> = args.to_vec();
        let mut params = ParameterMap::new();
        // 按引用参数与调用方共享的槽，按值参数为 None
        let mut shared: Vec<Option<Slot>> = Vec::with_capacity(args.len());

        for (parameter, value) in self.parameters.iter().zip(args.iter()) {
            let slot: Slot = Arc::new(Mutex::new(value.clone()));
            params.insert(parameter.name.clone(), parameter.by_reference, slot.clone());
            shared.push(parameter.by_reference.then_some(slot));
        }

        let result = self.run(&join_point, &params, &shared, &originals);

        for (arg, slot) in args.iter_mut().zip(&shared) {
            if let Some(slot) = slot {
                *arg = slot.lock().clone();
            }
        }

        tracing::trace!(
            "Woven call finished: {} ({:?})",
            join_point,
            join_point.timestamp.elapsed()
        );
        result
    }

    fn run(
        &self,
        join_point: &JoinPoint,
        params: &ParameterMap,
        shared: &[Option<Slot>],
        originals: &[Value],
    ) -> anyhow::Result<Value> {
        for invocation in &self.chain.before {
            invocation
                .handler
                .before(join_point, params, &invocation.options)?;
        }

        // 最内层：用原始实参列表调用原方法，按引用参数取共享槽的当前值
        let terminal = move || -> anyhow::Result<Value> {
            let mut call_args = originals.to_vec();
            for (arg, slot) in call_args.iter_mut().zip(shared) {
                if let Some(slot) = slot {
                    *arg = slot.lock().clone();
                }
            }

            let result = (self.original)(&join_point.receiver, &mut call_args);

            for (arg, slot) in call_args.into_iter().zip(shared) {
                if let Some(slot) = slot {
                    *slot.lock() = arg;
                }
            }
            result
        };

        // 每个环绕通知包住当前的继续函数，最后声明的在最外层
        let mut continuation: Continuation<'_> = Box::new(terminal);
        for invocation in &self.chain.around {
            let inner = continuation;
            continuation = Box::new(move || {
                invocation.handler.around(
                    join_point,
                    params,
                    &invocation.options,
                    &Proceed::new(&*inner),
                )
            });
        }

        let mut result = continuation()?;

        for invocation in &self.chain.after {
            result = invocation
                .handler
                .after(join_point, params, &invocation.options, result)?;
        }

        Ok(result)
    }
}
