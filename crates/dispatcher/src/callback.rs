//! 调度回调注册表
//!
//! 启动时注册回调，装配完成后冻结；冻结后只读，调度触发时按名称查找。

use futures::future::BoxFuture;
use jobcore_core::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// 调度触发时执行的回调，参数为调度记录中保存的 JSON
pub type CallbackFn = Arc<dyn Fn(Value) -> BoxFuture<'static, CoreResult<()>> + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<String, CallbackFn>>,
    frozen: AtomicBool,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册回调，名称为空或重复时报错，冻结后拒绝注册
    pub fn register(&self, name: &str, callback: CallbackFn) -> CoreResult<()> {
        if name.trim().is_empty() {
            return Err(CoreError::invalid("回调名称不能为空"));
        }
        if self.frozen.load(Ordering::SeqCst) {
            return Err(CoreError::Forbidden(format!(
                "回调注册表已冻结，无法注册 {name}"
            )));
        }
        let mut callbacks = self
            .callbacks
            .write()
            .map_err(|_| CoreError::Internal("回调注册表锁已损坏".to_string()))?;
        if callbacks.contains_key(name) {
            return Err(CoreError::Conflict(format!("回调 {name} 已注册")));
        }
        callbacks.insert(name.to_string(), callback);
        debug!("注册调度回调: {}", name);
        Ok(())
    }

    /// 注册带类型参数的回调，触发时先把 JSON 参数解码为 `P`
    pub fn register_typed<P, F, Fut>(&self, name: &str, callback: F) -> CoreResult<()>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CoreResult<()>> + Send + 'static,
    {
        let callback = Arc::new(callback);
        let name_owned = name.to_string();
        self.register(
            name,
            Arc::new(move |param: Value| {
                let callback = callback.clone();
                let name = name_owned.clone();
                Box::pin(async move {
                    let param: P = serde_json::from_value(param).map_err(|e| {
                        CoreError::invalid(format!("回调 {name} 的参数无法解析: {e}"))
                    })?;
                    callback(param).await
                })
            }),
        )
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks
            .read()
            .map(|callbacks| callbacks.contains_key(name))
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> CoreResult<CallbackFn> {
        let callbacks = self
            .callbacks
            .read()
            .map_err(|_| CoreError::Internal("回调注册表锁已损坏".to_string()))?;
        callbacks
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("回调", name))
    }

    /// 按名称查找并执行回调
    pub async fn invoke(&self, name: &str, param: Value) -> CoreResult<()> {
        let callback = self.get(name)?;
        callback(param).await
    }
}
