use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::events::Event;

/// 有状态处理器队列的默认容量，队列满时发布者等待
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// 执行处理器，错误与 panic 都只记录日志
async fn dispatch(handler: &dyn EventHandler, topic: &str, event: &Event) {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("处理器 {} 处理主题 {} 的事件失败: {}", handler.name(), topic, e),
        Err(_) => error!("处理器 {} 处理主题 {} 的事件时 panic", handler.name(), topic),
    }
}

/// 事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    /// 有状态的处理器在同一主题上串行执行
    fn is_stateful(&self) -> bool {
        false
    }

    /// 事件类型与处理器不匹配时返回错误
    async fn handle(&self, event: &Event) -> CoreResult<()>;
}

#[derive(Clone)]
enum Subscription {
    Stateless(Arc<dyn EventHandler>),
    Stateful {
        name: String,
        queue: mpsc::Sender<Event>,
    },
}

impl Subscription {
    fn name(&self) -> &str {
        match self {
            Subscription::Stateless(handler) => handler.name(),
            Subscription::Stateful { name, .. } => name,
        }
    }
}

/// 主题到处理器的注册表
///
/// 每个有状态处理器拥有一个单消费者队列，保证串行处理；
/// 无状态处理器在发布者的任务中并发执行。发布时先复制订阅列表再释放锁，
/// 处理器内部再次发布不会死锁。
pub struct NotificationBus {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    queue_capacity: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queue_capacity: capacity.max(1),
        }
    }

    /// 订阅主题，必须在 tokio 运行时内调用
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) -> CoreResult<()> {
        if topic.trim().is_empty() {
            return Err(CoreError::invalid("主题不能为空"));
        }
        let mut topics = self
            .topics
            .write()
            .map_err(|_| CoreError::Internal("通知总线锁已损坏".to_string()))?;
        let subscriptions = topics.entry(topic.to_string()).or_default();
        if subscriptions.iter().any(|s| s.name() == handler.name()) {
            return Err(CoreError::Conflict(format!(
                "处理器 {} 已订阅主题 {}",
                handler.name(),
                topic
            )));
        }

        let subscription = if handler.is_stateful() {
            let (queue, mut receiver) = mpsc::channel::<Event>(self.queue_capacity);
            let name = handler.name().to_string();
            let topic_name = topic.to_string();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    dispatch(handler.as_ref(), &topic_name, &event).await;
                }
                debug!("处理器 {} 在主题 {} 上的队列已关闭", handler.name(), topic_name);
            });
            Subscription::Stateful { name, queue }
        } else {
            Subscription::Stateless(handler)
        };
        subscriptions.push(subscription);
        debug!("主题 {} 新增订阅", topic);
        Ok(())
    }

    /// 取消订阅，有状态处理器的队列随之关闭
    pub fn unsubscribe(&self, topic: &str, handler_name: &str) -> CoreResult<()> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| CoreError::Internal("通知总线锁已损坏".to_string()))?;
        let subscriptions = topics
            .get_mut(topic)
            .ok_or_else(|| CoreError::not_found("主题", topic))?;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.name() != handler_name);
        if subscriptions.len() == before {
            return Err(CoreError::not_found("处理器", handler_name));
        }
        Ok(())
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .map(|topics| topics.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// 发布事件
    ///
    /// 有状态处理器只入队（队列满时等待），无状态处理器并发执行完毕后返回。
    /// 处理器的错误与 panic 只记录日志，不影响其他处理器。
    pub async fn publish(&self, topic: &str, event: Event) -> CoreResult<()> {
        if topic.trim().is_empty() {
            return Err(CoreError::invalid("主题不能为空"));
        }
        let subscriptions = {
            let topics = self
                .topics
                .read()
                .map_err(|_| CoreError::Internal("通知总线锁已损坏".to_string()))?;
            topics.get(topic).cloned().unwrap_or_default()
        };
        if subscriptions.is_empty() {
            debug!("主题 {} 没有订阅者", topic);
            return Ok(());
        }

        let mut stateless = Vec::new();
        for subscription in subscriptions {
            match subscription {
                Subscription::Stateful { name, queue } => {
                    if queue.send(event.clone()).await.is_err() {
                        warn!("处理器 {} 的队列已关闭，丢弃主题 {} 的事件", name, topic);
                    }
                }
                Subscription::Stateless(handler) => stateless.push(handler),
            }
        }

        join_all(
            stateless
                .iter()
                .map(|handler| dispatch(handler.as_ref(), topic, &event)),
        )
        .await;
        Ok(())
    }
}
