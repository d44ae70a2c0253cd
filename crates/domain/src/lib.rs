//! 领域层
//!
//! 选择器引擎、不可变tag规则、保留策略与 webhook 策略等纯领域模型，以及各类仓储与外部端口抽象

pub mod candidate;
pub mod events;
pub mod immutable;
pub mod ports;
pub mod repositories;
pub mod retention;
pub mod selectors;
pub mod webhook;

pub use candidate::{Candidate, CandidateKind};
pub use events::Event;
pub use immutable::{ImmutableMatcher, ImmutableRule, ProjectRules, RuleMatcher, RuleMetadata};
pub use ports::{ArtifactDeleter, ArtifactSource, DeliveryResponse, RepositoryRef, WebhookSender};
pub use repositories::*;
pub use retention::{RetentionPolicy, RetentionRule, RetentionTaskParams};
pub use selectors::{FilterSet, SelectorSpec};
pub use webhook::{DeliveryParams, EventType, HookTarget, Payload, WebhookJob, WebhookPolicy};
