//! 保留策略模型
//!
//! 策略由若干规则组成，每条规则先用选择器圈定候选，再用模板决定保留哪些

pub mod template;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobcore_core::{validate_cron_expression, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::candidate::Candidate;
use crate::selectors::{FilterSet, SelectorSpec};

pub use template::evaluate_template;

pub const SCOPE_LEVEL_PROJECT: &str = "project";
pub const SCOPE_REPOSITORY: &str = "repository";
pub const ACTION_RETAIN: &str = "retain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub level: String,
    #[serde(rename = "ref")]
    pub reference: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Manual,
    #[serde(rename = "Schedule", alias = "Scheduled")]
    Scheduled,
    EventBased,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Manual => "Manual",
            TriggerKind::Scheduled => "Schedule",
            TriggerKind::EventBased => "EventBased",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default)]
    pub cron: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionTrigger {
    pub kind: TriggerKind,
    #[serde(default)]
    pub settings: TriggerSettings,
}

impl RetentionTrigger {
    pub fn manual() -> Self {
        Self {
            kind: TriggerKind::Manual,
            settings: TriggerSettings::default(),
        }
    }

    pub fn scheduled(cron: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Scheduled,
            settings: TriggerSettings { cron: cron.into() },
        }
    }

    /// 定时触发且配置了 cron 时返回 cron
    pub fn cron(&self) -> Option<&str> {
        match self.kind {
            TriggerKind::Scheduled if !self.settings.cron.is_empty() => Some(&self.settings.cron),
            _ => None,
        }
    }
}

/// 保留规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRule {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "default_action")]
    pub action: String,
    pub template: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tag_selectors: Vec<SelectorSpec>,
    #[serde(default)]
    pub scope_selectors: HashMap<String, Vec<SelectorSpec>>,
}

fn default_action() -> String {
    ACTION_RETAIN.to_string()
}

impl RetentionRule {
    pub fn repository_selectors(&self) -> &[SelectorSpec] {
        self.scope_selectors
            .get(SCOPE_REPOSITORY)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 编译仓库过滤集与tag过滤集
    pub fn filters(&self) -> CoreResult<RuleFilters> {
        Ok(RuleFilters {
            repository: FilterSet::new(self.repository_selectors())?,
            tags: FilterSet::new(&self.tag_selectors)?,
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.action != ACTION_RETAIN {
            return Err(CoreError::invalid(format!("不支持的规则动作: {}", self.action)));
        }
        template::validate_template(self)?;
        self.filters()?;
        Ok(())
    }
}

/// 单条规则编译后的过滤集
#[derive(Debug)]
pub struct RuleFilters {
    pub repository: FilterSet,
    pub tags: FilterSet,
}

/// 保留策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub id: i64,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub rules: Vec<RetentionRule>,
    pub trigger: RetentionTrigger,
    pub scope: Scope,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RetentionPolicy {
    pub fn project_id(&self) -> i64 {
        self.scope.reference
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &RetentionRule> {
        self.rules.iter().filter(|r| !r.disabled)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.scope.level != SCOPE_LEVEL_PROJECT {
            return Err(CoreError::invalid(format!(
                "不支持的策略范围: {}",
                self.scope.level
            )));
        }
        if self.scope.reference <= 0 {
            return Err(CoreError::invalid("策略范围必须指向有效的项目"));
        }
        if self.trigger.kind == TriggerKind::Scheduled {
            if self.trigger.settings.cron.is_empty() {
                return Err(CoreError::invalid("定时触发的策略必须配置cron"));
            }
            validate_cron_expression(&self.trigger.settings.cron)?;
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// 交给 worker 执行的单仓库保留任务参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionTaskParams {
    pub repository: String,
    pub dry_run: bool,
    pub total: usize,
    pub retained: usize,
    /// 需要删除的候选
    #[serde(default)]
    pub deletes: Vec<Candidate>,
    /// 本应删除但受不可变规则保护的候选
    #[serde(default)]
    pub immutable: Vec<Candidate>,
}

impl RetentionTaskParams {
    pub fn to_params(&self) -> CoreResult<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CoreError::Internal("保留任务参数必须序列化为对象".to_string())),
        }
    }

    pub fn from_params(params: &serde_json::Map<String, serde_json::Value>) -> CoreResult<Self> {
        serde_json::from_value(serde_json::Value::Object(params.clone()))
            .map_err(|e| CoreError::invalid(format!("无效的保留任务参数: {e}")))
    }
}

/// 单个候选的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionResult {
    pub target: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub immutable: bool,
}

/// 保留任务上报的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub retained: usize,
}
