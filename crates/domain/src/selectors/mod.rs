//! 选择器引擎
//!
//! 选择器是 `[]Candidate → []Candidate` 的纯函数，由 `(kind, decoration, pattern, extras)` 构建。
//! 过滤集按 仓库 → tag → 标签 → 签名 → 漏洞等级 的固定顺序求值。

pub mod doublestar;
pub mod label;
pub mod severity;
pub mod signature;

use std::fmt;

use jobcore_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::Candidate;

pub use doublestar::DoublestarSelector;
pub use label::LabelSelector;
pub use severity::SeveritySelector;
pub use signature::SignatureSelector;

pub const KIND_DOUBLESTAR: &str = "doublestar";
pub const KIND_LABEL: &str = "label";
pub const KIND_SEVERITY: &str = "severity";
pub const KIND_SIGNATURE: &str = "signature";

/// 选择器的持久化描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub kind: String,
    pub decoration: String,
    #[serde(default)]
    pub pattern: Value,
    /// JSON 字符串，目前仅支持 `{"untagged": bool}`
    #[serde(default)]
    pub extras: String,
}

impl SelectorSpec {
    pub fn new(kind: &str, decoration: &str, pattern: impl Into<Value>) -> Self {
        Self {
            kind: kind.to_string(),
            decoration: decoration.to_string(),
            pattern: pattern.into(),
            extras: String::new(),
        }
    }

    pub fn doublestar(decoration: &str, pattern: &str) -> Self {
        Self::new(KIND_DOUBLESTAR, decoration, pattern)
    }

    pub fn with_untagged(mut self, untagged: bool) -> Self {
        self.extras = serde_json::json!({ "untagged": untagged }).to_string();
        self
    }

    /// 解析 extras 中的 untagged 标记
    pub fn untagged(&self) -> CoreResult<bool> {
        if self.extras.trim().is_empty() {
            return Ok(false);
        }
        let extras: Value = serde_json::from_str(&self.extras)
            .map_err(|e| CoreError::invalid(format!("无效的选择器extras: {e}")))?;
        match extras.get("untagged") {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(CoreError::invalid(format!(
                "extras.untagged 必须是布尔值，实际为 {other}"
            ))),
        }
    }

    /// 字符串类型的 pattern，空串与 null 均视为匹配全部
    pub(crate) fn string_pattern(&self) -> CoreResult<Option<String>> {
        match &self.pattern {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(self.mismatch("字符串", other)),
        }
    }

    pub(crate) fn mismatch(&self, expected: &str, got: &Value) -> CoreError {
        CoreError::invalid(format!(
            "选择器 {}/{} 的pattern需要{expected}，实际为 {got}",
            self.kind, self.decoration
        ))
    }

    pub(crate) fn unknown_decoration(&self) -> CoreError {
        CoreError::invalid(format!(
            "选择器 {} 不支持的decoration: {}",
            self.kind, self.decoration
        ))
    }
}

/// 过滤集中的求值阶段，顺序固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Repository,
    Tag,
    Label,
    Signature,
    Severity,
}

pub trait Selector: Send + Sync + fmt::Debug {
    fn stage(&self) -> Stage;

    fn select(&self, candidates: &[Candidate]) -> Vec<Candidate>;
}

/// 根据描述构建选择器，未知的 kind/decoration 或类型不匹配的 pattern 返回错误
pub fn build(spec: &SelectorSpec) -> CoreResult<Box<dyn Selector>> {
    match spec.kind.as_str() {
        KIND_DOUBLESTAR => Ok(Box::new(DoublestarSelector::from_spec(spec)?)),
        KIND_LABEL => Ok(Box::new(LabelSelector::from_spec(spec)?)),
        KIND_SEVERITY => Ok(Box::new(SeveritySelector::from_spec(spec)?)),
        KIND_SIGNATURE => Ok(Box::new(SignatureSelector::from_spec(spec)?)),
        other => Err(CoreError::invalid(format!("未知的选择器类型: {other}"))),
    }
}

/// 一组按阶段排序的选择器
#[derive(Debug, Default)]
pub struct FilterSet {
    selectors: Vec<Box<dyn Selector>>,
}

impl FilterSet {
    pub fn new<'a>(specs: impl IntoIterator<Item = &'a SelectorSpec>) -> CoreResult<Self> {
        let mut selectors = specs
            .into_iter()
            .map(build)
            .collect::<CoreResult<Vec<_>>>()?;
        // 稳定排序，同阶段内保持声明顺序
        selectors.sort_by_key(|s| s.stage());
        Ok(Self { selectors })
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn apply(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut current = candidates.to_vec();
        for selector in &self.selectors {
            if current.is_empty() {
                break;
            }
            current = selector.select(&current);
        }
        current
    }
}
