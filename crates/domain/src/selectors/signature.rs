use jobcore_core::CoreResult;
use serde_json::Value;

use super::{Selector, SelectorSpec, Stage};
use crate::candidate::Candidate;

/// 按tag签名状态过滤，pattern 为期望的签名状态
#[derive(Debug)]
pub struct SignatureSelector {
    all: bool,
    expected: Option<bool>,
}

impl SignatureSelector {
    pub fn from_spec(spec: &SelectorSpec) -> CoreResult<Self> {
        let all = match spec.decoration.as_str() {
            "any" => false,
            "all" => true,
            _ => return Err(spec.unknown_decoration()),
        };
        let expected = match &spec.pattern {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            other => return Err(spec.mismatch("布尔值", other)),
        };

        Ok(Self { all, expected })
    }

    fn accepts(&self, candidate: &Candidate) -> bool {
        let Some(expected) = self.expected else {
            return true;
        };
        // 没有tag时 any 与 all 都不成立
        if candidate.tags.is_empty() {
            return false;
        }
        let signed = |tag: &String| candidate.signatures.get(tag).copied().unwrap_or(false);
        if self.all {
            candidate.tags.iter().all(|t| signed(t) == expected)
        } else {
            candidate.tags.iter().any(|t| signed(t) == expected)
        }
    }
}

impl Selector for SignatureSelector {
    fn stage(&self) -> Stage {
        Stage::Signature
    }

    fn select(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        candidates
            .iter()
            .filter(|c| self.accepts(c))
            .cloned()
            .collect()
    }
}
