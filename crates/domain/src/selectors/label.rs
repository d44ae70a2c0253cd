use jobcore_core::CoreResult;

use super::{Selector, SelectorSpec, Stage};
use crate::candidate::Candidate;

pub const WITH: &str = "withLabels";
pub const WITHOUT: &str = "withoutLabels";

/// 按标签过滤，pattern 为逗号分隔的标签列表
#[derive(Debug)]
pub struct LabelSelector {
    with: bool,
    labels: Vec<String>,
}

impl LabelSelector {
    pub fn from_spec(spec: &SelectorSpec) -> CoreResult<Self> {
        let with = match spec.decoration.as_str() {
            WITH | "with" => true,
            WITHOUT | "without" => false,
            _ => return Err(spec.unknown_decoration()),
        };
        let labels = spec
            .string_pattern()?
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { with, labels })
    }

    fn has_all(&self, candidate: &Candidate) -> bool {
        self.labels.iter().all(|l| candidate.labels.contains(l))
    }
}

impl Selector for LabelSelector {
    fn stage(&self) -> Stage {
        Stage::Label
    }

    fn select(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        if self.labels.is_empty() {
            return candidates.to_vec();
        }
        candidates
            .iter()
            .filter(|c| self.has_all(c) == self.with)
            .cloned()
            .collect()
    }
}
