use jobcore_core::CoreResult;
use serde_json::Value;

use super::{Selector, SelectorSpec, Stage};
use crate::candidate::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Gte,
    Gt,
    Equal,
    Lte,
    Lt,
}

/// 按漏洞等级过滤，pattern 必须是整数
#[derive(Debug)]
pub struct SeveritySelector {
    comparison: Comparison,
    threshold: Option<i64>,
}

impl SeveritySelector {
    pub fn from_spec(spec: &SelectorSpec) -> CoreResult<Self> {
        let comparison = match spec.decoration.as_str() {
            "gte" => Comparison::Gte,
            "gt" => Comparison::Gt,
            "equal" => Comparison::Equal,
            "lte" => Comparison::Lte,
            "lt" => Comparison::Lt,
            _ => return Err(spec.unknown_decoration()),
        };
        let threshold = match &spec.pattern {
            Value::Null => None,
            Value::Number(n) => Some(n.as_i64().ok_or_else(|| spec.mismatch("整数", &spec.pattern))?),
            other => return Err(spec.mismatch("整数", other)),
        };

        Ok(Self {
            comparison,
            threshold,
        })
    }

    fn accepts(&self, severity: i64) -> bool {
        let Some(threshold) = self.threshold else {
            return true;
        };
        match self.comparison {
            Comparison::Gte => severity >= threshold,
            Comparison::Gt => severity > threshold,
            Comparison::Equal => severity == threshold,
            Comparison::Lte => severity <= threshold,
            Comparison::Lt => severity < threshold,
        }
    }
}

impl Selector for SeveritySelector {
    fn stage(&self) -> Stage {
        Stage::Severity
    }

    fn select(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        candidates
            .iter()
            .filter(|c| self.accepts(c.vulnerability_severity))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::test_support::image;
    use crate::selectors::KIND_SEVERITY;

    fn with_severity(severity: i64) -> Candidate {
        let mut c = image("redis", &[&severity.to_string()]);
        c.vulnerability_severity = severity;
        c
    }

    fn count(decoration: &str, pattern: i64) -> usize {
        let candidates: Vec<Candidate> = (1..=5).map(with_severity).collect();
        SeveritySelector::from_spec(&SelectorSpec::new(KIND_SEVERITY, decoration, pattern))
            .unwrap()
            .select(&candidates)
            .len()
    }

    #[test]
    fn test_gt_excludes_equal_severity() {
        let selector =
            SeveritySelector::from_spec(&SelectorSpec::new(KIND_SEVERITY, "gt", 3)).unwrap();
        assert!(selector.select(&[with_severity(3)]).is_empty());
        assert_eq!(selector.select(&[with_severity(4)]).len(), 1);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(count("gte", 3), 3);
        assert_eq!(count("gt", 3), 2);
        assert_eq!(count("equal", 3), 1);
        assert_eq!(count("lte", 3), 3);
        assert_eq!(count("lt", 3), 2);
    }

    #[test]
    fn test_string_pattern_is_type_mismatch() {
        let err = SeveritySelector::from_spec(&SelectorSpec::new(KIND_SEVERITY, "gt", "3"))
            .unwrap_err();
        assert!(err.to_string().contains("整数"));
    }
}
