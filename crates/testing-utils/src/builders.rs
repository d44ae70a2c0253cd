//! Test data builders
//!
//! Builders with sensible defaults for candidates, retention policies and
//! webhook policies.

use chrono::Utc;
use jobcore_domain::candidate::{Candidate, CandidateKind};
use jobcore_domain::retention::{
    Algorithm, RetentionPolicy, RetentionRule, RetentionTrigger, Scope, ACTION_RETAIN,
    SCOPE_LEVEL_PROJECT, SCOPE_REPOSITORY,
};
use jobcore_domain::selectors::SelectorSpec;
use jobcore_domain::webhook::{EventType, HookTarget, WebhookPolicy};
use serde_json::json;
use std::collections::HashMap;

/// Builder for image candidates
pub struct CandidateBuilder {
    candidate: Candidate,
}

impl CandidateBuilder {
    pub fn image(project_id: i64, namespace: &str, repository: &str) -> Self {
        Self {
            candidate: Candidate {
                namespace_id: project_id,
                namespace: namespace.to_string(),
                repository: repository.to_string(),
                kind: CandidateKind::Image,
                tags: vec![],
                digest: String::new(),
                pushed_time: 0,
                pulled_time: 0,
                creation_time: 0,
                labels: vec![],
                signatures: HashMap::new(),
                vulnerability_severity: 0,
            },
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.candidate.tags.push(tag.to_string());
        self
    }

    pub fn digest(mut self, digest: &str) -> Self {
        self.candidate.digest = digest.to_string();
        self
    }

    /// Pushed `hours` hours before now
    pub fn pushed_hours_ago(mut self, hours: i64) -> Self {
        self.candidate.pushed_time = Utc::now().timestamp() - hours * 3600;
        self
    }

    pub fn pulled_at(mut self, unix_seconds: i64) -> Self {
        self.candidate.pulled_time = unix_seconds;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.candidate.labels.push(label.to_string());
        self
    }

    pub fn severity(mut self, severity: i64) -> Self {
        self.candidate.vulnerability_severity = severity;
        self
    }

    pub fn signed(mut self, tag: &str, signed: bool) -> Self {
        self.candidate.signatures.insert(tag.to_string(), signed);
        self
    }

    pub fn build(mut self) -> Candidate {
        if self.candidate.digest.is_empty() {
            self.candidate.digest = format!(
                "sha256:{}-{}",
                self.candidate.repository,
                self.candidate.tags.join("-")
            );
        }
        self.candidate
    }
}

/// Build a retention rule: template + integer param + repository and tag patterns
pub fn retention_rule(template: &str, param: i64, repo_pattern: &str, tag_pattern: &str) -> RetentionRule {
    let mut params = serde_json::Map::new();
    params.insert(template.to_string(), json!(param));
    let mut scope_selectors = HashMap::new();
    scope_selectors.insert(
        SCOPE_REPOSITORY.to_string(),
        vec![SelectorSpec::doublestar("repoMatches", repo_pattern)],
    );
    RetentionRule {
        id: 0,
        priority: 0,
        disabled: false,
        action: ACTION_RETAIN.to_string(),
        template: template.to_string(),
        params,
        tag_selectors: vec![SelectorSpec::doublestar("matches", tag_pattern)],
        scope_selectors,
    }
}

/// Builder for retention policies scoped to a project
pub struct RetentionPolicyBuilder {
    policy: RetentionPolicy,
}

impl RetentionPolicyBuilder {
    pub fn new(project_id: i64) -> Self {
        Self {
            policy: RetentionPolicy {
                id: 0,
                algorithm: Algorithm::Or,
                rules: vec![],
                trigger: RetentionTrigger::manual(),
                scope: Scope {
                    level: SCOPE_LEVEL_PROJECT.to_string(),
                    reference: project_id,
                },
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn rule(mut self, rule: RetentionRule) -> Self {
        self.policy.rules.push(rule);
        self
    }

    pub fn disabled_rule(mut self, mut rule: RetentionRule) -> Self {
        rule.disabled = true;
        self.policy.rules.push(rule);
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.policy.algorithm = algorithm;
        self
    }

    pub fn scheduled(mut self, cron: &str) -> Self {
        self.policy.trigger = RetentionTrigger::scheduled(cron);
        self
    }

    pub fn build(self) -> RetentionPolicy {
        self.policy
    }
}

/// Builder for webhook policies
pub struct WebhookPolicyBuilder {
    policy: WebhookPolicy,
}

impl WebhookPolicyBuilder {
    pub fn new(project_id: i64, name: &str) -> Self {
        Self {
            policy: WebhookPolicy::new(project_id, name, vec![], vec![]),
        }
    }

    pub fn target(mut self, address: &str) -> Self {
        self.policy.targets.push(HookTarget::http(address));
        self
    }

    pub fn event(mut self, event_type: EventType) -> Self {
        self.policy.event_types.push(event_type);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.policy.enabled = enabled;
        self
    }

    pub fn build(self) -> WebhookPolicy {
        self.policy
    }
}
