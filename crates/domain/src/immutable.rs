//! 不可变tag规则与匹配器
//!
//! 匹配器只读、无副作用，规则只在单次调用内缓存

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jobcore_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::repositories::ImmutableRuleRepository;
use crate::selectors::{FilterSet, SelectorSpec};

pub const SCOPE_REPOSITORY: &str = "repository";
pub const ACTION_IMMUTABLE: &str = "immutable";
pub const TEMPLATE_IMMUTABLE: &str = "immutable_template";

/// 规则元数据，以JSON形式保存在 tag_filter 中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub tag_selectors: Vec<SelectorSpec>,
    #[serde(default)]
    pub scope_selectors: HashMap<String, Vec<SelectorSpec>>,
}

fn default_action() -> String {
    ACTION_IMMUTABLE.to_string()
}

fn default_template() -> String {
    TEMPLATE_IMMUTABLE.to_string()
}

impl RuleMetadata {
    pub fn new(repository: SelectorSpec, tag: SelectorSpec) -> Self {
        let mut scope_selectors = HashMap::new();
        scope_selectors.insert(SCOPE_REPOSITORY.to_string(), vec![repository]);
        Self {
            priority: 0,
            action: default_action(),
            template: default_template(),
            tag_selectors: vec![tag],
            scope_selectors,
        }
    }

    /// 选择器内容的规范化哈希，用于同一项目内的唯一性约束
    pub fn name_hash(&self) -> CoreResult<String> {
        let scopes: BTreeMap<&String, &Vec<SelectorSpec>> = self.scope_selectors.iter().collect();
        let canonical = serde_json::json!({
            "tag_selectors": self.tag_selectors,
            "scope_selectors": scopes,
        });
        Ok(STANDARD.encode(serde_json::to_vec(&canonical)?))
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.action != ACTION_IMMUTABLE {
            return Err(CoreError::invalid(format!("不支持的规则动作: {}", self.action)));
        }
        let repositories = self.repository_selectors();
        if repositories.is_empty() {
            return Err(CoreError::invalid("不可变规则缺少仓库范围选择器"));
        }
        if self.tag_selectors.is_empty() {
            return Err(CoreError::invalid("不可变规则缺少tag选择器"));
        }
        FilterSet::new(repositories)?;
        for spec in &self.tag_selectors {
            FilterSet::new([spec])?;
        }
        Ok(())
    }

    fn repository_selectors(&self) -> &[SelectorSpec] {
        self.scope_selectors
            .get(SCOPE_REPOSITORY)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 不可变tag规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableRule {
    pub id: i64,
    pub project_id: i64,
    pub tag_filter: RuleMetadata,
    pub disabled: bool,
    pub creation_time: DateTime<Utc>,
}

impl ImmutableRule {
    pub fn new(project_id: i64, tag_filter: RuleMetadata) -> Self {
        Self {
            id: 0,
            project_id,
            tag_filter,
            disabled: false,
            creation_time: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    rule_id: i64,
    repository: FilterSet,
    tags: Vec<FilterSet>,
}

impl CompiledRule {
    fn compile(rule: &ImmutableRule) -> CoreResult<Option<Self>> {
        let metadata = &rule.tag_filter;
        let repositories = metadata.repository_selectors();
        if repositories.is_empty() || metadata.tag_selectors.is_empty() {
            return Ok(None);
        }
        let tags = metadata
            .tag_selectors
            .iter()
            .map(|spec| {
                let spec = spec.clone().with_untagged(false);
                FilterSet::new([&spec])
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Some(Self {
            rule_id: rule.id,
            repository: FilterSet::new(repositories)?,
            tags,
        }))
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        let single = std::slice::from_ref(candidate);
        if self.repository.apply(single).is_empty() {
            return false;
        }
        self.tags.iter().any(|tag| !tag.apply(single).is_empty())
    }
}

/// 一个项目已启用规则的快照
#[derive(Debug, Default)]
pub struct ProjectRules {
    rules: Vec<CompiledRule>,
}

impl ProjectRules {
    pub fn compile(rules: &[ImmutableRule]) -> CoreResult<Self> {
        let mut compiled = Vec::new();
        for rule in rules.iter().filter(|r| !r.disabled) {
            if let Some(c) = CompiledRule::compile(rule)? {
                compiled.push(c);
            }
        }
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 返回第一个保护该候选的规则ID
    pub fn matching_rule(&self, candidate: &Candidate) -> Option<i64> {
        self.rules
            .iter()
            .find(|r| r.matches(candidate))
            .map(|r| r.rule_id)
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        self.matching_rule(candidate).is_some()
    }
}

/// 判断候选制品是否受不可变规则保护
#[async_trait]
pub trait ImmutableMatcher: Send + Sync {
    async fn is_immutable(&self, project_id: i64, candidate: &Candidate) -> CoreResult<bool>;

    /// 加载项目规则快照，供批量判断复用
    async fn rules_for(&self, project_id: i64) -> CoreResult<ProjectRules>;
}

/// 基于规则仓储的匹配器
pub struct RuleMatcher {
    rules: Arc<dyn ImmutableRuleRepository>,
}

impl RuleMatcher {
    pub fn new(rules: Arc<dyn ImmutableRuleRepository>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ImmutableMatcher for RuleMatcher {
    async fn is_immutable(&self, project_id: i64, candidate: &Candidate) -> CoreResult<bool> {
        Ok(self.rules_for(project_id).await?.matches(candidate))
    }

    async fn rules_for(&self, project_id: i64) -> CoreResult<ProjectRules> {
        let rules = self.rules.list(project_id, true).await?;
        ProjectRules::compile(&rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::test_support::image;

    fn rule(id: i64, repository: &str, tag: &str) -> ImmutableRule {
        let mut r = ImmutableRule::new(
            1,
            RuleMetadata::new(
                SelectorSpec::doublestar("repoMatches", repository),
                SelectorSpec::doublestar("matches", tag),
            ),
        );
        r.id = id;
        r
    }

    #[test]
    fn test_repository_and_tag_must_both_match() {
        let rules = ProjectRules::compile(&[rule(1, "redis", "release-**")]).unwrap();
        assert!(rules.matches(&image("redis", &["release-1.0"])));
        assert!(!rules.matches(&image("redis", &["dev-1"])));
        assert!(!rules.matches(&image("nginx", &["release-1.0"])));
    }

    #[test]
    fn test_untagged_is_never_immutable() {
        let mut r = rule(1, "**", "**");
        r.tag_filter.tag_selectors[0] = SelectorSpec::doublestar("matches", "**").with_untagged(true);
        let rules = ProjectRules::compile(&[r]).unwrap();
        assert!(!rules.matches(&image("redis", &[])));
        assert!(rules.matches(&image("redis", &["x"])));
    }

    #[test]
    fn test_disabled_and_incomplete_rules_are_skipped() {
        let mut disabled = rule(1, "redis", "**");
        disabled.disabled = true;
        let mut no_scope = rule(2, "redis", "**");
        no_scope.tag_filter.scope_selectors.clear();
        let mut no_tags = rule(3, "redis", "**");
        no_tags.tag_filter.tag_selectors.clear();

        let rules = ProjectRules::compile(&[disabled, no_scope, no_tags]).unwrap();
        assert!(rules.is_empty());
        assert!(!rules.matches(&image("redis", &["x"])));
    }

    #[test]
    fn test_matching_rule_reports_first_match() {
        let rules =
            ProjectRules::compile(&[rule(7, "nginx", "**"), rule(9, "redis", "v*")]).unwrap();
        assert_eq!(rules.matching_rule(&image("redis", &["v1"])), Some(9));
    }

    #[test]
    fn test_name_hash_is_stable_and_distinct() {
        let a = rule(1, "redis", "release-**").tag_filter;
        let b = rule(2, "redis", "release-**").tag_filter;
        let c = rule(3, "redis", "dev-*").tag_filter;
        assert_eq!(a.name_hash().unwrap(), b.name_hash().unwrap());
        assert_ne!(a.name_hash().unwrap(), c.name_hash().unwrap());
    }

    #[test]
    fn test_validate() {
        assert!(rule(1, "redis", "**").tag_filter.validate().is_ok());
        let mut bad = rule(1, "redis", "**").tag_filter;
        bad.tag_selectors.clear();
        assert!(bad.validate().is_err());
    }
}
