//! 选择器的评估对象
//!
//! 候选制品只存在于内存中，不做持久化

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Image,
    Chart,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Image => "image",
            CandidateKind::Chart => "chart",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 候选制品（镜像或chart版本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub namespace_id: i64,
    pub namespace: String,
    pub repository: String,
    pub kind: CandidateKind,
    #[serde(default)]
    pub tags: Vec<String>,
    pub digest: String,
    /// 推送时间（unix秒）
    #[serde(default)]
    pub pushed_time: i64,
    /// 最近拉取时间（unix秒）
    #[serde(default)]
    pub pulled_time: i64,
    #[serde(default)]
    pub creation_time: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub signatures: HashMap<String, bool>,
    #[serde(default)]
    pub vulnerability_severity: i64,
}

impl Candidate {
    /// 身份哈希：base64(kind:namespace/repository:digest)
    pub fn hash(&self) -> String {
        STANDARD.encode(format!(
            "{}:{}/{}:{}",
            self.kind, self.namespace, self.repository, self.digest
        ))
    }

    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.repository)
    }

    /// 可读的标识，带上第一个tag
    pub fn display_name(&self) -> String {
        match self.tags.first() {
            Some(tag) => format!("{}:{}", self.repo_full_name(), tag),
            None => format!("{}@{}", self.repo_full_name(), self.digest),
        }
    }
}
