use async_trait::async_trait;
use jobcore_core::CoreResult;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;

/// 项目下的一个仓库
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub namespace_id: i64,
    pub namespace: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// 制品清单来源
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn list_repositories(&self, project_id: i64) -> CoreResult<Vec<RepositoryRef>>;
    async fn list_candidates(&self, repository: &RepositoryRef) -> CoreResult<Vec<Candidate>>;
}

/// 制品删除
#[async_trait]
pub trait ArtifactDeleter: Send + Sync {
    async fn delete(&self, candidate: &Candidate) -> CoreResult<()>;
}
