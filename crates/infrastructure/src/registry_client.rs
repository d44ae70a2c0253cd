//! 制品元数据服务的 HTTP 客户端

use async_trait::async_trait;
use jobcore_core::config::models::RegistryConfig;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::candidate::Candidate;
use jobcore_domain::ports::{ArtifactDeleter, ArtifactSource, RepositoryRef};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 按项目列出仓库与候选制品，并按 digest 删除制品
pub struct HttpRegistryClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(config: &RegistryConfig) -> CoreResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| CoreError::Internal(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/internal{path}", self.base_url)
    }

    fn unavailable(e: reqwest::Error) -> CoreError {
        CoreError::Unavailable(format!("制品服务连接失败: {e}"))
    }

    async fn check(response: Response) -> CoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        warn!("制品服务返回错误: HTTP {} - {}", status, message);
        match status {
            StatusCode::NOT_FOUND => Err(CoreError::not_found("制品", message)),
            StatusCode::PRECONDITION_FAILED => Err(CoreError::Immutable(message)),
            _ => Err(CoreError::Unavailable(format!("HTTP {status}: {message}"))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> CoreResult<T> {
        let response = self
            .http_client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(Self::unavailable)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("解析制品服务响应失败: {e}")))
    }
}

#[async_trait]
impl ArtifactSource for HttpRegistryClient {
    #[instrument(skip(self))]
    async fn list_repositories(&self, project_id: i64) -> CoreResult<Vec<RepositoryRef>> {
        self.get_json(&format!("/projects/{project_id}/repositories"), &[])
            .await
    }

    #[instrument(skip(self), fields(repository = %repository.full_name()))]
    async fn list_candidates(&self, repository: &RepositoryRef) -> CoreResult<Vec<Candidate>> {
        self.get_json(
            &format!("/projects/{}/candidates", repository.namespace_id),
            &[("repository", repository.name.as_str())],
        )
        .await
    }
}

#[async_trait]
impl ArtifactDeleter for HttpRegistryClient {
    #[instrument(skip(self, candidate), fields(target = %candidate.display_name()))]
    async fn delete(&self, candidate: &Candidate) -> CoreResult<()> {
        let response = self
            .http_client
            .delete(self.url(&format!("/projects/{}/artifacts", candidate.namespace_id)))
            .query(&[
                ("repository", candidate.repository.as_str()),
                ("digest", candidate.digest.as_str()),
            ])
            .send()
            .await
            .map_err(Self::unavailable)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("制品 {} 已不存在", candidate.display_name());
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}
