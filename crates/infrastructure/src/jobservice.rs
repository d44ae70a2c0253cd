//! worker pool 的 HTTP 客户端

use async_trait::async_trait;
use jobcore_core::config::models::JobServiceConfig;
use jobcore_core::models::{JobAction, JobData, JobStats, PeriodicJob};
use jobcore_core::traits::JobServiceClient;
use jobcore_core::{CoreError, CoreResult};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::observability::MetricsCollector;

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job: SubmittedJob,
}

#[derive(Debug, Deserialize)]
struct SubmittedJob {
    id: String,
}

pub struct HttpJobServiceClient {
    base_url: String,
    http_client: reqwest::Client,
    metrics: Arc<MetricsCollector>,
}

impl HttpJobServiceClient {
    pub fn new(config: &JobServiceConfig, metrics: Arc<MetricsCollector>) -> CoreResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| CoreError::Internal(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
            metrics,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/jobs{path}", self.base_url)
    }

    fn unavailable(e: reqwest::Error) -> CoreError {
        CoreError::Unavailable(format!("worker pool 连接失败: {e}"))
    }

    /// 非2xx响应转换为带状态码的结构化错误
    async fn check(response: Response) -> CoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        warn!("worker pool 返回错误: HTTP {} - {}", status, message);
        Err(CoreError::JobService {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl JobServiceClient for HttpJobServiceClient {
    #[instrument(skip(self, job), fields(job.name = %job.name))]
    async fn submit_job(&self, job: &JobData) -> CoreResult<String> {
        let started = Instant::now();
        let response = self
            .http_client
            .post(self.url(""))
            .json(job)
            .send()
            .await
            .map_err(Self::unavailable)?;
        self.metrics
            .record_jobservice_call("submit_job", started.elapsed().as_secs_f64());

        let submitted: SubmitResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("解析提交结果失败: {e}")))?;
        debug!("作业已提交: {}", submitted.job.id);
        Ok(submitted.job.id)
    }

    #[instrument(skip(self))]
    async fn post_action(&self, uuid: &str, action: JobAction) -> CoreResult<()> {
        let response = self
            .http_client
            .post(self.url(&format!("/{uuid}")))
            .json(&json!({ "action": action.as_str() }))
            .send()
            .await
            .map_err(Self::unavailable)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("作业 {} 已不存在，忽略 {} 动作", uuid, action.as_str());
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job_log(&self, uuid: &str) -> CoreResult<Vec<u8>> {
        let response = self
            .http_client
            .get(self.url(&format!("/{uuid}/log")))
            .send()
            .await
            .map_err(Self::unavailable)?;
        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(Self::unavailable)?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self))]
    async fn get_executions(&self, periodic_uuid: &str) -> CoreResult<Vec<JobStats>> {
        let response = self
            .http_client
            .get(self.url(&format!("/{periodic_uuid}/executions")))
            .send()
            .await
            .map_err(Self::unavailable)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("解析执行列表失败: {e}")))
    }

    #[instrument(skip(self))]
    async fn list_periodic_jobs(&self) -> CoreResult<Vec<PeriodicJob>> {
        let response = self
            .http_client
            .get(self.url("/periodic"))
            .send()
            .await
            .map_err(Self::unavailable)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("解析周期作业列表失败: {e}")))
    }
}
