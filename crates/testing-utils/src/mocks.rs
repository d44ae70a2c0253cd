//! In-memory doubles for the external collaborators
//!
//! The worker pool, artifact storage and webhook targets are all replaced
//! by recorders so tests can assert on what the core asked them to do.

use async_trait::async_trait;
use jobcore_core::models::{JobAction, JobData, JobKind, JobStats, PeriodicJob};
use jobcore_core::traits::JobServiceClient;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::candidate::Candidate;
use jobcore_domain::ports::{
    ArtifactDeleter, ArtifactSource, DeliveryResponse, RepositoryRef, WebhookSender,
};
use jobcore_domain::webhook::HookTarget;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock worker pool
///
/// Periodic submissions are kept as periodic jobs until a `stop` action
/// removes them, mirroring what the real worker pool stores.
#[derive(Debug, Clone, Default)]
pub struct MockJobServiceClient {
    submissions: Arc<Mutex<Vec<(String, JobData)>>>,
    actions: Arc<Mutex<Vec<(String, JobAction)>>>,
    periodic: Arc<Mutex<Vec<PeriodicJob>>>,
    next_id: Arc<Mutex<u64>>,
    /// Remaining successful submissions, `None` means unlimited
    submit_budget: Arc<Mutex<Option<usize>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockJobServiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission fails with `Unavailable`
    pub fn fail_submissions(&self) {
        *self.submit_budget.lock().unwrap() = Some(0);
    }

    /// Accept `n` more submissions, then fail
    pub fn fail_submissions_after(&self, n: usize) {
        *self.submit_budget.lock().unwrap() = Some(n);
    }

    pub fn restore_submissions(&self) {
        *self.submit_budget.lock().unwrap() = None;
    }

    /// Every call fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn submitted_jobs(&self) -> Vec<(String, JobData)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_named(&self, name: &str) -> Vec<(String, JobData)> {
        self.submitted_jobs()
            .into_iter()
            .filter(|(_, job)| job.name == name)
            .collect()
    }

    pub fn actions(&self) -> Vec<(String, JobAction)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn periodic_jobs(&self) -> Vec<PeriodicJob> {
        self.periodic.lock().unwrap().clone()
    }

    /// Simulate the worker pool losing its periodic job store
    pub fn clear_periodic_jobs(&self) {
        self.periodic.lock().unwrap().clear();
    }

    pub fn add_periodic_job(&self, job: PeriodicJob) {
        self.periodic.lock().unwrap().push(job);
    }

    fn check_available(&self) -> CoreResult<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(CoreError::Unavailable("mock worker pool unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobServiceClient for MockJobServiceClient {
    async fn submit_job(&self, job: &JobData) -> CoreResult<String> {
        self.check_available()?;
        {
            let mut budget = self.submit_budget.lock().unwrap();
            match budget.as_mut() {
                Some(0) => {
                    return Err(CoreError::Unavailable("mock submission failure".to_string()))
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("job-{}", *next)
        };
        if job.metadata.job_kind == Some(JobKind::Periodic) {
            self.periodic.lock().unwrap().push(PeriodicJob {
                id: id.clone(),
                job_name: job.name.clone(),
                cron_spec: job.metadata.cron.clone().unwrap_or_default(),
                job_params: job.parameters.clone(),
                status_hook: job.status_hook.clone(),
            });
        }
        self.submissions.lock().unwrap().push((id.clone(), job.clone()));
        Ok(id)
    }

    async fn post_action(&self, uuid: &str, action: JobAction) -> CoreResult<()> {
        self.check_available()?;
        self.actions.lock().unwrap().push((uuid.to_string(), action));
        if action == JobAction::Stop {
            self.periodic.lock().unwrap().retain(|p| p.id != uuid);
        }
        Ok(())
    }

    async fn get_job_log(&self, uuid: &str) -> CoreResult<Vec<u8>> {
        self.check_available()?;
        Ok(format!("log of {uuid}").into_bytes())
    }

    async fn get_executions(&self, _periodic_uuid: &str) -> CoreResult<Vec<JobStats>> {
        self.check_available()?;
        Ok(Vec::new())
    }

    async fn list_periodic_jobs(&self) -> CoreResult<Vec<PeriodicJob>> {
        self.check_available()?;
        Ok(self.periodic_jobs())
    }
}

/// In-memory artifact inventory keyed by repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactSource {
    repositories: Arc<Mutex<Vec<RepositoryRef>>>,
    candidates: Arc<Mutex<HashMap<RepositoryRef, Vec<Candidate>>>>,
}

impl InMemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate, registering its repository on first use
    pub fn add(&self, candidate: Candidate) {
        let repository = RepositoryRef {
            namespace_id: candidate.namespace_id,
            namespace: candidate.namespace.clone(),
            name: candidate.repository.clone(),
        };
        {
            let mut repositories = self.repositories.lock().unwrap();
            if !repositories.contains(&repository) {
                repositories.push(repository.clone());
            }
        }
        self.candidates
            .lock()
            .unwrap()
            .entry(repository)
            .or_default()
            .push(candidate);
    }

    pub fn with_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let source = Self::new();
        for candidate in candidates {
            source.add(candidate);
        }
        source
    }
}

#[async_trait]
impl ArtifactSource for InMemoryArtifactSource {
    async fn list_repositories(&self, project_id: i64) -> CoreResult<Vec<RepositoryRef>> {
        Ok(self
            .repositories
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.namespace_id == project_id)
            .cloned()
            .collect())
    }

    async fn list_candidates(&self, repository: &RepositoryRef) -> CoreResult<Vec<Candidate>> {
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }
}

/// Deleter that records every call and can be told to fail on digests
#[derive(Debug, Clone, Default)]
pub struct RecordingDeleter {
    deleted: Arc<Mutex<Vec<Candidate>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    immutable: Arc<Mutex<HashSet<String>>>,
}

impl RecordingDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, digest: &str) {
        self.failing.lock().unwrap().insert(digest.to_string());
    }

    /// Reject deletes of this digest the way the registry answers 412
    pub fn reject_as_immutable(&self, digest: &str) {
        self.immutable.lock().unwrap().insert(digest.to_string());
    }

    pub fn deleted(&self) -> Vec<Candidate> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactDeleter for RecordingDeleter {
    async fn delete(&self, candidate: &Candidate) -> CoreResult<()> {
        if self.immutable.lock().unwrap().contains(&candidate.digest) {
            return Err(CoreError::Immutable(format!(
                "mock immutable artifact: {}",
                candidate.digest
            )));
        }
        if self.failing.lock().unwrap().contains(&candidate.digest) {
            return Err(CoreError::Internal(format!(
                "mock delete failure: {}",
                candidate.digest
            )));
        }
        self.deleted.lock().unwrap().push(candidate.clone());
        Ok(())
    }
}

/// Webhook sender that records deliveries
#[derive(Debug, Clone)]
pub struct RecordingWebhookSender {
    sent: Arc<Mutex<Vec<(HookTarget, Vec<u8>)>>>,
    status: Arc<Mutex<u16>>,
    /// Fail the next `n` deliveries with a network error
    failures_left: Arc<Mutex<usize>>,
}

impl Default for RecordingWebhookSender {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(Mutex::new(200)),
            failures_left: Arc::new(Mutex::new(0)),
        }
    }
}

impl RecordingWebhookSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_next(&self, n: usize) {
        *self.failures_left.lock().unwrap() = n;
    }

    pub fn sent(&self) -> Vec<(HookTarget, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingWebhookSender {
    async fn send(&self, target: &HookTarget, body: &[u8]) -> CoreResult<DeliveryResponse> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(CoreError::Unavailable(format!(
                    "mock network failure: {}",
                    target.address
                )));
            }
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), body.to_vec()));
        Ok(DeliveryResponse {
            status: *self.status.lock().unwrap(),
        })
    }
}
