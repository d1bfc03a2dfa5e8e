//! 外部集成的脚本化mock
//!
//! 默认全部成功；测试可以预置失败或改写外部作业状态来构造分支。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use orchestrator_domain::{
    CiService, DeliveryResult, ExternalJobStatus, MessageKind, MessagingService, Platform,
    ScmService, TestManagementService, TicketingService,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

fn take_failure(slot: &Mutex<Option<OrchestratorError>>) -> Option<OrchestratorError> {
    slot.lock().ok().and_then(|mut guard| guard.take())
}

#[derive(Default)]
pub struct MockScmService {
    fail_next: Mutex<Option<OrchestratorError>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockScmService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置下一次调用的失败
    pub fn fail_next_with(&self, error: OrchestratorError) {
        if let Ok(mut guard) = self.fail_next.lock() {
            *guard = Some(error);
        }
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ScmService for MockScmService {
    async fn fork_branch(
        &self,
        _tenant_id: &str,
        repo: &str,
        base_branch: &str,
        release_branch: &str,
    ) -> OrchestratorResult<String> {
        if let Some(error) = take_failure(&self.fail_next) {
            return Err(error);
        }
        self.record(format!("fork {repo} {base_branch} -> {release_branch}"));
        Ok(format!("refs/heads/{release_branch}"))
    }

    async fn create_release_tag(
        &self,
        _tenant_id: &str,
        repo: &str,
        branch: &str,
        tag: &str,
    ) -> OrchestratorResult<String> {
        if let Some(error) = take_failure(&self.fail_next) {
            return Err(error);
        }
        self.record(format!("tag {repo} {branch} {tag}"));
        Ok(format!("refs/tags/{tag}"))
    }
}

#[derive(Default)]
pub struct MockCiService {
    fail_next: Mutex<Option<OrchestratorError>>,
    statuses: Mutex<HashMap<String, ExternalJobStatus>>,
    next_run: AtomicU64,
}

impl MockCiService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_with(&self, error: OrchestratorError) {
        if let Ok(mut guard) = self.fail_next.lock() {
            *guard = Some(error);
        }
    }

    /// 改写某次运行的外部状态
    pub fn set_run_status(&self, run_id: &str, status: ExternalJobStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(run_id.to_string(), status);
        }
    }

    /// 把所有已触发的运行全部置为某个状态
    pub fn set_all_statuses(&self, status: ExternalJobStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            for value in statuses.values_mut() {
                *value = status;
            }
        }
    }
}

#[async_trait]
impl CiService for MockCiService {
    async fn trigger(
        &self,
        _tenant_id: &str,
        _workflow_ref: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        if let Some(error) = take_failure(&self.fail_next) {
            return Err(error);
        }
        let run_id = format!("ci-run-{}", self.next_run.fetch_add(1, Ordering::SeqCst) + 1);
        self.set_run_status(&run_id, ExternalJobStatus::Running);
        Ok(run_id)
    }

    async fn get_run_status(
        &self,
        _tenant_id: &str,
        run_id: &str,
    ) -> OrchestratorResult<ExternalJobStatus> {
        let statuses = self
            .statuses
            .lock()
            .map_err(|_| OrchestratorError::storage_error("mock状态锁被毒化"))?;
        Ok(statuses
            .get(run_id)
            .copied()
            .unwrap_or(ExternalJobStatus::Cancelled))
    }
}

#[derive(Default)]
pub struct MockTestManagementService {
    statuses: Mutex<HashMap<String, ExternalJobStatus>>,
    next_batch: AtomicU64,
}

impl MockTestManagementService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_run_status(&self, run_ref: &str, status: ExternalJobStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(run_ref.to_string(), status);
        }
    }

    pub fn set_all_statuses(&self, status: ExternalJobStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            for value in statuses.values_mut() {
                *value = status;
            }
        }
    }
}

#[async_trait]
impl TestManagementService for MockTestManagementService {
    async fn create_test_runs(
        &self,
        _tenant_id: &str,
        _config_ref: &str,
        _cycle_tag: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        let batch = format!(
            "test-batch-{}",
            self.next_batch.fetch_add(1, Ordering::SeqCst) + 1
        );
        self.set_run_status(&batch, ExternalJobStatus::Running);
        Ok(batch)
    }

    async fn get_test_run_status(
        &self,
        _tenant_id: &str,
        run_ref: &str,
    ) -> OrchestratorResult<ExternalJobStatus> {
        let statuses = self
            .statuses
            .lock()
            .map_err(|_| OrchestratorError::storage_error("mock状态锁被毒化"))?;
        Ok(statuses
            .get(run_ref)
            .copied()
            .unwrap_or(ExternalJobStatus::Cancelled))
    }
}

#[derive(Default)]
pub struct MockTicketingService {
    next_batch: AtomicU64,
}

impl MockTicketingService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketingService for MockTicketingService {
    async fn create_tickets(
        &self,
        _tenant_id: &str,
        _config_ref: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        Ok(format!(
            "ticket-batch-{}",
            self.next_batch.fetch_add(1, Ordering::SeqCst) + 1
        ))
    }
}

#[derive(Default)]
pub struct MockMessagingService {
    fail_all: Mutex<bool>,
    sent: Mutex<Vec<MessageKind>>,
}

impl MockMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续所有投递都失败（消息返回但delivered=false）
    pub fn fail_all_channels(&self) {
        if let Ok(mut flag) = self.fail_all.lock() {
            *flag = true;
        }
    }

    pub fn sent_kinds(&self) -> Vec<MessageKind> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessagingService for MockMessagingService {
    async fn send_message(
        &self,
        _config_ref: &str,
        kind: MessageKind,
        _params: &serde_json::Value,
        _platform: Option<Platform>,
    ) -> OrchestratorResult<Vec<DeliveryResult>> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(kind);
        }
        let failed = self.fail_all.lock().map(|f| *f).unwrap_or(false);
        if failed {
            Ok(vec![DeliveryResult {
                channel: "mock-channel".to_string(),
                delivered: false,
                error: Some("channel unavailable".to_string()),
            }])
        } else {
            Ok(vec![DeliveryResult {
                channel: "mock-channel".to_string(),
                delivered: true,
                error: None,
            }])
        }
    }
}
