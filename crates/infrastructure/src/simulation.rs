//! 外部集成的模拟实现
//!
//! 嵌入模式与演示环境使用：不访问任何外部系统，构建/测试批次在
//! 配置的延迟后自动变为完成，便于完整跑通发布流程。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use orchestrator_domain::{
    CiService, DeliveryResult, ExternalJobStatus, MessageKind, MessagingService, Platform,
    ScmService, TestManagementService, TicketingService,
};
use orchestrator_errors::OrchestratorResult;

pub struct SimulatedScm;

#[async_trait]
impl ScmService for SimulatedScm {
    async fn fork_branch(
        &self,
        tenant_id: &str,
        repo: &str,
        base_branch: &str,
        release_branch: &str,
    ) -> OrchestratorResult<String> {
        info!(tenant_id, repo, base_branch, release_branch, "[模拟] 切出发布分支");
        Ok(format!("refs/heads/{release_branch}"))
    }

    async fn create_release_tag(
        &self,
        tenant_id: &str,
        repo: &str,
        branch: &str,
        tag: &str,
    ) -> OrchestratorResult<String> {
        info!(tenant_id, repo, branch, tag, "[模拟] 创建发布tag");
        Ok(format!("refs/tags/{tag}"))
    }
}

/// 触发后经过固定延迟自动完成的异步作业模拟
struct SimulatedJobs {
    prefix: &'static str,
    duration: Duration,
    started: Mutex<HashMap<String, Instant>>,
}

impl SimulatedJobs {
    fn new(prefix: &'static str, duration: Duration) -> Self {
        Self {
            prefix,
            duration,
            started: Mutex::new(HashMap::new()),
        }
    }

    fn start(&self) -> String {
        let id = format!("{}-{}", self.prefix, Uuid::new_v4());
        if let Ok(mut started) = self.started.lock() {
            started.insert(id.clone(), Instant::now());
        }
        id
    }

    fn status(&self, id: &str) -> ExternalJobStatus {
        let started = match self.started.lock() {
            Ok(guard) => guard,
            Err(_) => return ExternalJobStatus::Failed,
        };
        match started.get(id) {
            // 未知的作业视为已被外部清理
            None => ExternalJobStatus::Cancelled,
            Some(at) if at.elapsed() >= self.duration => ExternalJobStatus::Completed,
            Some(_) => ExternalJobStatus::Running,
        }
    }
}

pub struct SimulatedCi {
    jobs: SimulatedJobs,
}

impl SimulatedCi {
    pub fn new(build_duration: Duration) -> Self {
        Self {
            jobs: SimulatedJobs::new("sim-ci", build_duration),
        }
    }
}

#[async_trait]
impl CiService for SimulatedCi {
    async fn trigger(
        &self,
        tenant_id: &str,
        workflow_ref: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        let run_id = self.jobs.start();
        info!(tenant_id, workflow_ref, run_id, "[模拟] 触发CI工作流");
        Ok(run_id)
    }

    async fn get_run_status(
        &self,
        _tenant_id: &str,
        run_id: &str,
    ) -> OrchestratorResult<ExternalJobStatus> {
        Ok(self.jobs.status(run_id))
    }
}

pub struct SimulatedTestManagement {
    jobs: SimulatedJobs,
}

impl SimulatedTestManagement {
    pub fn new(run_duration: Duration) -> Self {
        Self {
            jobs: SimulatedJobs::new("sim-test", run_duration),
        }
    }
}

#[async_trait]
impl TestManagementService for SimulatedTestManagement {
    async fn create_test_runs(
        &self,
        tenant_id: &str,
        config_ref: &str,
        cycle_tag: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        let run_ref = self.jobs.start();
        info!(tenant_id, config_ref, cycle_tag, run_ref, "[模拟] 创建回归测试批次");
        Ok(run_ref)
    }

    async fn get_test_run_status(
        &self,
        _tenant_id: &str,
        run_ref: &str,
    ) -> OrchestratorResult<ExternalJobStatus> {
        Ok(self.jobs.status(run_ref))
    }
}

pub struct SimulatedTicketing;

#[async_trait]
impl TicketingService for SimulatedTicketing {
    async fn create_tickets(
        &self,
        tenant_id: &str,
        config_ref: &str,
        _params: &serde_json::Value,
    ) -> OrchestratorResult<String> {
        let batch_ref = format!("sim-ticket-{}", Uuid::new_v4());
        info!(tenant_id, config_ref, batch_ref, "[模拟] 创建发布工单");
        Ok(batch_ref)
    }
}

pub struct SimulatedMessaging;

#[async_trait]
impl MessagingService for SimulatedMessaging {
    async fn send_message(
        &self,
        config_ref: &str,
        kind: MessageKind,
        params: &serde_json::Value,
        platform: Option<Platform>,
    ) -> OrchestratorResult<Vec<DeliveryResult>> {
        info!(config_ref, kind = ?kind, platform = ?platform, params = %params, "[模拟] 发送消息");
        Ok(vec![DeliveryResult {
            channel: "sim-channel".to_string(),
            delivered: true,
            error: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_ci_completes_after_duration() {
        let ci = SimulatedCi::new(Duration::from_millis(20));
        let run_id = ci.trigger("t", "wf", &serde_json::json!({})).await.unwrap();
        assert_eq!(
            ci.get_run_status("t", &run_id).await.unwrap(),
            ExternalJobStatus::Running
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            ci.get_run_status("t", &run_id).await.unwrap(),
            ExternalJobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_run_is_cancelled() {
        let ci = SimulatedCi::new(Duration::from_secs(1));
        assert_eq!(
            ci.get_run_status("t", "missing").await.unwrap(),
            ExternalJobStatus::Cancelled
        );
    }
}
