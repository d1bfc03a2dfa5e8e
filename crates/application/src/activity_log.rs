//! 活动日志记录器
//!
//! 每一次状态跃迁都会产生一条只追加的审计记录。日志写入失败绝不
//! 阻断编排流程：降级为错误日志并计数，状态变更照常提交。

use std::sync::Arc;

use tracing::error;

use orchestrator_domain::{ActivityLogEntry, ActivityLogRepository, Actor, EntityType};

#[derive(Clone)]
pub struct ActivityLogRecorder {
    repository: Arc<dyn ActivityLogRepository>,
}

impl ActivityLogRecorder {
    pub fn new(repository: Arc<dyn ActivityLogRepository>) -> Self {
        Self { repository }
    }

    /// 记录一次状态跃迁。失败时只记错误，不向调用方传播。
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        tenant_id: &str,
        transition: &str,
        previous_value: serde_json::Value,
        new_value: serde_json::Value,
        actor: Actor,
    ) {
        let entry = ActivityLogEntry::new(
            entity_type,
            entity_id,
            tenant_id.to_string(),
            transition.to_string(),
            previous_value,
            new_value,
            actor,
        );

        if let Err(e) = self.repository.append(&entry).await {
            metrics::counter!("orchestrator_activity_log_failures_total").increment(1);
            error!(
                entity_type = ?entity_type,
                entity_id,
                transition,
                error = %e,
                "活动日志写入失败，状态变更不受影响"
            );
        }
    }

    /// 常用缩写：记录发布状态跃迁
    pub async fn record_release_status(
        &self,
        release: &orchestrator_domain::Release,
        transition: &str,
        previous: impl serde::Serialize,
        new: impl serde::Serialize,
        actor: Actor,
    ) {
        self.record(
            EntityType::Release,
            release.id,
            &release.tenant_id,
            transition,
            serde_json::to_value(previous).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
            actor,
        )
        .await;
    }

    pub async fn record_task_status(
        &self,
        tenant_id: &str,
        task: &orchestrator_domain::ReleaseTask,
        previous: impl serde::Serialize,
        new: impl serde::Serialize,
        actor: Actor,
    ) {
        self.record(
            EntityType::Task,
            task.id,
            tenant_id,
            "task.status",
            serde_json::to_value(previous).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
            actor,
        )
        .await;
    }

    pub async fn record_cycle_status(
        &self,
        tenant_id: &str,
        cycle: &orchestrator_domain::RegressionCycle,
        previous: impl serde::Serialize,
        new: impl serde::Serialize,
        actor: Actor,
    ) {
        self.record(
            EntityType::RegressionCycle,
            cycle.id,
            tenant_id,
            "regression_cycle.status",
            serde_json::to_value(previous).unwrap_or(serde_json::Value::Null),
            serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
            actor,
        )
        .await;
    }
}
