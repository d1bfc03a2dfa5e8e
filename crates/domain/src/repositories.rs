//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则。
//! 编排引擎只依赖这些trait，不关心具体存储技术。

use std::time::Duration;

use async_trait::async_trait;

use orchestrator_errors::OrchestratorResult;

use crate::entities::{
    ActivityLogEntry, EntityType, RegressionCycle, Release, ReleaseConfig, ReleaseTask,
};
use crate::value_objects::Stage;

/// 发布仓储抽象
#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    async fn create(&self, release: &Release) -> OrchestratorResult<Release>;
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Release>>;
    async fn update(&self, release: &Release) -> OrchestratorResult<()>;
    /// 调度循环的候选集：PENDING/IN_PROGRESS/PAUSED/SUBMITTED
    async fn list_in_flight(&self) -> OrchestratorResult<Vec<Release>>;
    /// 某配置下最近创建的发布（用于版本推导与节奏判断）
    async fn latest_for_config(&self, config_id: i64) -> OrchestratorResult<Option<Release>>;
    async fn list_for_tenant(&self, tenant_id: &str) -> OrchestratorResult<Vec<Release>>;
}

/// 编排任务仓储抽象
#[async_trait]
pub trait ReleaseTaskRepository: Send + Sync {
    async fn create(&self, task: &ReleaseTask) -> OrchestratorResult<ReleaseTask>;
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ReleaseTask>>;
    async fn update(&self, task: &ReleaseTask) -> OrchestratorResult<()>;
    async fn list_for_release(&self, release_id: i64) -> OrchestratorResult<Vec<ReleaseTask>>;
    /// 按声明序号升序返回
    async fn list_for_stage(
        &self,
        release_id: i64,
        stage: Stage,
    ) -> OrchestratorResult<Vec<ReleaseTask>>;
}

/// 回归测试周期仓储抽象
#[async_trait]
pub trait RegressionCycleRepository: Send + Sync {
    async fn create(&self, cycle: &RegressionCycle) -> OrchestratorResult<RegressionCycle>;
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<RegressionCycle>>;
    async fn update(&self, cycle: &RegressionCycle) -> OrchestratorResult<()>;
    /// 按序号升序返回
    async fn list_for_release(&self, release_id: i64) -> OrchestratorResult<Vec<RegressionCycle>>;
}

/// 活动日志仓储抽象（只追加）
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, entry: &ActivityLogEntry) -> OrchestratorResult<ActivityLogEntry>;
    async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> OrchestratorResult<Vec<ActivityLogEntry>>;
}

/// 发布配置仓储抽象（对编排引擎只读）
#[async_trait]
pub trait ReleaseConfigRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ReleaseConfig>>;
    async fn list_enabled(&self) -> OrchestratorResult<Vec<ReleaseConfig>>;
}

/// 编排互斥锁，按字符串键划分粒度。
///
/// 多个调度实例并存时，锁是对编排可变状态的唯一互斥手段；
/// 进程内mutex在多实例部署下不满足要求。键空间见
/// [`release_lock_key`] 与 [`config_lock_key`]，两者互不冲突。
#[async_trait]
pub trait ReleaseLock: Send + Sync {
    /// 尝试获取锁；已被持有时返回 `false`，不阻塞等待
    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> OrchestratorResult<bool>;
    /// 仅当持有者匹配时释放
    async fn release(&self, key: &str, owner: &str) -> OrchestratorResult<()>;
}

/// 单个发布的推进/操作互斥键
pub fn release_lock_key(release_id: i64) -> String {
    format!("release:{release_id}")
}

/// 排期阶段按配置粒度的互斥键，防止多实例重复建发布
pub fn config_lock_key(config_id: i64) -> String {
    format!("config:{config_id}")
}
