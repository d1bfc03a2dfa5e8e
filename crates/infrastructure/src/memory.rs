//! 内存存储实现
//!
//! 嵌入模式与测试使用的仓储实现，`std::sync::RwLock` 保护的HashMap。
//! 锁的持有范围内没有await点，可以安全地在async方法中使用。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use orchestrator_domain::{
    ActivityLogEntry, ActivityLogRepository, EntityType, RegressionCycle, RegressionCycleRepository,
    Release, ReleaseConfig, ReleaseConfigRepository, ReleaseLock, ReleaseRepository, ReleaseTask,
    ReleaseTaskRepository, Stage,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

fn poisoned(what: &str) -> OrchestratorError {
    OrchestratorError::storage_error(format!("{what}锁被毒化"))
}

#[derive(Default)]
pub struct InMemoryReleaseRepository {
    items: RwLock<HashMap<i64, Release>>,
    next_id: AtomicI64,
}

impl InMemoryReleaseRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ReleaseRepository for InMemoryReleaseRepository {
    async fn create(&self, release: &Release) -> OrchestratorResult<Release> {
        let mut stored = release.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.write().map_err(|_| poisoned("发布仓储"))?;
        items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Release>> {
        let items = self.items.read().map_err(|_| poisoned("发布仓储"))?;
        Ok(items.get(&id).cloned())
    }

    async fn update(&self, release: &Release) -> OrchestratorResult<()> {
        let mut items = self.items.write().map_err(|_| poisoned("发布仓储"))?;
        if !items.contains_key(&release.id) {
            return Err(OrchestratorError::ReleaseNotFound { id: release.id });
        }
        items.insert(release.id, release.clone());
        Ok(())
    }

    async fn list_in_flight(&self) -> OrchestratorResult<Vec<Release>> {
        let items = self.items.read().map_err(|_| poisoned("发布仓储"))?;
        let mut releases: Vec<Release> = items
            .values()
            .filter(|r| r.is_in_flight())
            .cloned()
            .collect();
        releases.sort_by_key(|r| r.id);
        Ok(releases)
    }

    async fn latest_for_config(&self, config_id: i64) -> OrchestratorResult<Option<Release>> {
        let items = self.items.read().map_err(|_| poisoned("发布仓储"))?;
        Ok(items
            .values()
            .filter(|r| r.config_id == config_id)
            .max_by_key(|r| r.id)
            .cloned())
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> OrchestratorResult<Vec<Release>> {
        let items = self.items.read().map_err(|_| poisoned("发布仓储"))?;
        let mut releases: Vec<Release> = items
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        releases.sort_by_key(|r| r.id);
        Ok(releases)
    }
}

#[derive(Default)]
pub struct InMemoryReleaseTaskRepository {
    items: RwLock<HashMap<i64, ReleaseTask>>,
    next_id: AtomicI64,
}

impl InMemoryReleaseTaskRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ReleaseTaskRepository for InMemoryReleaseTaskRepository {
    async fn create(&self, task: &ReleaseTask) -> OrchestratorResult<ReleaseTask> {
        let mut stored = task.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.write().map_err(|_| poisoned("任务仓储"))?;
        items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ReleaseTask>> {
        let items = self.items.read().map_err(|_| poisoned("任务仓储"))?;
        Ok(items.get(&id).cloned())
    }

    async fn update(&self, task: &ReleaseTask) -> OrchestratorResult<()> {
        let mut items = self.items.write().map_err(|_| poisoned("任务仓储"))?;
        if !items.contains_key(&task.id) {
            return Err(OrchestratorError::TaskNotFound { id: task.id });
        }
        items.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_for_release(&self, release_id: i64) -> OrchestratorResult<Vec<ReleaseTask>> {
        let items = self.items.read().map_err(|_| poisoned("任务仓储"))?;
        let mut tasks: Vec<ReleaseTask> = items
            .values()
            .filter(|t| t.release_id == release_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.sequence, t.id));
        Ok(tasks)
    }

    async fn list_for_stage(
        &self,
        release_id: i64,
        stage: Stage,
    ) -> OrchestratorResult<Vec<ReleaseTask>> {
        let items = self.items.read().map_err(|_| poisoned("任务仓储"))?;
        let mut tasks: Vec<ReleaseTask> = items
            .values()
            .filter(|t| t.release_id == release_id && t.stage == stage)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.sequence, t.id));
        Ok(tasks)
    }
}

#[derive(Default)]
pub struct InMemoryRegressionCycleRepository {
    items: RwLock<HashMap<i64, RegressionCycle>>,
    next_id: AtomicI64,
}

impl InMemoryRegressionCycleRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl RegressionCycleRepository for InMemoryRegressionCycleRepository {
    async fn create(&self, cycle: &RegressionCycle) -> OrchestratorResult<RegressionCycle> {
        let mut stored = cycle.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.write().map_err(|_| poisoned("周期仓储"))?;
        items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<RegressionCycle>> {
        let items = self.items.read().map_err(|_| poisoned("周期仓储"))?;
        Ok(items.get(&id).cloned())
    }

    async fn update(&self, cycle: &RegressionCycle) -> OrchestratorResult<()> {
        let mut items = self.items.write().map_err(|_| poisoned("周期仓储"))?;
        if !items.contains_key(&cycle.id) {
            return Err(OrchestratorError::RegressionCycleNotFound { id: cycle.id });
        }
        items.insert(cycle.id, cycle.clone());
        Ok(())
    }

    async fn list_for_release(&self, release_id: i64) -> OrchestratorResult<Vec<RegressionCycle>> {
        let items = self.items.read().map_err(|_| poisoned("周期仓储"))?;
        let mut cycles: Vec<RegressionCycle> = items
            .values()
            .filter(|c| c.release_id == release_id)
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.sequence);
        Ok(cycles)
    }
}

#[derive(Default)]
pub struct InMemoryActivityLogRepository {
    items: RwLock<Vec<ActivityLogEntry>>,
    next_id: AtomicI64,
}

impl InMemoryActivityLogRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ActivityLogRepository for InMemoryActivityLogRepository {
    async fn append(&self, entry: &ActivityLogEntry) -> OrchestratorResult<ActivityLogEntry> {
        let mut stored = entry.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.write().map_err(|_| poisoned("活动日志"))?;
        items.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> OrchestratorResult<Vec<ActivityLogEntry>> {
        let items = self.items.read().map_err(|_| poisoned("活动日志"))?;
        Ok(items
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryReleaseConfigRepository {
    items: RwLock<HashMap<i64, ReleaseConfig>>,
}

impl InMemoryReleaseConfigRepository {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// 嵌入模式与测试用：直接放入一条配置
    pub fn insert(&self, config: ReleaseConfig) {
        if let Ok(mut items) = self.items.write() {
            items.insert(config.id, config);
        }
    }
}

#[async_trait]
impl ReleaseConfigRepository for InMemoryReleaseConfigRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<ReleaseConfig>> {
        let items = self.items.read().map_err(|_| poisoned("配置仓储"))?;
        Ok(items.get(&id).cloned())
    }

    async fn list_enabled(&self) -> OrchestratorResult<Vec<ReleaseConfig>> {
        let items = self.items.read().map_err(|_| poisoned("配置仓储"))?;
        let mut configs: Vec<ReleaseConfig> =
            items.values().filter(|c| c.enabled).cloned().collect();
        configs.sort_by_key(|c| c.id);
        Ok(configs)
    }
}

/// 单进程部署用的编排锁；多实例部署应使用 [`crate::RedisReleaseLock`]
#[derive(Default)]
pub struct InMemoryReleaseLock {
    holders: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryReleaseLock {
    pub fn new() -> Self {
        Self {
            holders: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ReleaseLock for InMemoryReleaseLock {
    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> OrchestratorResult<bool> {
        let mut holders = self.holders.write().map_err(|_| poisoned("编排锁"))?;
        let now = Instant::now();
        match holders.get(key) {
            Some((holder, expires_at)) if *expires_at > now && holder != owner => Ok(false),
            _ => {
                holders.insert(key.to_string(), (owner.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> OrchestratorResult<()> {
        let mut holders = self.holders.write().map_err(|_| poisoned("编排锁"))?;
        if let Some((holder, _)) = holders.get(key) {
            if holder == owner {
                holders.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchestrator_domain::{Platform, SemanticVersion, VersionTarget};

    fn release() -> Release {
        Release::new(
            "tenant-1".to_string(),
            1,
            vec![VersionTarget {
                platform: Platform::Android,
                target: "play-store".to_string(),
                version: SemanticVersion::new(1, 0, 0),
            }],
            Utc::now(),
            None,
            Utc::now() + chrono::Duration::days(10),
        )
    }

    #[tokio::test]
    async fn test_release_repository_assigns_ids() {
        let repo = InMemoryReleaseRepository::new();
        let a = repo.create(&release()).await.unwrap();
        let b = repo.create(&release()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(repo.get_by_id(a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_missing_release_fails() {
        let repo = InMemoryReleaseRepository::new();
        let mut r = release();
        r.id = 42;
        assert!(repo.update(&r).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_for_config_returns_newest() {
        let repo = InMemoryReleaseRepository::new();
        repo.create(&release()).await.unwrap();
        let second = repo.create(&release()).await.unwrap();
        let latest = repo.latest_for_config(1).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_lock_mutual_exclusion() {
        let lock = InMemoryReleaseLock::new();
        let ttl = Duration::from_secs(30);

        assert!(lock.try_acquire("release:1", "a", ttl).await.unwrap());
        // 其他持有者拿不到
        assert!(!lock.try_acquire("release:1", "b", ttl).await.unwrap());
        // 同一持有者可以刷新
        assert!(lock.try_acquire("release:1", "a", ttl).await.unwrap());

        // 非持有者的释放是no-op
        lock.release("release:1", "b").await.unwrap();
        assert!(!lock.try_acquire("release:1", "b", ttl).await.unwrap());

        lock.release("release:1", "a").await.unwrap();
        assert!(lock.try_acquire("release:1", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expires_after_ttl() {
        let lock = InMemoryReleaseLock::new();
        assert!(lock
            .try_acquire("release:1", "a", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(lock
            .try_acquire("release:1", "b", Duration::from_secs(30))
            .await
            .unwrap());
    }
}
