use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::value_objects::{
    CronStatus, PauseType, Platform, RegressionCycleStatus, ReleaseStatus, ReleaseType,
    SemanticVersion, Stage, StageStatus, TaskError, TaskStatus, TaskType, WeekDay,
};

/// 定时调度控制块，内嵌在发布实体中。
///
/// 不变式: `pause_type != NONE` 当且仅当 `status == PAUSED`。
/// 所有状态变更都必须通过 `pause`/`resume` 以保持该不变式。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CronControl {
    pub status: CronStatus,
    pub pause_type: PauseType,
}

impl CronControl {
    pub fn new() -> Self {
        Self {
            status: CronStatus::Pending,
            pause_type: PauseType::None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, CronStatus::Running)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.status, CronStatus::Paused)
    }

    pub fn pause(&mut self, pause_type: PauseType) -> OrchestratorResult<()> {
        if pause_type == PauseType::None {
            return Err(OrchestratorError::invalid_state(
                "暂停必须携带非NONE的暂停原因",
            ));
        }
        self.status = CronStatus::Paused;
        self.pause_type = pause_type;
        Ok(())
    }

    pub fn resume(&mut self) {
        self.status = CronStatus::Running;
        self.pause_type = PauseType::None;
    }

    pub fn complete(&mut self) {
        self.status = CronStatus::Completed;
        self.pause_type = PauseType::None;
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        let paused = matches!(self.status, CronStatus::Paused);
        let has_reason = self.pause_type != PauseType::None;
        if paused != has_reason {
            return Err(OrchestratorError::invalid_state(format!(
                "cron控制块不一致: status={:?}, pause_type={:?}",
                self.status, self.pause_type
            )));
        }
        Ok(())
    }
}

impl Default for CronControl {
    fn default() -> Self {
        Self::new()
    }
}

/// 平台-目标对的目标版本
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionTarget {
    pub platform: Platform,
    pub target: String,
    pub version: SemanticVersion,
}

/// 一次版本发布周期（单租户单应用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub tenant_id: String,
    pub config_id: i64,
    pub version_targets: Vec<VersionTarget>,
    pub status: ReleaseStatus,
    pub stage1_status: StageStatus,
    pub stage2_status: StageStatus,
    pub stage3_status: StageStatus,
    pub cron: CronControl,
    pub kickoff_at: DateTime<Utc>,
    pub kickoff_reminder_at: Option<DateTime<Utc>>,
    /// 提醒只发送一次，重启后不重发
    pub reminder_sent: bool,
    pub target_release_at: DateTime<Utc>,
    /// SKIP_REMAINING_CYCLES 后不再创建新的回归测试周期
    pub skip_remaining_cycles: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    pub fn new(
        tenant_id: String,
        config_id: i64,
        version_targets: Vec<VersionTarget>,
        kickoff_at: DateTime<Utc>,
        kickoff_reminder_at: Option<DateTime<Utc>>,
        target_release_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 由存储层分配
            tenant_id,
            config_id,
            version_targets,
            status: ReleaseStatus::Pending,
            stage1_status: StageStatus::Pending,
            stage2_status: StageStatus::Pending,
            stage3_status: StageStatus::Pending,
            cron: CronControl::new(),
            kickoff_at,
            kickoff_reminder_at,
            reminder_sent: false,
            target_release_at,
            skip_remaining_cycles: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Kickoff => self.stage1_status,
            Stage::Regression => self.stage2_status,
            Stage::Distribution => self.stage3_status,
        }
    }

    pub fn set_stage_status(&mut self, stage: Stage, status: StageStatus, now: DateTime<Utc>) {
        match stage {
            Stage::Kickoff => self.stage1_status = status,
            Stage::Regression => self.stage2_status = status,
            Stage::Distribution => self.stage3_status = status,
        }
        self.touch(now);
    }

    /// 当前处于 IN_PROGRESS 的阶段
    pub fn current_stage(&self) -> Option<Stage> {
        [Stage::Kickoff, Stage::Regression, Stage::Distribution]
            .into_iter()
            .find(|stage| self.stage_status(*stage) == StageStatus::InProgress)
    }

    /// 调度循环是否还需要关注此发布
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.status,
            ReleaseStatus::Pending
                | ReleaseStatus::InProgress
                | ReleaseStatus::Paused
                | ReleaseStatus::Submitted
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ReleaseStatus::Completed | ReleaseStatus::Archived
        )
    }

    pub fn pause(&mut self, pause_type: PauseType, now: DateTime<Utc>) -> OrchestratorResult<()> {
        self.cron.pause(pause_type)?;
        self.status = ReleaseStatus::Paused;
        self.touch(now);
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.cron.resume();
        self.status = ReleaseStatus::InProgress;
        self.touch(now);
    }

    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.status = ReleaseStatus::Archived;
        self.cron.complete();
        self.touch(now);
    }

    /// 时间戳一律由调用方注入，发布的持久化时间线跟随调度逻辑时钟
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// 校验持久化状态的不变式；派生阶段前必须先通过校验。
    pub fn validate_invariants(&self) -> OrchestratorResult<()> {
        self.cron.validate()?;

        if matches!(self.status, ReleaseStatus::Paused) && !self.cron.is_paused() {
            return Err(OrchestratorError::invalid_state(format!(
                "发布 {} 状态为PAUSED但cron状态为{:?}",
                self.id, self.cron.status
            )));
        }

        if matches!(
            self.status,
            ReleaseStatus::Submitted | ReleaseStatus::Completed
        ) {
            let all_completed = self.stage1_status == StageStatus::Completed
                && self.stage2_status == StageStatus::Completed
                && self.stage3_status == StageStatus::Completed;
            if !all_completed {
                return Err(OrchestratorError::invalid_state(format!(
                    "发布 {} 状态为{:?}但存在未完成的阶段",
                    self.id, self.status
                )));
            }
        }

        Ok(())
    }

    pub fn entity_description(&self) -> String {
        let versions: Vec<String> = self
            .version_targets
            .iter()
            .map(|t| format!("{:?}:{}", t.platform, t.version))
            .collect();
        format!(
            "发布 (ID: {}, 租户: {}, 版本: [{}])",
            self.id,
            self.tenant_id,
            versions.join(", ")
        )
    }
}

/// 阶段内的一个编排任务单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTask {
    pub id: i64,
    pub release_id: i64,
    pub stage: Stage,
    pub task_type: TaskType,
    pub name: String,
    /// 同时可调度时按声明序号稳定排序，保证可重放
    pub sequence: i32,
    pub dependencies: Vec<i64>,
    pub optional: bool,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub parameters: serde_json::Value,
    /// 派发后的外部关联ID（如CI run id）
    pub external_ref: Option<String>,
    pub external_data: serde_json::Value,
    pub error: Option<TaskError>,
    pub dispatched_at: Option<DateTime<Utc>>,
    /// 瞬时失败重试的退避时间点，早于该时间不会再次派发
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReleaseTask {
    pub fn new(
        release_id: i64,
        stage: Stage,
        task_type: TaskType,
        name: String,
        sequence: i32,
        dependencies: Vec<i64>,
        optional: bool,
        parameters: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 由存储层分配
            release_id,
            stage,
            task_type,
            name,
            sequence,
            dependencies,
            optional,
            status: TaskStatus::Pending,
            retry_count: 0,
            parameters,
            external_ref: None,
            external_data: serde_json::Value::Null,
            error: None,
            dispatched_at: None,
            next_attempt_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// COMPLETED 或 SKIPPED 的任务满足依赖并计入阶段完成
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Skipped)
    }

    pub fn is_awaiting_callback(&self) -> bool {
        matches!(self.status, TaskStatus::AwaitingCallback)
    }

    /// 派发时间戳取调度循环的逻辑时钟，回调超时判定依赖它
    pub fn mark_dispatched(
        &mut self,
        status: TaskStatus,
        external_ref: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.external_ref = external_ref;
        if self.dispatched_at.is_none() {
            self.dispatched_at = Some(now);
        }
        if matches!(self.status, TaskStatus::Completed) {
            self.completed_at = Some(now);
        }
        self.touch(now);
    }

    pub fn complete(&mut self, external_data: serde_json::Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.external_data = external_data;
        self.error = None;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.touch(now);
    }

    pub fn fail(&mut self, error: TaskError, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.touch(now);
    }

    pub fn skip(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Skipped;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.touch(now);
    }

    /// FAILED → PENDING，重试计数加一（人工重试与调度循环瞬时重试共用）
    pub fn reset_for_retry(&mut self, next_attempt_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.retry_count += 1;
        self.error = None;
        self.external_ref = None;
        self.dispatched_at = None;
        self.completed_at = None;
        self.next_attempt_at = next_attempt_at;
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 发布: {}, 类型: {})",
            self.name, self.id, self.release_id, self.task_type
        )
    }
}

/// 阶段2内的一次回归测试迭代
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionCycle {
    pub id: i64,
    pub release_id: i64,
    pub sequence: i32,
    /// 展示用标签，如 "RC1"
    pub tag: String,
    pub status: RegressionCycleStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RegressionCycle {
    pub fn new(release_id: i64, sequence: i32, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            release_id,
            sequence,
            tag: format!("RC{sequence}"),
            status: RegressionCycleStatus::NotStarted,
            scheduled_at,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = RegressionCycleStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.status = RegressionCycleStatus::Done;
        if self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) {
        self.status = RegressionCycleStatus::Abandoned;
        if self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RegressionCycleStatus::Done | RegressionCycleStatus::Abandoned
        )
    }
}

/// 回归测试时段定义（相对kickoff的工作日偏移）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegressionSlot {
    pub offset_days: u32,
    /// "HH:MM"
    pub start_time: String,
}

/// 构建产物上传方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuildUploadMode {
    #[serde(rename = "CI_PIPELINE")]
    CiPipeline,
    #[serde(rename = "MANUAL")]
    Manual,
}

/// 调度节奏与日期偏移配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// 发布节奏的cron表达式（kickoff候选时刻）
    pub cadence_cron: String,
    pub working_days: Vec<WeekDay>,
    /// "HH:MM"，租户时区内的kickoff时刻
    pub kickoff_time: String,
    /// "HH:MM"，租户时区内的目标发布时刻
    pub release_time: String,
    /// kickoff前N个工作日发送提醒；0表示不提醒
    pub kickoff_reminder_offset_days: u32,
    /// kickoff后N个工作日为目标发布日
    pub target_release_offset_days: u32,
    pub regression_slots: Vec<RegressionSlot>,
    /// 租户时区相对UTC的偏移（分钟）
    pub utc_offset_minutes: i32,
    /// 阶段1完成后是否等待人工触发阶段2
    pub require_stage2_trigger: bool,
    /// 阶段2完成后是否等待人工触发阶段3
    pub require_stage3_trigger: bool,
}

/// 可选集成的配置引用；缺失即视为该集成未启用
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntegrationSettings {
    pub scm_repo: Option<String>,
    pub base_branch: Option<String>,
    pub ci_workflow: Option<String>,
    pub ci_release_workflow: Option<String>,
    pub test_management_config: Option<String>,
    pub ticketing_config: Option<String>,
    pub messaging_config: Option<String>,
}

/// 租户定义的发布模板，编排引擎的只读输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub platforms: Vec<Platform>,
    pub release_type: ReleaseType,
    pub initial_version: SemanticVersion,
    pub build_upload_mode: BuildUploadMode,
    pub schedule: ScheduleSettings,
    pub integrations: IntegrationSettings,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReleaseConfig {
    /// 防御性校验：即使UI侧已校验，引擎在排期前也会再次拒绝非法配置
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.platforms.is_empty() {
            return Err(OrchestratorError::config_error(format!(
                "发布配置 {} 未启用任何平台",
                self.id
            )));
        }
        if self.schedule.working_days.is_empty() {
            return Err(OrchestratorError::config_error(format!(
                "发布配置 {} 未设置工作日",
                self.id
            )));
        }

        parse_time_of_day(&self.schedule.kickoff_time)?;
        parse_time_of_day(&self.schedule.release_time)?;

        for slot in &self.schedule.regression_slots {
            parse_time_of_day(&slot.start_time)?;
            if slot.offset_days > self.schedule.target_release_offset_days {
                return Err(OrchestratorError::config_error(format!(
                    "发布配置 {} 的回归测试时段偏移 {} 超过目标发布偏移 {}",
                    self.id, slot.offset_days, self.schedule.target_release_offset_days
                )));
            }
        }

        Ok(())
    }
}

/// 解析"HH:MM"格式的时刻配置
pub fn parse_time_of_day(value: &str) -> OrchestratorResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| OrchestratorError::config_error(format!("无效的时刻配置 '{value}': {e}")))
}

/// 活动日志涉及的实体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    #[serde(rename = "RELEASE")]
    Release,
    #[serde(rename = "TASK")]
    Task,
    #[serde(rename = "REGRESSION_CYCLE")]
    RegressionCycle,
}

/// 状态变更的执行者
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id")]
pub enum Actor {
    #[serde(rename = "SCHEDULER")]
    Scheduler,
    #[serde(rename = "USER")]
    User(String),
}

/// 只追加的审计记录，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub tenant_id: String,
    /// 变更的类型标识，如 "release.status"、"task.status"
    pub transition: String,
    pub previous_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity_type: EntityType,
        entity_id: i64,
        tenant_id: String,
        transition: String,
        previous_value: serde_json::Value,
        new_value: serde_json::Value,
        actor: Actor,
    ) -> Self {
        Self {
            id: 0,
            entity_type,
            entity_id,
            tenant_id,
            transition,
            previous_value,
            new_value,
            actor,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::TaskErrorKind;
    use chrono::TimeZone;

    fn sample_release() -> Release {
        Release::new(
            "tenant-1".to_string(),
            1,
            vec![VersionTarget {
                platform: Platform::Android,
                target: "play-store".to_string(),
                version: SemanticVersion::new(1, 2, 0),
            }],
            Utc::now(),
            None,
            Utc::now() + chrono::Duration::days(10),
        )
    }

    #[test]
    fn test_cron_control_pause_requires_reason() {
        let mut cron = CronControl::new();
        assert!(cron.pause(PauseType::None).is_err());
        cron.pause(PauseType::UserRequested).unwrap();
        assert!(cron.is_paused());
        assert_eq!(cron.pause_type, PauseType::UserRequested);
        cron.resume();
        assert!(cron.is_running());
        assert_eq!(cron.pause_type, PauseType::None);
    }

    #[test]
    fn test_cron_control_invariant_validation() {
        let inconsistent = CronControl {
            status: CronStatus::Running,
            pause_type: PauseType::TaskFailure,
        };
        assert!(inconsistent.validate().is_err());

        let inconsistent = CronControl {
            status: CronStatus::Paused,
            pause_type: PauseType::None,
        };
        assert!(inconsistent.validate().is_err());

        assert!(CronControl::new().validate().is_ok());
    }

    #[test]
    fn test_release_submitted_requires_all_stages_completed() {
        let mut release = sample_release();
        release.status = ReleaseStatus::Submitted;
        assert!(release.validate_invariants().is_err());

        release.stage1_status = StageStatus::Completed;
        release.stage2_status = StageStatus::Completed;
        release.stage3_status = StageStatus::Completed;
        assert!(release.validate_invariants().is_ok());
    }

    #[test]
    fn test_release_pause_resume_keeps_invariant() {
        let mut release = sample_release();
        release.status = ReleaseStatus::InProgress;
        release.cron.resume();

        release.pause(PauseType::TaskFailure, Utc::now()).unwrap();
        assert_eq!(release.status, ReleaseStatus::Paused);
        assert!(release.validate_invariants().is_ok());

        release.resume(Utc::now());
        assert_eq!(release.status, ReleaseStatus::InProgress);
        assert!(release.validate_invariants().is_ok());
    }

    #[test]
    fn test_current_stage_tracks_in_progress() {
        let mut release = sample_release();
        assert_eq!(release.current_stage(), None);

        release.set_stage_status(Stage::Kickoff, StageStatus::InProgress, Utc::now());
        assert_eq!(release.current_stage(), Some(Stage::Kickoff));

        release.set_stage_status(Stage::Kickoff, StageStatus::Completed, Utc::now());
        release.set_stage_status(Stage::Regression, StageStatus::InProgress, Utc::now());
        assert_eq!(release.current_stage(), Some(Stage::Regression));
    }

    #[test]
    fn test_task_retry_resets_execution_state() {
        let mut task = ReleaseTask::new(
            1,
            Stage::Kickoff,
            TaskType::TriggerBuild,
            "构建RC包".to_string(),
            1,
            vec![],
            false,
            serde_json::json!({}),
        );
        task.mark_dispatched(TaskStatus::AwaitingCallback, Some("run-1".to_string()), Utc::now());
        task.fail(TaskError::new(TaskErrorKind::Transient, "network"), Utc::now());
        assert!(task.is_terminal());

        task.reset_for_retry(None, Utc::now());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.error.is_none());
        assert!(task.external_ref.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_regression_cycle_lifecycle() {
        let mut cycle = RegressionCycle::new(1, 1, Utc::now());
        assert_eq!(cycle.tag, "RC1");
        assert!(!cycle.is_terminal());

        cycle.start(Utc::now());
        assert_eq!(cycle.status, RegressionCycleStatus::InProgress);

        cycle.finish(Utc::now());
        assert_eq!(cycle.status, RegressionCycleStatus::Done);
        assert!(cycle.is_terminal());
    }

    #[test]
    fn test_task_timestamps_follow_injected_clock() {
        // 模拟/回放时间下，派发与完成时间必须来自注入的时钟而非墙上时钟
        let logical_now = Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).single().unwrap();
        let mut task = ReleaseTask::new(
            1,
            Stage::Kickoff,
            TaskType::CreateTestRuns,
            "创建回归测试批次".to_string(),
            1,
            vec![],
            false,
            serde_json::json!({}),
        );

        task.mark_dispatched(TaskStatus::AwaitingCallback, Some("run-9".to_string()), logical_now);
        assert_eq!(task.dispatched_at, Some(logical_now));
        assert_eq!(task.updated_at, logical_now);

        let later = logical_now + chrono::Duration::hours(1);
        task.complete(serde_json::Value::Null, later);
        assert_eq!(task.completed_at, Some(later));
        assert_eq!(task.updated_at, later);
    }

    #[test]
    fn test_release_config_rejects_slot_beyond_target() {
        let mut config = test_config();
        config.schedule.regression_slots = vec![RegressionSlot {
            offset_days: 15,
            start_time: "10:00".to_string(),
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_release_config_rejects_bad_time_of_day() {
        let mut config = test_config();
        config.schedule.kickoff_time = "25:99".to_string();
        assert!(config.validate().is_err());
    }

    fn test_config() -> ReleaseConfig {
        ReleaseConfig {
            id: 1,
            tenant_id: "tenant-1".to_string(),
            name: "weekly-train".to_string(),
            platforms: vec![Platform::Android],
            release_type: ReleaseType::Minor,
            initial_version: SemanticVersion::new(1, 0, 0),
            build_upload_mode: BuildUploadMode::CiPipeline,
            schedule: ScheduleSettings {
                cadence_cron: "0 0 9 * * Mon".to_string(),
                working_days: vec![
                    WeekDay::Mon,
                    WeekDay::Tue,
                    WeekDay::Wed,
                    WeekDay::Thu,
                    WeekDay::Fri,
                ],
                kickoff_time: "09:00".to_string(),
                release_time: "17:00".to_string(),
                kickoff_reminder_offset_days: 1,
                target_release_offset_days: 10,
                regression_slots: vec![RegressionSlot {
                    offset_days: 2,
                    start_time: "10:00".to_string(),
                }],
                utc_offset_minutes: 0,
                require_stage2_trigger: false,
                require_stage3_trigger: true,
            },
            integrations: IntegrationSettings {
                scm_repo: Some("org/app".to_string()),
                base_branch: Some("main".to_string()),
                ci_workflow: Some("rc-build".to_string()),
                ci_release_workflow: Some("release-build".to_string()),
                test_management_config: Some("tm-1".to_string()),
                ticketing_config: None,
                messaging_config: Some("chat-1".to_string()),
            },
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
