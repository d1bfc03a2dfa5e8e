use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 发布整体状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReleaseStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

/// 单个阶段的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StageStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// 发布的三个顺序阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    #[serde(rename = "KICKOFF")]
    Kickoff,
    #[serde(rename = "REGRESSION")]
    Regression,
    #[serde(rename = "DISTRIBUTION")]
    Distribution,
}

impl Stage {
    pub fn number(&self) -> u8 {
        match self {
            Stage::Kickoff => 1,
            Stage::Regression => 2,
            Stage::Distribution => 3,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Kickoff => Some(Stage::Regression),
            Stage::Regression => Some(Stage::Distribution),
            Stage::Distribution => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Kickoff => write!(f, "kickoff"),
            Stage::Regression => write!(f, "regression"),
            Stage::Distribution => write!(f, "distribution"),
        }
    }
}

/// 定时调度控制状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CronStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// 发布被暂停的原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PauseType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "AWAITING_STAGE_TRIGGER")]
    AwaitingStageTrigger,
    #[serde(rename = "USER_REQUESTED")]
    UserRequested,
    #[serde(rename = "TASK_FAILURE")]
    TaskFailure,
}

/// 编排任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "AWAITING_CALLBACK")]
    AwaitingCallback,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

/// 任务类型，每个类型对应唯一的外部协作方调用
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(rename = "FORK_BRANCH")]
    ForkBranch,
    #[serde(rename = "TRIGGER_BUILD")]
    TriggerBuild,
    #[serde(rename = "CREATE_TEST_RUNS")]
    CreateTestRuns,
    #[serde(rename = "CREATE_TICKETS")]
    CreateTickets,
    #[serde(rename = "NOTIFY_CHANNEL")]
    NotifyChannel,
    #[serde(rename = "CREATE_RELEASE_TAG")]
    CreateReleaseTag,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::ForkBranch => write!(f, "fork_branch"),
            TaskType::TriggerBuild => write!(f, "trigger_build"),
            TaskType::CreateTestRuns => write!(f, "create_test_runs"),
            TaskType::CreateTickets => write!(f, "create_tickets"),
            TaskType::NotifyChannel => write!(f, "notify_channel"),
            TaskType::CreateReleaseTag => write!(f, "create_release_tag"),
        }
    }
}

/// 回归测试周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RegressionCycleStatus {
    #[serde(rename = "NOT_STARTED")]
    NotStarted,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

/// 面向UI的派生阶段，闭合枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    #[serde(rename = "PENDING_KICKOFF")]
    PendingKickoff,
    #[serde(rename = "KICKOFF_IN_PROGRESS")]
    KickoffInProgress,
    #[serde(rename = "AWAITING_REGRESSION_TRIGGER")]
    AwaitingRegressionTrigger,
    #[serde(rename = "REGRESSION_CYCLE_STARTING")]
    RegressionCycleStarting,
    #[serde(rename = "REGRESSION_CYCLE_RUNNING")]
    RegressionCycleRunning,
    #[serde(rename = "REGRESSION_AWAITING_NEXT_CYCLE")]
    RegressionAwaitingNextCycle,
    #[serde(rename = "AWAITING_DISTRIBUTION_TRIGGER")]
    AwaitingDistributionTrigger,
    #[serde(rename = "DISTRIBUTION_IN_PROGRESS")]
    DistributionInProgress,
    #[serde(rename = "PAUSED_BY_USER")]
    PausedByUser,
    #[serde(rename = "PAUSED_BY_FAILURE")]
    PausedByFailure,
    #[serde(rename = "SUBMITTED")]
    Submitted,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::PendingKickoff => "PENDING_KICKOFF",
            Phase::KickoffInProgress => "KICKOFF_IN_PROGRESS",
            Phase::AwaitingRegressionTrigger => "AWAITING_REGRESSION_TRIGGER",
            Phase::RegressionCycleStarting => "REGRESSION_CYCLE_STARTING",
            Phase::RegressionCycleRunning => "REGRESSION_CYCLE_RUNNING",
            Phase::RegressionAwaitingNextCycle => "REGRESSION_AWAITING_NEXT_CYCLE",
            Phase::AwaitingDistributionTrigger => "AWAITING_DISTRIBUTION_TRIGGER",
            Phase::DistributionInProgress => "DISTRIBUTION_IN_PROGRESS",
            Phase::PausedByUser => "PAUSED_BY_USER",
            Phase::PausedByFailure => "PAUSED_BY_FAILURE",
            Phase::Submitted => "SUBMITTED",
            Phase::Completed => "COMPLETED",
            Phase::Archived => "ARCHIVED",
        };
        write!(f, "{s}")
    }
}

/// 用户可执行的发布操作，闭合枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReleaseAction {
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "RESUME")]
    Resume,
    #[serde(rename = "TRIGGER_STAGE_2")]
    TriggerStage2,
    #[serde(rename = "TRIGGER_STAGE_3")]
    TriggerStage3,
    #[serde(rename = "RETRY_TASK")]
    RetryTask,
    #[serde(rename = "SKIP_TASK")]
    SkipTask,
    #[serde(rename = "ABANDON_CYCLE")]
    AbandonCycle,
    #[serde(rename = "SKIP_REMAINING_CYCLES")]
    SkipRemainingCycles,
    #[serde(rename = "ARCHIVE")]
    Archive,
}

impl fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseAction::Start => "START",
            ReleaseAction::Pause => "PAUSE",
            ReleaseAction::Resume => "RESUME",
            ReleaseAction::TriggerStage2 => "TRIGGER_STAGE_2",
            ReleaseAction::TriggerStage3 => "TRIGGER_STAGE_3",
            ReleaseAction::RetryTask => "RETRY_TASK",
            ReleaseAction::SkipTask => "SKIP_TASK",
            ReleaseAction::AbandonCycle => "ABANDON_CYCLE",
            ReleaseAction::SkipRemainingCycles => "SKIP_REMAINING_CYCLES",
            ReleaseAction::Archive => "ARCHIVE",
        };
        write!(f, "{s}")
    }
}

/// 版本升级类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReleaseType {
    #[serde(rename = "MAJOR")]
    Major,
    #[serde(rename = "MINOR")]
    Minor,
    #[serde(rename = "HOTFIX")]
    Hotfix,
}

/// 目标平台
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    #[serde(rename = "ANDROID")]
    Android,
    #[serde(rename = "IOS")]
    Ios,
}

/// 工作日（租户配置使用，避免依赖chrono的序列化行为）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WeekDay {
    #[serde(rename = "MON")]
    Mon,
    #[serde(rename = "TUE")]
    Tue,
    #[serde(rename = "WED")]
    Wed,
    #[serde(rename = "THU")]
    Thu,
    #[serde(rename = "FRI")]
    Fri,
    #[serde(rename = "SAT")]
    Sat,
    #[serde(rename = "SUN")]
    Sun,
}

impl WeekDay {
    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => WeekDay::Mon,
            chrono::Weekday::Tue => WeekDay::Tue,
            chrono::Weekday::Wed => WeekDay::Wed,
            chrono::Weekday::Thu => WeekDay::Thu,
            chrono::Weekday::Fri => WeekDay::Fri,
            chrono::Weekday::Sat => WeekDay::Sat,
            chrono::Weekday::Sun => WeekDay::Sun,
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            WeekDay::Mon => chrono::Weekday::Mon,
            WeekDay::Tue => chrono::Weekday::Tue,
            WeekDay::Wed => chrono::Weekday::Wed,
            WeekDay::Thu => chrono::Weekday::Thu,
            WeekDay::Fri => chrono::Weekday::Fri,
            WeekDay::Sat => chrono::Weekday::Sat,
            WeekDay::Sun => chrono::Weekday::Sun,
        }
    }
}

/// 任务失败的结构化错误分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    #[serde(rename = "configuration")]
    Configuration,
    #[serde(rename = "transient")]
    Transient,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "timeout")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new<S: Into<String>>(kind: TaskErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 瞬时错误允许调度循环自动重试，其余必须人工处理
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, TaskErrorKind::Transient)
    }
}

/// 语义化版本号，只保留 major.minor.patch 三段。
///
/// 解析时预发布与构建元数据会被丢弃（有损，与配置侧约定一致）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "String", try_from = "String")]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> OrchestratorResult<Self> {
        // 去掉预发布("-")和构建("+")后缀
        let core = input
            .split(['-', '+'])
            .next()
            .unwrap_or_default()
            .trim();

        let mut parts = core.split('.');
        let major = Self::parse_segment(input, parts.next())?;
        let minor = Self::parse_segment(input, parts.next())?;
        let patch = Self::parse_segment(input, parts.next())?;
        if parts.next().is_some() {
            return Err(OrchestratorError::InvalidVersion(input.to_string()));
        }

        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    fn parse_segment(input: &str, segment: Option<&str>) -> OrchestratorResult<u64> {
        segment
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| OrchestratorError::InvalidVersion(input.to_string()))
    }

    /// 按发布类型升级版本号
    pub fn bump(&self, release_type: ReleaseType) -> SemanticVersion {
        match release_type {
            ReleaseType::Major => SemanticVersion::new(self.major + 1, 0, 0),
            ReleaseType::Minor => SemanticVersion::new(self.major, self.minor + 1, 0),
            ReleaseType::Hotfix => SemanticVersion::new(self.major, self.minor, self.patch + 1),
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<SemanticVersion> for String {
    fn from(version: SemanticVersion) -> Self {
        version.to_string()
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = OrchestratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
