//! 测试实体构造器
//!
//! 带合理默认值的builder，测试只声明自己关心的字段。

use chrono::{DateTime, Duration, Utc};

use orchestrator_domain::{
    BuildUploadMode, IntegrationSettings, Platform, RegressionSlot, Release, ReleaseConfig,
    ReleaseTask, ReleaseType, ScheduleSettings, SemanticVersion, Stage, TaskType, VersionTarget,
    WeekDay,
};

pub struct ReleaseBuilder {
    tenant_id: String,
    config_id: i64,
    version: SemanticVersion,
    platform: Platform,
    kickoff_at: DateTime<Utc>,
    kickoff_reminder_at: Option<DateTime<Utc>>,
    target_release_at: DateTime<Utc>,
}

impl ReleaseBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            tenant_id: "tenant-1".to_string(),
            config_id: 1,
            version: SemanticVersion::new(1, 2, 0),
            platform: Platform::Android,
            kickoff_at: now,
            kickoff_reminder_at: None,
            target_release_at: now + Duration::days(10),
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: &str) -> Self {
        self.tenant_id = tenant_id.to_string();
        self
    }

    pub fn with_config_id(mut self, config_id: i64) -> Self {
        self.config_id = config_id;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.parse().expect("builder version must be valid");
        self
    }

    pub fn with_kickoff_at(mut self, at: DateTime<Utc>) -> Self {
        self.kickoff_at = at;
        self
    }

    pub fn with_reminder_at(mut self, at: DateTime<Utc>) -> Self {
        self.kickoff_reminder_at = Some(at);
        self
    }

    pub fn with_target_release_at(mut self, at: DateTime<Utc>) -> Self {
        self.target_release_at = at;
        self
    }

    pub fn build(self) -> Release {
        Release::new(
            self.tenant_id,
            self.config_id,
            vec![VersionTarget {
                platform: self.platform,
                target: match self.platform {
                    Platform::Android => "play-store".to_string(),
                    Platform::Ios => "app-store".to_string(),
                },
                version: self.version,
            }],
            self.kickoff_at,
            self.kickoff_reminder_at,
            self.target_release_at,
        )
    }
}

impl Default for ReleaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReleaseTaskBuilder {
    release_id: i64,
    stage: Stage,
    task_type: TaskType,
    name: String,
    sequence: i32,
    dependencies: Vec<i64>,
    optional: bool,
    parameters: serde_json::Value,
}

impl ReleaseTaskBuilder {
    pub fn new(release_id: i64, stage: Stage, task_type: TaskType) -> Self {
        Self {
            release_id,
            stage,
            task_type,
            name: format!("{task_type}"),
            sequence: 1,
            dependencies: vec![],
            optional: false,
            parameters: serde_json::json!({}),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<i64>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn build(self) -> ReleaseTask {
        ReleaseTask::new(
            self.release_id,
            self.stage,
            self.task_type,
            self.name,
            self.sequence,
            self.dependencies,
            self.optional,
            self.parameters,
        )
    }
}

pub struct ReleaseConfigBuilder {
    config: ReleaseConfig,
}

impl ReleaseConfigBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            config: ReleaseConfig {
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
                    regression_slots: vec![
                        RegressionSlot {
                            offset_days: 2,
                            start_time: "10:00".to_string(),
                        },
                        RegressionSlot {
                            offset_days: 5,
                            start_time: "10:00".to_string(),
                        },
                    ],
                    utc_offset_minutes: 0,
                    require_stage2_trigger: false,
                    require_stage3_trigger: false,
                },
                integrations: IntegrationSettings {
                    scm_repo: Some("org/app".to_string()),
                    base_branch: Some("main".to_string()),
                    ci_workflow: Some("rc-build".to_string()),
                    ci_release_workflow: Some("release-build".to_string()),
                    test_management_config: None,
                    ticketing_config: None,
                    messaging_config: Some("chat-1".to_string()),
                },
                enabled: true,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.config.id = id;
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: &str) -> Self {
        self.config.tenant_id = tenant_id.to_string();
        self
    }

    pub fn with_release_type(mut self, release_type: ReleaseType) -> Self {
        self.config.release_type = release_type;
        self
    }

    pub fn with_initial_version(mut self, version: &str) -> Self {
        self.config.initial_version = version.parse().expect("builder version must be valid");
        self
    }

    pub fn with_build_upload_mode(mut self, mode: BuildUploadMode) -> Self {
        self.config.build_upload_mode = mode;
        self
    }

    pub fn without_scm(mut self) -> Self {
        self.config.integrations.scm_repo = None;
        self.config.integrations.base_branch = None;
        self
    }

    pub fn without_messaging(mut self) -> Self {
        self.config.integrations.messaging_config = None;
        self
    }

    pub fn with_ci_workflow(mut self, workflow: Option<&str>) -> Self {
        self.config.integrations.ci_workflow = workflow.map(str::to_string);
        self
    }

    pub fn with_ci_release_workflow(mut self, workflow: Option<&str>) -> Self {
        self.config.integrations.ci_release_workflow = workflow.map(str::to_string);
        self
    }

    pub fn with_test_management(mut self, config_ref: Option<&str>) -> Self {
        self.config.integrations.test_management_config = config_ref.map(str::to_string);
        self
    }

    pub fn with_ticketing(mut self, config_ref: Option<&str>) -> Self {
        self.config.integrations.ticketing_config = config_ref.map(str::to_string);
        self
    }

    /// 生成n个回归测试时段，偏移为kickoff后2、4、6…个工作日
    pub fn with_regression_slots(mut self, count: usize) -> Self {
        self.config.schedule.regression_slots = (0..count)
            .map(|i| RegressionSlot {
                offset_days: (i as u32) * 2 + 2,
                start_time: "10:00".to_string(),
            })
            .collect();
        self
    }

    pub fn with_no_regression_slots(mut self) -> Self {
        self.config.schedule.regression_slots.clear();
        self
    }

    pub fn with_stage2_trigger(mut self, required: bool) -> Self {
        self.config.schedule.require_stage2_trigger = required;
        self
    }

    pub fn with_stage3_trigger(mut self, required: bool) -> Self {
        self.config.schedule.require_stage3_trigger = required;
        self
    }

    pub fn build(self) -> ReleaseConfig {
        self.config
    }
}

impl Default for ReleaseConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
