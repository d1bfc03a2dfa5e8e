pub mod activity_log;
pub mod cadence;
pub mod calendar;
pub mod context;
pub mod phase_deriver;
pub mod release_control;
pub mod release_planner;
pub mod scheduler_service;
pub mod status_view;
pub mod task_executor;
pub mod task_sequencer;
pub mod transitions;
pub mod versioning;

pub use activity_log::ActivityLogRecorder;
pub use cadence::CadenceSchedule;
pub use calendar::WorkingCalendar;
pub use context::OrchestrationContext;
pub use phase_deriver::{derive_phase, CycleSnapshot, PhaseInput, PhaseResolution};
pub use release_control::{ActionRequest, ReleaseControlService};
pub use release_planner::{PlanReport, ReleasePlannerService};
pub use scheduler_service::{ReleaseSchedulerService, SchedulerSettings, TickReport};
pub use status_view::{ReleaseStatusService, ReleaseStatusView};
pub use task_executor::{TaskExecutionService, TaskOutcome};
