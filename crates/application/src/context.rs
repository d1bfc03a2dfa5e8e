//! 编排上下文
//!
//! 聚合服务层需要的全部仓储与外部集成端口，供调度循环、控制服务
//! 与状态查询共享。所有字段都是trait对象，存储与集成实现由宿主注入。

use std::sync::Arc;

use orchestrator_domain::{
    ActivityLogRepository, CiService, MessagingService, RegressionCycleRepository, ReleaseConfigRepository,
    ReleaseLock, ReleaseRepository, ReleaseTaskRepository, ScmService, TestManagementService,
    TicketingService,
};

/// 服务层的依赖集合
#[derive(Clone)]
pub struct OrchestrationContext {
    pub releases: Arc<dyn ReleaseRepository>,
    pub tasks: Arc<dyn ReleaseTaskRepository>,
    pub cycles: Arc<dyn RegressionCycleRepository>,
    pub activity: Arc<dyn ActivityLogRepository>,
    pub configs: Arc<dyn ReleaseConfigRepository>,
    pub lock: Arc<dyn ReleaseLock>,
    pub scm: Arc<dyn ScmService>,
    pub ci: Arc<dyn CiService>,
    pub test_management: Arc<dyn TestManagementService>,
    pub ticketing: Arc<dyn TicketingService>,
    pub messaging: Arc<dyn MessagingService>,
}
