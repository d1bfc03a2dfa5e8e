//! 测试工具
//!
//! 手写的外部集成mock与实体构造器，供各crate的单元测试和
//! 集成测试复用。存储侧直接使用 infrastructure 的内存仓储。

pub mod builders;
pub mod mocks;

pub use builders::{ReleaseBuilder, ReleaseConfigBuilder, ReleaseTaskBuilder};
pub use mocks::{
    MockCiService, MockMessagingService, MockScmService, MockTestManagementService,
    MockTicketingService,
};
