//! 基础设施层
//!
//! 仓储与锁的具体实现、配置加载、外部集成的模拟实现。
//! 内存实现用于嵌入模式与测试；多实例部署使用Redis锁。

pub mod config;
pub mod memory;
pub mod redis_lock;
pub mod simulation;

pub use config::{AppConfig, ConfigLoader};
pub use redis_lock::RedisReleaseLock;
