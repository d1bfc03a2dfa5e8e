//! HTTP API层
//!
//! 暴露发布状态查询与人工操作端点；状态变更逻辑全部在
//! application 层，这里只做请求解析与错误映射。

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};
