//! HTTP API层
//!
//! 任务配置、执行日志和爬虫管理的REST接口

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use response::{ApiResponse, PaginatedResponse};
pub use routes::{create_routes, AppState};
