//! 爬虫层
//!
//! 爬虫执行器统一契约、注册中心、重复批次检测和具体的openFDA爬虫实现

pub mod duplicate_detector;
pub mod executor;
pub mod executors;
pub mod registry;
pub mod store;

pub use duplicate_detector::DuplicateDetector;
pub use executor::{CrawlExecutor, CrawlParams};
pub use executors::{MockCrawlExecutor, Us510kExecutor, UsRecallExecutor};
pub use registry::{CrawlerInfo, CrawlerRegistry, RegistryStatistics};
pub use store::{BatchOutcome, HarvestRecord, HarvestStore, InMemoryHarvestStore};
