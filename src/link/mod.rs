//! 监控链接模块
//!
//! 包含链接数据模型、校验、存储接口以及内存存储实现

pub mod memory;
pub mod model;
pub mod store;
pub mod validation;

pub use memory::InMemoryLinkStore;
pub use model::{CheckUpdate, LinkId, MonitoredLink, OwnerId, OwnerSettings};
pub use store::LinkStore;
