//! 链接存储接口
//!
//! 引擎通过该接口读取到期链接、回写检测状态并持久化检测结果

use crate::error::StoreError;
use crate::link::model::{CheckUpdate, MonitoredLink, OwnerId, OwnerSettings};
use crate::probe::ProbeResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 链接存储trait
///
/// 写入方法的错误会被调度器当作周期错误处理
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// 查询到期的启用链接
    ///
    /// # 参数
    /// * `now` - 当前时间
    /// * `limit` - 最多返回的链接数量
    ///
    /// # 返回
    /// * 按连续失败次数降序、最后检测时间升序排列的链接
    async fn list_due_links(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MonitoredLink>, StoreError>;

    /// 回写单次检测后的链接状态
    async fn update_after_check(&self, update: &CheckUpdate) -> Result<(), StoreError>;

    /// 持久化检测结果
    async fn record_result(&self, result: &ProbeResult) -> Result<(), StoreError>;

    /// 查询所有者的通知设置，不存在时返回 None
    async fn owner_settings(&self, owner_id: OwnerId)
        -> Result<Option<OwnerSettings>, StoreError>;
}
