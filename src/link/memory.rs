//! 内存链接存储
//!
//! 基于 `tokio::sync::RwLock` 的 [`LinkStore`] 实现，由配置文件初始化

use crate::config::Config;
use crate::error::{StoreError, ValidationError};
use crate::link::model::{self, CheckUpdate, LinkId, MonitoredLink, OwnerId, OwnerSettings};
use crate::link::store::LinkStore;
use crate::probe::ProbeResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// 每个链接保留的历史检测结果数量
const MAX_RESULTS_PER_LINK: usize = 100;

/// 内存链接存储
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    /// 链接表
    links: RwLock<HashMap<LinkId, MonitoredLink>>,
    /// 所有者通知设置
    owners: RwLock<HashMap<OwnerId, OwnerSettings>>,
    /// 检测结果历史（按链接，最新在后）
    results: RwLock<HashMap<LinkId, VecDeque<ProbeResult>>>,
}

impl InMemoryLinkStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置初始化链接和所有者设置
    ///
    /// # 参数
    /// * `config` - 已通过校验的配置
    ///
    /// # 返回
    /// * `Result<Self, ValidationError>` - 任一链接无效时返回错误
    pub fn from_config(config: &Config) -> Result<Self, ValidationError> {
        let mut links = HashMap::with_capacity(config.links.len());
        for link_config in &config.links {
            let link = link_config.to_link()?;
            links.insert(link.id, link);
        }

        let owners = config
            .owners
            .iter()
            .map(|owner| (owner.id, owner.to_settings()))
            .collect();

        Ok(Self {
            links: RwLock::new(links),
            owners: RwLock::new(owners),
            results: RwLock::new(HashMap::new()),
        })
    }

    /// 添加或替换链接
    pub async fn insert_link(&self, link: MonitoredLink) {
        self.links.write().await.insert(link.id, link);
    }

    /// 添加或替换所有者设置
    pub async fn insert_owner(&self, settings: OwnerSettings) {
        self.owners.write().await.insert(settings.owner_id, settings);
    }

    /// 按ID获取链接快照
    pub async fn link(&self, link_id: LinkId) -> Option<MonitoredLink> {
        self.links.read().await.get(&link_id).cloned()
    }

    /// 链接数量
    pub async fn link_count(&self) -> usize {
        self.links.read().await.len()
    }

    /// 获取链接的历史检测结果
    pub async fn results_for(&self, link_id: LinkId) -> Vec<ProbeResult> {
        self.results
            .read()
            .await
            .get(&link_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn list_due_links(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MonitoredLink>, StoreError> {
        let mut due: Vec<MonitoredLink> = self
            .links
            .read()
            .await
            .values()
            .filter(|link| link.is_due(now))
            .cloned()
            .collect();

        model::prioritize(&mut due);
        due.truncate(limit);
        Ok(due)
    }

    async fn update_after_check(&self, update: &CheckUpdate) -> Result<(), StoreError> {
        let mut links = self.links.write().await;
        let link = links.get_mut(&update.link_id).ok_or(StoreError::LinkNotFound {
            link_id: update.link_id,
        })?;
        link.apply_update(update);
        Ok(())
    }

    async fn record_result(&self, result: &ProbeResult) -> Result<(), StoreError> {
        let link_id = result
            .link_id
            .ok_or_else(|| StoreError::WriteFailed(format!("检测结果缺少链接ID: {}", result.address)))?;

        let mut results = self.results.write().await;
        let history = results.entry(link_id).or_default();
        if history.len() >= MAX_RESULTS_PER_LINK {
            history.pop_front();
        }
        history.push_back(result.clone());
        Ok(())
    }

    async fn owner_settings(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<OwnerSettings>, StoreError> {
        Ok(self.owners.read().await.get(&owner_id).cloned())
    }
}
