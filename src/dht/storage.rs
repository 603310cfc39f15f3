use crate::blocks::{Block, BlockType, Query};
use crate::crypto::{Distance, HashCode};
use crate::filter::ResultFilter;
use crate::utils::{AbsoluteTime, Config, StoreBackend};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Block not found")]
    NotFound,

    #[error("Block expired")]
    Expired,
}

/// 存储的块
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtEntry {
    /// 块类型
    pub block_type: u16,

    /// 过期时间
    pub expiration: AbsoluteTime,

    /// 块的线上格式
    pub data: Vec<u8>,

    /// 结果过滤哈希
    pub filter_key: Option<Vec<u8>>,
}

impl DhtEntry {
    pub fn from_block(block: &dyn Block) -> Self {
        Self {
            block_type: block.block_type().0,
            expiration: block.expiration(),
            data: block.to_bytes(),
            filter_key: block.filter_key().map(|h| h.as_bytes().to_vec()),
        }
    }

    pub fn block_type(&self) -> BlockType {
        BlockType(self.block_type)
    }

    /// 检查块是否已过期
    pub fn is_expired(&self) -> bool {
        self.expiration.is_expired()
    }

    pub fn filter_hash(&self) -> Option<HashCode> {
        self.filter_key.as_deref().and_then(HashCode::from_slice)
    }

    /// 查询类型为ANY时接受任何块
    fn matches_type(&self, query: &dyn Query) -> bool {
        query.block_type() == BlockType::ANY || query.block_type() == self.block_type()
    }

    fn filtered_by(&self, filter: &dyn ResultFilter) -> bool {
        match self.filter_hash() {
            Some(hash) => filter.contains_hash(&hash),
            None => false,
        }
    }
}

/// 块存储接口
pub trait BlockStore: Send + Sync {
    /// 以查询键存储块，覆盖同键的旧块
    fn put(&self, query: &dyn Query, entry: DhtEntry) -> Result<(), StoreError>;

    /// 按查询键获取块
    fn get(&self, query: &dyn Query) -> Result<DhtEntry, StoreError>;

    /// 获取与查询键距离最近、且未被排除的块
    fn get_approx(
        &self,
        query: &dyn Query,
        exclude: &dyn Fn(&DhtEntry) -> bool,
    ) -> Result<(DhtEntry, Distance), StoreError>;

    /// 所有键
    fn list(&self) -> Result<Vec<HashCode>, StoreError>;

    /// 刷新并关闭存储
    fn close(&self) -> Result<(), StoreError>;

    /// 清理过期块，返回清理数量
    fn prune_expired(&self) -> Result<usize, StoreError>;

    /// 按查询键获取块，结果过滤器中已有的块视为不存在
    fn get_filtered(&self, query: &dyn Query, filter: &dyn ResultFilter) -> Result<DhtEntry, StoreError> {
        let entry = self.get(query)?;
        if entry.filtered_by(filter) {
            return Err(StoreError::NotFound);
        }
        Ok(entry)
    }
}

/// 在候选集合中挑选距离最近的有效块
fn closest<'a, I>(query: &dyn Query, entries: I, exclude: &dyn Fn(&DhtEntry) -> bool) -> Option<(DhtEntry, Distance)>
where
    I: Iterator<Item = (HashCode, &'a DhtEntry)>,
{
    entries
        .filter(|(_, entry)| !entry.is_expired() && entry.matches_type(query) && !exclude(entry))
        .map(|(key, entry)| (query.key().distance(&key), entry))
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(dist, entry)| (entry.clone(), dist))
}

/// 内存块存储
pub struct MemoryStore {
    data: RwLock<HashMap<HashCode, DhtEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error<T>(_: T) -> StoreError {
    StoreError::StorageError("Lock poisoned".to_string())
}

impl BlockStore for MemoryStore {
    fn put(&self, query: &dyn Query, entry: DhtEntry) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(lock_error)?;
        data.insert(*query.key(), entry);
        Ok(())
    }

    fn get(&self, query: &dyn Query) -> Result<DhtEntry, StoreError> {
        let data = self.data.read().map_err(lock_error)?;

        match data.get(query.key()) {
            Some(entry) if !entry.matches_type(query) => Err(StoreError::NotFound),
            Some(entry) if entry.is_expired() => Err(StoreError::Expired),
            Some(entry) => Ok(entry.clone()),
            None => Err(StoreError::NotFound),
        }
    }

    fn get_approx(
        &self,
        query: &dyn Query,
        exclude: &dyn Fn(&DhtEntry) -> bool,
    ) -> Result<(DhtEntry, Distance), StoreError> {
        let data = self.data.read().map_err(lock_error)?;
        closest(query, data.iter().map(|(k, v)| (*k, v)), exclude).ok_or(StoreError::NotFound)
    }

    fn list(&self) -> Result<Vec<HashCode>, StoreError> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.keys().copied().collect())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn prune_expired(&self) -> Result<usize, StoreError> {
        let mut data = self.data.write().map_err(lock_error)?;
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired());
        Ok(before - data.len())
    }
}

/// 持久化块存储（使用sled数据库）
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(Self { db })
    }

    fn decode(encoded: &[u8]) -> Result<DhtEntry, StoreError> {
        bincode::deserialize(encoded)
            .map_err(|e| StoreError::StorageError(e.to_string()))
    }

    /// 遍历所有可解析的记录，跳过损坏的记录
    fn entries(&self) -> Vec<(HashCode, DhtEntry)> {
        self.db.iter()
            .filter_map(|res| res.ok())
            .filter_map(|(key, encoded)| {
                let key = HashCode::from_slice(&key)?;
                match Self::decode(&encoded) {
                    Ok(entry) => Some((key, entry)),
                    Err(e) => {
                        debug!("Skipping undecodable entry {}: {}", key, e);
                        None
                    }
                }
            })
            .collect()
    }
}

impl BlockStore for SledStore {
    fn put(&self, query: &dyn Query, entry: DhtEntry) -> Result<(), StoreError> {
        let encoded = bincode::serialize(&entry)
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        self.db.insert(query.key().as_bytes(), encoded)
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(())
    }

    fn get(&self, query: &dyn Query) -> Result<DhtEntry, StoreError> {
        let encoded = self.db.get(query.key().as_bytes())
            .map_err(|e| StoreError::StorageError(e.to_string()))?
            .ok_or(StoreError::NotFound)?;

        let entry = Self::decode(&encoded)?;
        if !entry.matches_type(query) {
            return Err(StoreError::NotFound);
        }
        if entry.is_expired() {
            return Err(StoreError::Expired);
        }

        Ok(entry)
    }

    fn get_approx(
        &self,
        query: &dyn Query,
        exclude: &dyn Fn(&DhtEntry) -> bool,
    ) -> Result<(DhtEntry, Distance), StoreError> {
        let entries = self.entries();
        closest(query, entries.iter().map(|(k, v)| (*k, v)), exclude).ok_or(StoreError::NotFound)
    }

    fn list(&self) -> Result<Vec<HashCode>, StoreError> {
        let mut keys = Vec::new();
        for res in self.db.iter() {
            let (key, _) = res.map_err(|e| StoreError::StorageError(e.to_string()))?;
            if let Some(hash) = HashCode::from_slice(&key) {
                keys.push(hash);
            }
        }
        Ok(keys)
    }

    fn close(&self) -> Result<(), StoreError> {
        self.db.flush()
            .map_err(|e| StoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn prune_expired(&self) -> Result<usize, StoreError> {
        let mut expired_count = 0;

        for (key, entry) in self.entries() {
            if entry.is_expired() {
                self.db.remove(key.as_bytes())
                    .map_err(|e| StoreError::StorageError(e.to_string()))?;
                expired_count += 1;
            }
        }

        if expired_count > 0 {
            debug!("Pruned {} expired blocks", expired_count);
        }
        Ok(expired_count)
    }
}

/// 按配置打开块存储
pub fn open_store(config: &Config) -> Result<Box<dyn BlockStore>, StoreError> {
    match config.store {
        StoreBackend::Memory => {
            info!("Using in-memory block store");
            Ok(Box::new(MemoryStore::new()))
        }
        StoreBackend::Sled => {
            let path = config.store_path();
            info!("Opening block store at {}", path.display());
            Ok(Box::new(SledStore::open(path)?))
        }
    }
}
