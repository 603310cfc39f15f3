use crate::blocks::Block;
use crate::crypto::HashCode;
use crate::filter::{filter_size, BloomFilter, FilterCompare, FilterError};
use std::any::Any;
use std::fmt;

/// 结果过滤器: 在一次GET查询的生命周期内记录已投递的结果
///
/// 实例归单个查询所有；跨线程复用时由调用方负责串行化访问。
pub trait ResultFilter: fmt::Debug + Send {
    /// 记录已投递的块
    fn add(&mut self, block: &dyn Block);

    /// 检查块是否已投递过
    fn contains(&self, block: &dyn Block) -> bool;

    /// 直接检查预先计算好的块哈希
    fn contains_hash(&self, hash: &HashCode) -> bool;

    /// 线上格式
    fn to_bytes(&self) -> Vec<u8>;

    fn compare(&self, other: &dyn ResultFilter) -> FilterCompare;

    fn merge(&mut self, other: &dyn ResultFilter) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// 不做任何过滤
#[derive(Debug, Clone, Default)]
pub struct PassResultFilter;

impl PassResultFilter {
    pub fn new() -> Self {
        Self
    }
}

impl ResultFilter for PassResultFilter {
    fn add(&mut self, _block: &dyn Block) {}

    fn contains(&self, _block: &dyn Block) -> bool {
        false
    }

    fn contains_hash(&self, _hash: &HashCode) -> bool {
        false
    }

    fn to_bytes(&self) -> Vec<u8> {
        Vec::new()
    }

    fn compare(&self, other: &dyn ResultFilter) -> FilterCompare {
        if other.as_any().is::<PassResultFilter>() {
            FilterCompare::Same
        } else {
            FilterCompare::Different
        }
    }

    fn merge(&mut self, _other: &dyn ResultFilter) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 基于带变异器的布隆过滤器的结果过滤器
///
/// 只有提供过滤哈希（`Block::filter_key`）的块会被记录，其他块的添加和查询均为空操作。
#[derive(Debug, Clone)]
pub struct GenericResultFilter {
    bf: BloomFilter,
}

impl GenericResultFilter {
    /// 按预期结果数量和32位变异器创建过滤器
    pub fn new(expected: usize, mutator: u32) -> Self {
        let mut bf = BloomFilter::with_size(filter_size(expected));
        bf.set_mutator_u32(mutator);
        Self { bf }
    }

    /// 从线上格式解析: 变异器(4字节) || 位数组
    pub fn from_bytes(data: &[u8]) -> Result<Self, FilterError> {
        let bf = BloomFilter::from_bytes(data, true)?;
        Ok(Self { bf })
    }

    pub fn bloom(&self) -> &BloomFilter {
        &self.bf
    }
}

impl ResultFilter for GenericResultFilter {
    fn add(&mut self, block: &dyn Block) {
        if let Some(hash) = block.filter_key() {
            self.bf.add(hash.as_bytes());
        }
    }

    fn contains(&self, block: &dyn Block) -> bool {
        match block.filter_key() {
            Some(hash) => self.bf.contains(hash.as_bytes()),
            None => false,
        }
    }

    fn contains_hash(&self, hash: &HashCode) -> bool {
        self.bf.contains(hash.as_bytes())
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bf.to_bytes()
    }

    fn compare(&self, other: &dyn ResultFilter) -> FilterCompare {
        match other.as_any().downcast_ref::<GenericResultFilter>() {
            Some(other) => self.bf.compare(&other.bf),
            None => FilterCompare::Different,
        }
    }

    fn merge(&mut self, other: &dyn ResultFilter) -> bool {
        match other.as_any().downcast_ref::<GenericResultFilter>() {
            Some(other) => self.bf.merge(&other.bf),
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
