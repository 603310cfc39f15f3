use crate::blocks::{
    Block, BlockError, BlockType, GenericBlock, GnsBlock, HelloBlock, TestBlock,
};
use crate::crypto::HashCode;
use crate::filter::{FilterError, GenericResultFilter, ResultFilter};
use crate::utils::AbsoluteTime;
use log::{debug, warn};
use std::collections::HashMap;

/// 结果过滤的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// 有效结果，可能还有更多
    More,
    /// 有效结果，且是最后一个（查询可以结束）
    Last,
    /// 已经投递过
    Duplicate,
    /// 与查询无关
    Irrelevant,
}

/// 块类型相关的处理逻辑
pub trait BlockHandler: Send + Sync {
    fn block_type(&self) -> BlockType;

    /// 从线上数据解析块
    fn parse_block(&self, data: &[u8]) -> Result<Box<dyn Block>, BlockError>;

    /// 检查查询键和扩展查询数据是否合法
    fn validate_block_query(&self, key: &HashCode, xquery: &[u8]) -> bool;

    /// 检查块是否属于给定的键
    fn validate_block_key(&self, block: &dyn Block, key: &HashCode) -> bool;

    /// 从块内容推导存储键；无法推导时返回 `None`
    fn derive_block_key(&self, block: &dyn Block) -> Option<HashCode>;

    /// 检查块是否可以被存储
    fn validate_block_store_request(&self, block: &dyn Block) -> bool;

    /// 为新的查询创建结果过滤器
    fn setup_result_filter(&self, expected: usize, mutator: u32) -> Box<dyn ResultFilter>;

    /// 从线上数据恢复结果过滤器
    fn parse_result_filter(&self, data: &[u8]) -> Result<Box<dyn ResultFilter>, FilterError>;

    /// 判断块是否应作为查询结果投递；投递的块会被记入过滤器
    fn filter_result(
        &self,
        block: &dyn Block,
        key: &HashCode,
        filter: &mut dyn ResultFilter,
        xquery: &[u8],
    ) -> FilterResult;
}

/// 基于布隆过滤器的去重。过滤器记录过的块判为重复，否则记入过滤器
fn dedup(block: &dyn Block, filter: &mut dyn ResultFilter, fresh: FilterResult) -> FilterResult {
    if filter.contains(block) {
        return FilterResult::Duplicate;
    }
    filter.add(block);
    fresh
}

/// 测试块: 任意数据，不做键检查
#[derive(Debug, Default)]
pub struct TestBlockHandler;

impl BlockHandler for TestBlockHandler {
    fn block_type(&self) -> BlockType {
        BlockType::TEST
    }

    fn parse_block(&self, data: &[u8]) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(TestBlock::new(data.to_vec())))
    }

    fn validate_block_query(&self, _key: &HashCode, _xquery: &[u8]) -> bool {
        true
    }

    fn validate_block_key(&self, _block: &dyn Block, _key: &HashCode) -> bool {
        true
    }

    fn derive_block_key(&self, _block: &dyn Block) -> Option<HashCode> {
        None
    }

    fn validate_block_store_request(&self, _block: &dyn Block) -> bool {
        true
    }

    fn setup_result_filter(&self, expected: usize, mutator: u32) -> Box<dyn ResultFilter> {
        Box::new(GenericResultFilter::new(expected, mutator))
    }

    fn parse_result_filter(&self, data: &[u8]) -> Result<Box<dyn ResultFilter>, FilterError> {
        Ok(Box::new(GenericResultFilter::from_bytes(data)?))
    }

    fn filter_result(
        &self,
        block: &dyn Block,
        _key: &HashCode,
        filter: &mut dyn ResultFilter,
        _xquery: &[u8],
    ) -> FilterResult {
        dedup(block, filter, FilterResult::Last)
    }
}

/// HELLO块: 键是对等节点ID的哈希
#[derive(Debug, Default)]
pub struct HelloBlockHandler;

impl BlockHandler for HelloBlockHandler {
    fn block_type(&self) -> BlockType {
        BlockType::DHT_HELLO
    }

    fn parse_block(&self, data: &[u8]) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(HelloBlock::from_bytes(data)?))
    }

    /// HELLO查询不带扩展数据
    fn validate_block_query(&self, _key: &HashCode, xquery: &[u8]) -> bool {
        if !xquery.is_empty() {
            debug!("HELLO query with {} bytes of xquery rejected", xquery.len());
            return false;
        }
        true
    }

    fn validate_block_key(&self, block: &dyn Block, key: &HashCode) -> bool {
        match self.derive_block_key(block) {
            Some(derived) => &derived == key,
            None => false,
        }
    }

    fn derive_block_key(&self, block: &dyn Block) -> Option<HashCode> {
        block.as_any()
            .downcast_ref::<HelloBlock>()
            .map(|hello| hello.query_key())
    }

    fn validate_block_store_request(&self, block: &dyn Block) -> bool {
        if block.as_any().downcast_ref::<HelloBlock>().is_none() {
            return false;
        }
        if block.expiration().is_expired() {
            debug!("Refusing to store expired HELLO");
            return false;
        }
        match block.verify() {
            Ok(true) => true,
            Ok(false) => {
                warn!("HELLO with invalid signature rejected");
                false
            }
            Err(e) => {
                warn!("HELLO verification failed: {}", e);
                false
            }
        }
    }

    fn setup_result_filter(&self, expected: usize, mutator: u32) -> Box<dyn ResultFilter> {
        Box::new(GenericResultFilter::new(expected, mutator))
    }

    fn parse_result_filter(&self, data: &[u8]) -> Result<Box<dyn ResultFilter>, FilterError> {
        Ok(Box::new(GenericResultFilter::from_bytes(data)?))
    }

    /// 同一对等节点可能有多个不同地址集的HELLO，因此结果总是 `More`
    fn filter_result(
        &self,
        block: &dyn Block,
        _key: &HashCode,
        filter: &mut dyn ResultFilter,
        xquery: &[u8],
    ) -> FilterResult {
        if !xquery.is_empty() {
            return FilterResult::Irrelevant;
        }
        dedup(block, filter, FilterResult::More)
    }
}

/// GNS记录块: 键是派生区域公钥的哈希
#[derive(Debug, Default)]
pub struct GnsBlockHandler;

impl BlockHandler for GnsBlockHandler {
    fn block_type(&self) -> BlockType {
        BlockType::GNS_NAMERECORD
    }

    fn parse_block(&self, data: &[u8]) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(GnsBlock::from_bytes(data)?))
    }

    fn validate_block_query(&self, _key: &HashCode, xquery: &[u8]) -> bool {
        xquery.is_empty()
    }

    fn validate_block_key(&self, block: &dyn Block, key: &HashCode) -> bool {
        match self.derive_block_key(block) {
            Some(derived) => &derived == key,
            None => false,
        }
    }

    fn derive_block_key(&self, block: &dyn Block) -> Option<HashCode> {
        block.as_any()
            .downcast_ref::<GnsBlock>()
            .map(|gns| gns.query_key())
    }

    fn validate_block_store_request(&self, block: &dyn Block) -> bool {
        if block.expiration().is_expired() {
            return false;
        }
        matches!(block.verify(), Ok(true))
    }

    fn setup_result_filter(&self, expected: usize, mutator: u32) -> Box<dyn ResultFilter> {
        Box::new(GenericResultFilter::new(expected, mutator))
    }

    fn parse_result_filter(&self, data: &[u8]) -> Result<Box<dyn ResultFilter>, FilterError> {
        Ok(Box::new(GenericResultFilter::from_bytes(data)?))
    }

    /// 一个标签只有一个有效块
    fn filter_result(
        &self,
        block: &dyn Block,
        _key: &HashCode,
        filter: &mut dyn ResultFilter,
        _xquery: &[u8],
    ) -> FilterResult {
        dedup(block, filter, FilterResult::Last)
    }
}

/// 块处理器注册表
///
/// 启动时构建一次，之后只读共享。
pub struct BlockHandlers {
    handlers: HashMap<BlockType, Box<dyn BlockHandler>>,
}

impl BlockHandlers {
    /// 包含所有内置处理器的注册表
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(TestBlockHandler));
        registry.register(Box::new(HelloBlockHandler));
        registry.register(Box::new(GnsBlockHandler));
        registry
    }

    pub fn empty() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// 注册处理器，替换同类型的已有处理器
    pub fn register(&mut self, handler: Box<dyn BlockHandler>) {
        let block_type = handler.block_type();
        if self.handlers.insert(block_type, handler).is_some() {
            debug!("Replaced handler for {}", block_type);
        }
    }

    pub fn get(&self, block_type: BlockType) -> Option<&dyn BlockHandler> {
        self.handlers.get(&block_type).map(|h| h.as_ref())
    }

    pub fn types(&self) -> Vec<BlockType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// 解析块；没有处理器的类型按无类型数据块处理
    pub fn parse_block(&self, block_type: BlockType, data: &[u8]) -> Result<Box<dyn Block>, BlockError> {
        match self.get(block_type) {
            Some(handler) => handler.parse_block(data),
            None => {
                debug!("No handler for {}, using generic block", block_type);
                Ok(Box::new(GenericBlock::new(block_type, AbsoluteTime::NEVER, data.to_vec())))
            }
        }
    }
}

impl Default for BlockHandlers {
    fn default() -> Self {
        Self::new()
    }
}
