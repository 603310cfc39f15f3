use crate::blocks::{Block, BlockError, BlockType, Query, RouteFlags};
use crate::crypto::HashCode;
use crate::utils::AbsoluteTime;
use std::any::Any;

/// 没有专门处理逻辑的块类型使用的无类型数据块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericBlock {
    block_type: BlockType,
    expiration: AbsoluteTime,
    data: Vec<u8>,
}

impl GenericBlock {
    pub fn new(block_type: BlockType, expiration: AbsoluteTime, data: Vec<u8>) -> Self {
        Self { block_type, expiration, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Block for GenericBlock {
    fn block_type(&self) -> BlockType {
        self.block_type
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn expiration(&self) -> AbsoluteTime {
        self.expiration
    }

    fn verify(&self) -> Result<bool, BlockError> {
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 测试用数据块: 任意字节，永不过期
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBlock {
    data: Vec<u8>,
}

impl TestBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Block for TestBlock {
    fn block_type(&self) -> BlockType {
        BlockType::TEST
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn expiration(&self) -> AbsoluteTime {
        AbsoluteTime::NEVER
    }

    fn verify(&self) -> Result<bool, BlockError> {
        Ok(true)
    }

    fn filter_key(&self) -> Option<HashCode> {
        Some(HashCode::of(&self.data))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 通用查询: 只有键、类型和路由选项
#[derive(Debug, Clone)]
pub struct GenericQuery {
    key: HashCode,
    block_type: BlockType,
    flags: RouteFlags,
}

impl GenericQuery {
    pub fn new(key: HashCode, block_type: BlockType, flags: RouteFlags) -> Self {
        Self { key, block_type, flags }
    }
}

impl Query for GenericQuery {
    fn key(&self) -> &HashCode {
        &self.key
    }

    fn block_type(&self) -> BlockType {
        self.block_type
    }

    fn flags(&self) -> RouteFlags {
        self.flags
    }

    fn verify(&self, block: &dyn Block) -> Result<(), BlockError> {
        if self.block_type != BlockType::ANY && block.block_type() != self.block_type {
            return Err(BlockError::TypeNotVerified);
        }
        if block.verify()? {
            Ok(())
        } else {
            Err(BlockError::InvalidSignature)
        }
    }

    /// 通用块不加密，直接返回原始数据
    fn decrypt(&self, block: &dyn Block) -> Result<Vec<u8>, BlockError> {
        Ok(block.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_block() {
        let block = GenericBlock::new(BlockType(4711), AbsoluteTime::NEVER, b"blob".to_vec());
        assert_eq!(block.to_bytes(), b"blob");
        assert!(block.verify().unwrap());
        assert!(block.filter_key().is_none());
        assert!(!block.expiration().is_expired());
    }

    #[test]
    fn test_generic_query_type_check() {
        let block = TestBlock::new(b"x".to_vec());
        let key = HashCode::of(b"x");

        let query = GenericQuery::new(key, BlockType::TEST, RouteFlags::NONE);
        assert!(query.verify(&block).is_ok());
        assert_eq!(query.decrypt(&block).unwrap(), b"x");

        let any = GenericQuery::new(key, BlockType::ANY, RouteFlags::NONE);
        assert!(any.verify(&block).is_ok());

        let hello = GenericQuery::new(key, BlockType::DHT_HELLO, RouteFlags::NONE);
        assert!(matches!(hello.verify(&block), Err(BlockError::TypeNotVerified)));
    }
}
