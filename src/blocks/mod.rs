mod generic;
mod hello;
mod gns;
mod handler;

pub use generic::{GenericBlock, GenericQuery, TestBlock};
pub use hello::{HelloBlock, HELLO_SIGNED_SIZE, HELLO_URL_PREFIX};
pub use gns::{GnsBlock, GnsQuery, GnsVerification, GNS_CONTEXT};
pub use handler::{
    BlockHandler, BlockHandlers, FilterResult,
    GnsBlockHandler, HelloBlockHandler, TestBlockHandler,
};

use crate::crypto::{CryptoError, HashCode};
use crate::utils::AbsoluteTime;
use std::any::Any;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Malformed block: {0}")]
    Malformed(String),

    #[error("Block expired")]
    Expired,

    #[error("Invalid block signature")]
    InvalidSignature,

    #[error("Block type not verified by this query")]
    TypeNotVerified,

    #[error("Block type can't be decrypted by this query")]
    CantDecrypt,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// 块类型
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockType(pub u16);

impl BlockType {
    pub const ANY: BlockType = BlockType(0);
    pub const FS_DBLOCK: BlockType = BlockType(1);
    pub const FS_IBLOCK: BlockType = BlockType(2);
    pub const TEST: BlockType = BlockType(8);
    pub const FS_UBLOCK: BlockType = BlockType(9);
    pub const DNS: BlockType = BlockType(10);
    pub const GNS_NAMERECORD: BlockType = BlockType(11);
    pub const REVOCATION: BlockType = BlockType(12);
    pub const DHT_HELLO: BlockType = BlockType(13);

    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::ANY => "ANY",
            Self::FS_DBLOCK => "FS_DBLOCK",
            Self::FS_IBLOCK => "FS_IBLOCK",
            Self::TEST => "TEST",
            Self::FS_UBLOCK => "FS_UBLOCK",
            Self::DNS => "DNS",
            Self::GNS_NAMERECORD => "GNS_NAMERECORD",
            Self::REVOCATION => "REVOCATION",
            Self::DHT_HELLO => "DHT_HELLO",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "BLOCK_TYPE_{}", self.0),
        }
    }
}

impl fmt::Debug for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockType({})", self)
    }
}

/// DHT路由选项（16位掩码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteFlags(pub u16);

impl RouteFlags {
    pub const NONE: RouteFlags = RouteFlags(0);
    pub const DEMULTIPLEX_EVERYWHERE: RouteFlags = RouteFlags(1);
    pub const RECORD_ROUTE: RouteFlags = RouteFlags(2);
    pub const FIND_APPROXIMATE: RouteFlags = RouteFlags(4);
    pub const BART: RouteFlags = RouteFlags(8);
    pub const LAST_HOP: RouteFlags = RouteFlags(16);

    pub fn contains(&self, other: RouteFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RouteFlags {
    type Output = RouteFlags;

    fn bitor(self, rhs: RouteFlags) -> RouteFlags {
        RouteFlags(self.0 | rhs.0)
    }
}

/// 可存储、可检索的DHT数据块
pub trait Block: fmt::Debug + Send + Sync {
    fn block_type(&self) -> BlockType;

    /// 线上格式
    fn to_bytes(&self) -> Vec<u8>;

    fn expiration(&self) -> AbsoluteTime;

    /// 块内自洽性检查（例如签名）。签名不匹配时返回 `Ok(false)`
    fn verify(&self) -> Result<bool, BlockError>;

    /// 结果过滤器使用的标识哈希；`None` 表示该块不参与过滤
    fn filter_key(&self) -> Option<HashCode> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// 一次查找的描述
pub trait Query: fmt::Debug + Send + Sync {
    /// DHT路由键
    fn key(&self) -> &HashCode;

    fn block_type(&self) -> BlockType;

    fn flags(&self) -> RouteFlags;

    /// 检查块是否是本查询的有效结果
    fn verify(&self, block: &dyn Block) -> Result<(), BlockError>;

    /// 取出块中的有效数据（需要时解密）
    fn decrypt(&self, block: &dyn Block) -> Result<Vec<u8>, BlockError>;
}

/*
 * DHT block and query model
 *
 * Blocks are typed, expirable units of content; queries describe a lookup by
 * key and type. Block-type specific logic (parsing, key derivation, result
 * filtering) lives in handlers collected in a `BlockHandlers` registry that is
 * built once at startup and shared read-only afterwards.
 */
