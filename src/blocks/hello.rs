use crate::blocks::{Block, BlockError, BlockType};
use crate::crypto::{
    self, purpose_header, HashCode, PeerId, PeerPrivateKey, Signature, SignaturePurpose,
    PEER_ID_SIZE, SIGNATURE_SIZE,
};
use crate::utils::{base32, percent, AbsoluteTime, Address};
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// HELLO URL前缀
pub const HELLO_URL_PREFIX: &str = "gnunet://hello/";

/// 被签名数据的长度: 头部(8) || 过期时间(8) || 地址哈希(64)
pub const HELLO_SIGNED_SIZE: u32 = 80;

/// 线上格式中固定字段的长度
const HELLO_FIXED_SIZE: usize = PEER_ID_SIZE + SIGNATURE_SIZE + 8;

/// HELLO块: 对等节点对自己可达地址的签名广告
///
/// 地址列表是唯一的权威表示，二进制形式按需计算。
#[derive(Clone)]
pub struct HelloBlock {
    peer_id: PeerId,
    signature: Signature,
    expiration: AbsoluteTime,
    addresses: Vec<Address>,
}

impl HelloBlock {
    /// 创建未签名的HELLO块，有效期从当前时间起算
    pub fn new(peer_id: PeerId, addresses: Vec<Address>, ttl: Duration) -> Self {
        Self::with_expiration(peer_id, addresses, AbsoluteTime::now().add(ttl))
    }

    /// 创建未签名的HELLO块
    ///
    /// 过期时间截断到整秒，因为URL形式只携带秒数，而签名覆盖微秒值。
    pub fn with_expiration(peer_id: PeerId, addresses: Vec<Address>, expiration: AbsoluteTime) -> Self {
        Self {
            peer_id,
            signature: Signature::empty(),
            expiration: expiration.truncate_to_secs(),
            addresses,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// 地址的二进制形式: 每个地址的URI以NUL结尾后依次拼接
    pub fn address_binary(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for addr in &self.addresses {
            out.extend_from_slice(addr.uri().as_bytes());
            out.push(0);
        }
        out
    }

    /// 被签名的数据（80字节）
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HELLO_SIGNED_SIZE as usize);
        data.extend_from_slice(&purpose_header(HELLO_SIGNED_SIZE, SignaturePurpose::HELLO));
        data.extend_from_slice(&self.expiration.to_be_bytes());
        data.extend_from_slice(HashCode::of(&self.address_binary()).as_bytes());
        data
    }

    /// 使用对等节点私钥签名
    pub fn sign(&mut self, key: &PeerPrivateKey) -> Result<(), BlockError> {
        if key.peer_id()? != self.peer_id {
            return Err(BlockError::Crypto(crypto::CryptoError::InvalidKey(
                "Private key does not match peer id".to_string(),
            )));
        }
        self.signature = key.sign(&self.signed_data())?;
        Ok(())
    }

    /// 从线上格式解析: 节点ID(32) || 签名(64) || 过期时间(8) || 地址二进制
    pub fn from_bytes(data: &[u8]) -> Result<Self, BlockError> {
        if data.len() < HELLO_FIXED_SIZE {
            return Err(BlockError::Malformed(format!("HELLO block too short: {} bytes", data.len())));
        }
        let peer_id = PeerId::from_slice(&data[..PEER_ID_SIZE])?;
        let signature = Signature::from_slice(&data[PEER_ID_SIZE..PEER_ID_SIZE + SIGNATURE_SIZE])?;

        let mut exp = [0u8; 8];
        exp.copy_from_slice(&data[PEER_ID_SIZE + SIGNATURE_SIZE..HELLO_FIXED_SIZE]);
        let expiration = AbsoluteTime::from_be_bytes(exp);

        let addresses = parse_address_binary(&data[HELLO_FIXED_SIZE..])?;

        Ok(Self { peer_id, signature, expiration, addresses })
    }

    /// URL形式:
    /// `gnunet://hello/<节点ID>/<签名>/<过期秒数>?<方案>=<转义后的地址>&...`
    ///
    /// 没有地址时省略 `?`。
    pub fn url(&self) -> String {
        let mut url = format!(
            "{}{}/{}/{}",
            HELLO_URL_PREFIX,
            base32::encode(self.peer_id.as_bytes()),
            base32::encode(self.signature.as_bytes()),
            self.expiration.epoch_secs(),
        );
        if !self.addresses.is_empty() {
            let addrs: Vec<String> = self.addresses.iter()
                .map(|a| format!("{}={}", a.scheme, percent::escape(&a.authority)))
                .collect();
            url.push('?');
            url.push_str(&addrs.join("&"));
        }
        url
    }

    /// 解析URL形式的HELLO
    ///
    /// `check_expiry` 为真时，过期的块返回 `BlockError::Expired`；否则由调用方自行判断。
    /// 解析不验证签名，见 `Block::verify`。
    pub fn parse_url(url: &str, check_expiry: bool) -> Result<Self, BlockError> {
        let rest = url.strip_prefix(HELLO_URL_PREFIX)
            .ok_or_else(|| BlockError::Malformed(format!("Not a HELLO URL: {}", url)))?;

        let (path, query) = match rest.split_once('?') {
            Some((_, "")) => {
                return Err(BlockError::Malformed("Empty address list after '?'".to_string()));
            }
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != 3 {
            return Err(BlockError::Malformed(format!("Expected 3 path elements, got {}", parts.len())));
        }

        let peer_bytes = base32::decode_exact(parts[0], PEER_ID_SIZE)
            .map_err(|e| BlockError::Malformed(format!("Invalid peer id: {}", e)))?;
        let sig_bytes = base32::decode_exact(parts[1], SIGNATURE_SIZE)
            .map_err(|e| BlockError::Malformed(format!("Invalid signature: {}", e)))?;
        let secs: u64 = parts[2].parse()
            .map_err(|_| BlockError::Malformed(format!("Invalid expiration: {}", parts[2])))?;
        let expiration = AbsoluteTime::from_epoch_secs(secs)
            .ok_or_else(|| BlockError::Malformed(format!("Expiration out of range: {}", secs)))?;

        if check_expiry && expiration.is_expired() {
            return Err(BlockError::Expired);
        }

        let mut addresses = Vec::new();
        if !query.is_empty() {
            for param in query.split('&') {
                let (scheme, value) = param.split_once('=')
                    .ok_or_else(|| BlockError::Malformed(format!("Invalid address parameter: {}", param)))?;
                let authority = percent::unescape(value)
                    .map_err(|e| BlockError::Malformed(format!("Invalid address '{}': {}", value, e)))?;
                let addr = Address::new(scheme, &authority)
                    .map_err(|e| BlockError::Malformed(e.to_string()))?;
                addresses.push(addr);
            }
        }

        Ok(Self {
            peer_id: PeerId::from_slice(&peer_bytes)?,
            signature: Signature::from_slice(&sig_bytes)?,
            expiration,
            addresses,
        })
    }

    /// DHT路由键: 节点ID的SHA-512哈希
    pub fn query_key(&self) -> HashCode {
        HashCode::of(self.peer_id.as_bytes())
    }
}

/// 解析NUL结尾的地址URI序列
fn parse_address_binary(data: &[u8]) -> Result<Vec<Address>, BlockError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.last() != Some(&0) {
        return Err(BlockError::Malformed("Address list not NUL-terminated".to_string()));
    }

    data[..data.len() - 1]
        .split(|b| *b == 0)
        .map(|chunk| {
            let uri = std::str::from_utf8(chunk)
                .map_err(|_| BlockError::Malformed("Address is not valid UTF-8".to_string()))?;
            Address::parse(uri).map_err(|e| BlockError::Malformed(e.to_string()))
        })
        .collect()
}

impl Block for HelloBlock {
    fn block_type(&self) -> BlockType {
        BlockType::DHT_HELLO
    }

    fn to_bytes(&self) -> Vec<u8> {
        let addr_bin = self.address_binary();
        let mut out = Vec::with_capacity(HELLO_FIXED_SIZE + addr_bin.len());
        out.extend_from_slice(self.peer_id.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&addr_bin);
        out
    }

    fn expiration(&self) -> AbsoluteTime {
        self.expiration
    }

    fn verify(&self) -> Result<bool, BlockError> {
        match crypto::verify(&self.peer_id, &self.signed_data(), &self.signature) {
            Ok(valid) => Ok(valid),
            // 签名字节本身不合法
            Err(crypto::CryptoError::InvalidSignature(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 以地址二进制的哈希区分结果
    fn filter_key(&self) -> Option<HashCode> {
        Some(HashCode::of(&self.address_binary()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// 过期时间不参与比较
impl PartialEq for HelloBlock {
    fn eq(&self, other: &Self) -> bool {
        self.peer_id == other.peer_id
            && self.signature == other.signature
            && self.addresses == other.addresses
    }
}

impl Eq for HelloBlock {}

impl fmt::Debug for HelloBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelloBlock")
            .field("peer_id", &self.peer_id)
            .field("signature", &self.signature)
            .field("expiration", &self.expiration)
            .field("addresses", &self.addresses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> Vec<Address> {
        vec![
            Address::parse("ip+udp://1.2.3.4:6789").unwrap(),
            Address::parse("gnunet+tcp://12.3.4.5:1453").unwrap(),
        ]
    }

    fn signed_hello() -> (PeerPrivateKey, HelloBlock) {
        let key = PeerPrivateKey::generate();
        let mut hello = HelloBlock::new(key.peer_id().unwrap(), addrs(), Duration::from_secs(3600));
        hello.sign(&key).unwrap();
        (key, hello)
    }

    #[test]
    fn test_signed_data_layout() {
        let (_, hello) = signed_hello();
        let data = hello.signed_data();
        assert_eq!(data.len(), 80);
        assert_eq!(&data[..8], &[0, 0, 0, 80, 0, 0, 0, 40]);
        assert_eq!(&data[8..16], &hello.expiration.to_be_bytes());
        assert_eq!(&data[16..], HashCode::of(&hello.address_binary()).as_bytes());
    }

    #[test]
    fn test_sign_and_verify() {
        let (_, hello) = signed_hello();
        assert!(hello.verify().unwrap());
        assert_eq!(hello.expiration.as_micros() % 1_000_000, 0);
    }

    #[test]
    fn test_sign_with_wrong_key() {
        let (_, mut hello) = signed_hello();
        let other = PeerPrivateKey::generate();
        assert!(hello.sign(&other).is_err());
    }

    #[test]
    fn test_unsigned_block_does_not_verify() {
        let key = PeerPrivateKey::generate();
        let hello = HelloBlock::new(key.peer_id().unwrap(), addrs(), Duration::from_secs(60));
        assert!(!hello.verify().unwrap_or(false));
    }

    #[test]
    fn test_address_binary() {
        let (_, hello) = signed_hello();
        assert_eq!(hello.address_binary(), b"ip+udp://1.2.3.4:6789\0gnunet+tcp://12.3.4.5:1453\0".to_vec());
    }

    #[test]
    fn test_malformed_bytes() {
        assert!(HelloBlock::from_bytes(&[0u8; 50]).is_err());

        let (_, hello) = signed_hello();
        let mut bytes = hello.to_bytes();
        // 去掉结尾的NUL
        bytes.pop();
        assert!(matches!(HelloBlock::from_bytes(&bytes), Err(BlockError::Malformed(_))));
    }

    #[test]
    fn test_parse_url_errors() {
        assert!(HelloBlock::parse_url("http://hello/a/b/1", false).is_err());
        assert!(HelloBlock::parse_url("gnunet://hello/a/b", false).is_err());

        let (_, hello) = signed_hello();
        let url = hello.url();
        let broken = url.replace("/", "/X");
        assert!(HelloBlock::parse_url(&broken, false).is_err());

        let no_value = format!("{}&ip+udp", url);
        assert!(HelloBlock::parse_url(&no_value, false).is_err());
    }

    #[test]
    fn test_url_without_addresses() {
        let key = PeerPrivateKey::generate();
        let mut hello = HelloBlock::new(key.peer_id().unwrap(), vec![], Duration::from_secs(60));
        hello.sign(&key).unwrap();
        let url = hello.url();
        assert!(!url.contains('?'));
        let parsed = HelloBlock::parse_url(&url, true).unwrap();
        assert!(parsed.addresses().is_empty());
        assert!(parsed.verify().unwrap());
        assert_eq!(parsed.url(), url);

        // 只接受一种写法
        let dangling = format!("{}?", url);
        assert!(matches!(HelloBlock::parse_url(&dangling, true), Err(BlockError::Malformed(_))));
    }

    #[test]
    fn test_url_never_expires() {
        let key = PeerPrivateKey::generate();
        let mut hello = HelloBlock::with_expiration(key.peer_id().unwrap(), addrs(), AbsoluteTime::NEVER);
        hello.sign(&key).unwrap();
        assert!(hello.expiration().is_never());

        let url = hello.url();
        let parsed = HelloBlock::parse_url(&url, true).unwrap();
        assert!(parsed.expiration().is_never());
        assert_eq!(parsed.addresses(), hello.addresses());
        assert!(parsed.verify().unwrap());
        assert_eq!(parsed.url(), url);
    }
}
