use crate::blocks::{Block, BlockError, BlockType, Query, RouteFlags};
use crate::crypto::{
    self, decrypt_block, encrypt_block, purpose_header, HashCode, Signature, SignaturePurpose,
    ZoneKey, ZonePrivate, ZoneSignature,
};
use crate::gns::RecordSet;
use crate::utils::AbsoluteTime;
use std::any::Any;
use std::fmt;

/// 派生GNS查询密钥所用的上下文字符串
pub const GNS_CONTEXT: &str = "gns";

/// 被签名部分中位于密文之前的固定长度: 用途头(8) || 过期时间(8)
const SIGNED_HEADER_SIZE: usize = 16;

/// GNS记录块
///
/// 线上格式: 派生公钥 || 签名 || 用途头 || 过期时间 || 密文。
/// 签名覆盖用途头、过期时间和密文，由标签派生的私钥生成；
/// 密文只有知道区域公钥和标签的一方才能解开。
#[derive(Clone, PartialEq, Eq)]
pub struct GnsBlock {
    derived_key_sig: ZoneSignature,
    expiration: AbsoluteTime,
    data: Vec<u8>,
}

impl GnsBlock {
    /// 加密并签名一段记录数据
    pub fn publish(
        zone: &ZonePrivate,
        label: &str,
        expiration: AbsoluteTime,
        plaintext: &[u8],
    ) -> Result<Self, BlockError> {
        let zone_key = zone.public()?;
        let data = encrypt_block(&zone_key, label, expiration, plaintext)?;
        let derived = zone.derive(label, GNS_CONTEXT)?;

        let mut block = Self {
            derived_key_sig: ZoneSignature {
                key: *derived.public(),
                signature: Signature::empty(),
            },
            expiration,
            data,
        };
        block.derived_key_sig.signature = derived.sign(&block.signed_data())?;
        Ok(block)
    }

    /// 发布记录集，私有记录不会被发布
    ///
    /// 块的过期时间取自最早过期的记录。
    pub fn publish_records(zone: &ZonePrivate, label: &str, records: &RecordSet) -> Result<Self, BlockError> {
        let public = records.public_records();
        let plaintext = public.to_bytes()
            .map_err(|e| BlockError::Malformed(e.to_string()))?;
        Self::publish(zone, label, public.expiration(), &plaintext)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, BlockError> {
        if data.len() < ZoneSignature::SIZE + SIGNED_HEADER_SIZE {
            return Err(BlockError::Malformed(format!("GNS block too short: {} bytes", data.len())));
        }

        let derived_key_sig = ZoneSignature::from_bytes(&data[..ZoneSignature::SIZE])?;
        let signed = &data[ZoneSignature::SIZE..];

        let size = u32::from_be_bytes([signed[0], signed[1], signed[2], signed[3]]) as usize;
        let purpose = u32::from_be_bytes([signed[4], signed[5], signed[6], signed[7]]);
        if size != signed.len() {
            return Err(BlockError::Malformed(format!(
                "GNS block size mismatch: header says {}, have {}", size, signed.len()
            )));
        }
        if purpose != SignaturePurpose::GNS_RECORD_SIGN {
            return Err(BlockError::Malformed(format!("Wrong signature purpose {}", purpose)));
        }

        let mut exp = [0u8; 8];
        exp.copy_from_slice(&signed[8..16]);

        Ok(Self {
            derived_key_sig,
            expiration: AbsoluteTime::from_be_bytes(exp),
            data: signed[SIGNED_HEADER_SIZE..].to_vec(),
        })
    }

    /// 被签名的部分: 用途头 || 过期时间 || 密文
    pub fn signed_data(&self) -> Vec<u8> {
        let size = (SIGNED_HEADER_SIZE + self.data.len()) as u32;
        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&purpose_header(size, SignaturePurpose::GNS_RECORD_SIGN));
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// 签名所用的派生公钥
    pub fn derived_key(&self) -> &ZoneKey {
        &self.derived_key_sig.key
    }

    pub fn signature(&self) -> &Signature {
        &self.derived_key_sig.signature
    }

    pub fn encrypted_data(&self) -> &[u8] {
        &self.data
    }

    /// 存储该块的DHT键
    pub fn query_key(&self) -> HashCode {
        self.derived_key().hash()
    }
}

impl Block for GnsBlock {
    fn block_type(&self) -> BlockType {
        BlockType::GNS_NAMERECORD
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.derived_key_sig.to_bytes();
        out.extend_from_slice(&self.signed_data());
        out
    }

    fn expiration(&self) -> AbsoluteTime {
        self.expiration
    }

    fn verify(&self) -> Result<bool, BlockError> {
        match self.derived_key_sig.verify(&self.signed_data()) {
            Ok(valid) => Ok(valid),
            Err(crypto::CryptoError::InvalidSignature(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn filter_key(&self) -> Option<HashCode> {
        Some(HashCode::of(&self.to_bytes()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for GnsBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GnsBlock")
            .field("derived_key", self.derived_key())
            .field("expiration", &self.expiration)
            .field("data", &format!("[{} bytes]", self.data.len()))
            .finish()
    }
}

/// 按区域和标签查找GNS记录
#[derive(Clone)]
pub struct GnsQuery {
    zone: ZoneKey,
    label: String,
    derived: ZoneKey,
    key: HashCode,
    flags: RouteFlags,
}

impl GnsQuery {
    pub fn new(zone: ZoneKey, label: &str) -> Result<Self, BlockError> {
        let derived = zone.derive(label, GNS_CONTEXT)?;
        let key = derived.hash();
        Ok(Self {
            zone,
            label: label.to_string(),
            derived,
            key,
            flags: RouteFlags::NONE,
        })
    }

    pub fn with_flags(mut self, flags: RouteFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn zone(&self) -> &ZoneKey {
        &self.zone
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn derived_key(&self) -> &ZoneKey {
        &self.derived
    }

    /// 验证并解密后解析出记录集
    pub fn records(&self, block: &dyn Block) -> Result<RecordSet, BlockError> {
        self.verify(block)?;
        let plaintext = self.decrypt(block)?;
        RecordSet::from_bytes(&plaintext).map_err(|e| BlockError::Malformed(e.to_string()))
    }
}

impl Query for GnsQuery {
    fn key(&self) -> &HashCode {
        &self.key
    }

    fn block_type(&self) -> BlockType {
        BlockType::GNS_NAMERECORD
    }

    fn flags(&self) -> RouteFlags {
        self.flags
    }

    fn verify(&self, block: &dyn Block) -> Result<(), BlockError> {
        let block = block.as_any()
            .downcast_ref::<GnsBlock>()
            .ok_or(BlockError::TypeNotVerified)?;

        // 块必须由本查询的标签派生密钥签名
        if block.derived_key() != &self.derived {
            return Err(BlockError::InvalidSignature);
        }
        if !block.verify()? {
            return Err(BlockError::InvalidSignature);
        }
        Ok(())
    }

    fn decrypt(&self, block: &dyn Block) -> Result<Vec<u8>, BlockError> {
        let block = block.as_any()
            .downcast_ref::<GnsBlock>()
            .ok_or(BlockError::CantDecrypt)?;

        Ok(decrypt_block(&self.zone, &self.label, block.expiration, &block.data)?)
    }
}

impl fmt::Debug for GnsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GnsQuery")
            .field("zone", &self.zone)
            .field("label", &self.label)
            .field("key", &self.key)
            .finish()
    }
}

/// 对单个GNS块的验证和解密结果缓存
///
/// 同一个块被多次处理时（例如先过滤再投递），签名只检查一次，密文只解密一次。
/// 一个实例只对应一对 (查询, 块)。
#[derive(Debug, Default, Clone)]
pub struct GnsVerification {
    checked: bool,
    verified: bool,
    plaintext: Option<Vec<u8>>,
}

impl GnsVerification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn is_decrypted(&self) -> bool {
        self.plaintext.is_some()
    }

    pub fn check(&mut self, query: &GnsQuery, block: &GnsBlock) -> Result<(), BlockError> {
        if !self.checked {
            self.checked = true;
            query.verify(block)?;
            self.verified = true;
        }
        if self.verified {
            Ok(())
        } else {
            Err(BlockError::InvalidSignature)
        }
    }

    pub fn decrypt(&mut self, query: &GnsQuery, block: &GnsBlock) -> Result<&[u8], BlockError> {
        self.check(query, block)?;
        if self.plaintext.is_none() {
            self.plaintext = Some(query.decrypt(block)?);
        }
        Ok(self.plaintext.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::TestBlock;
    use crate::gns::{RecordFlags, RecordType, ResourceRecord};
    use std::time::Duration;

    fn expiration() -> AbsoluteTime {
        AbsoluteTime::now().add(Duration::from_secs(3600)).truncate_to_secs()
    }

    #[test]
    fn test_publish_verify_decrypt() {
        let zone = ZonePrivate::generate();
        let exp = expiration();
        let block = GnsBlock::publish(&zone, "www", exp, b"record data").unwrap();
        assert!(block.verify().unwrap());
        assert_eq!(block.expiration(), exp);

        let query = GnsQuery::new(zone.public().unwrap(), "www").unwrap();
        assert_eq!(query.key(), &block.query_key());
        assert!(query.verify(&block).is_ok());
        assert_eq!(query.decrypt(&block).unwrap(), b"record data");
    }

    #[test]
    fn test_wire_format() {
        let zone = ZonePrivate::generate();
        let block = GnsBlock::publish(&zone, "mail", expiration(), b"abc").unwrap();
        let bytes = block.to_bytes();

        // 100字节派生签名 + 16字节头 + 3字节明文 + 16字节认证标签
        assert_eq!(bytes.len(), 100 + 16 + 3 + 16);
        assert_eq!(&bytes[104..108], &SignaturePurpose::GNS_RECORD_SIGN.to_be_bytes());

        let parsed = GnsBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, block);
        assert!(parsed.verify().unwrap());

        let mut bad_size = bytes.clone();
        bad_size[103] ^= 1;
        assert!(matches!(GnsBlock::from_bytes(&bad_size), Err(BlockError::Malformed(_))));

        assert!(GnsBlock::from_bytes(&bytes[..50]).is_err());
    }

    #[test]
    fn test_tampered_block_fails() {
        let zone = ZonePrivate::generate();
        let block = GnsBlock::publish(&zone, "www", expiration(), b"data").unwrap();
        let mut bytes = block.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let tampered = GnsBlock::from_bytes(&bytes).unwrap();
        assert!(!tampered.verify().unwrap());

        let query = GnsQuery::new(zone.public().unwrap(), "www").unwrap();
        assert!(matches!(query.verify(&tampered), Err(BlockError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_label_or_type() {
        let zone = ZonePrivate::generate();
        let block = GnsBlock::publish(&zone, "www", expiration(), b"data").unwrap();

        let other = GnsQuery::new(zone.public().unwrap(), "ftp").unwrap();
        assert!(matches!(other.verify(&block), Err(BlockError::InvalidSignature)));
        assert!(other.decrypt(&block).is_err());

        let test_block = TestBlock::new(b"x".to_vec());
        assert!(matches!(other.verify(&test_block), Err(BlockError::TypeNotVerified)));
        assert!(matches!(other.decrypt(&test_block), Err(BlockError::CantDecrypt)));
    }

    #[test]
    fn test_publish_records() {
        let zone = ZonePrivate::generate();
        let exp = expiration();
        let records = RecordSet::new(vec![
            ResourceRecord::txt("hello world", exp.add(Duration::from_secs(60))),
            ResourceRecord::new(RecordType::A, RecordFlags::NONE, exp, vec![192, 168, 0, 1]),
            ResourceRecord::new(RecordType::TXT, RecordFlags::PRIVATE, exp, b"hidden".to_vec()),
        ]);
        let block = GnsBlock::publish_records(&zone, "www", &records).unwrap();
        assert_eq!(block.expiration(), exp);

        let query = GnsQuery::new(zone.public().unwrap(), "www").unwrap();
        let got = query.records(&block).unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.records.iter().all(|r| !r.is_private()));
    }

    #[test]
    fn test_verification_cache() {
        let zone = ZonePrivate::generate();
        let block = GnsBlock::publish(&zone, "www", expiration(), b"payload").unwrap();
        let query = GnsQuery::new(zone.public().unwrap(), "www").unwrap();

        let mut state = GnsVerification::new();
        assert!(!state.is_checked());
        assert_eq!(state.decrypt(&query, &block).unwrap(), b"payload");
        assert!(state.is_verified());
        assert!(state.is_decrypted());

        let wrong = GnsQuery::new(zone.public().unwrap(), "ftp").unwrap();
        let mut state = GnsVerification::new();
        assert!(state.check(&wrong, &block).is_err());
        assert!(state.is_checked());
        assert!(!state.is_verified());
        // 结果已缓存
        assert!(matches!(state.check(&wrong, &block), Err(BlockError::InvalidSignature)));
    }
}
