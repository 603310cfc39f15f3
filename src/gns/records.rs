use crate::gns::GnsError;
use crate::utils::AbsoluteTime;
use std::fmt;

/// 常用记录类型
pub struct RecordType;

impl RecordType {
    pub const A: u32 = 1;
    pub const CNAME: u32 = 5;
    pub const TXT: u32 = 16;
    pub const AAAA: u32 = 28;
    /// 委派到另一个区域
    pub const EDKEY: u32 = 65556;
}

/// 记录标志
pub struct RecordFlags;

impl RecordFlags {
    pub const NONE: u16 = 0;
    /// 私有记录，不发布到DHT
    pub const PRIVATE: u16 = 2;
    /// 影子记录，只在其他同类记录过期后生效
    pub const SHADOW: u16 = 16;
}

/// 记录头长度: 过期时间(8) || 数据长度(2) || 标志(2) || 类型(4)
const RECORD_HEADER_SIZE: usize = 16;

/// 单条资源记录
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub expiration: AbsoluteTime,
    pub record_type: u32,
    pub flags: u16,
    pub data: Vec<u8>,
}

impl ResourceRecord {
    pub fn new(record_type: u32, flags: u16, expiration: AbsoluteTime, data: Vec<u8>) -> Self {
        Self { expiration, record_type, flags, data }
    }

    /// 文本记录
    pub fn txt(value: &str, expiration: AbsoluteTime) -> Self {
        Self::new(RecordType::TXT, RecordFlags::NONE, expiration, value.as_bytes().to_vec())
    }

    pub fn is_private(&self) -> bool {
        self.flags & RecordFlags::PRIVATE != 0
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), GnsError> {
        let size = u16::try_from(self.data.len())
            .map_err(|_| GnsError::RecordTooLarge(self.data.len()))?;
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.record_type.to_be_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }
}

impl fmt::Debug for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRecord")
            .field("type", &self.record_type)
            .field("flags", &self.flags)
            .field("expiration", &self.expiration)
            .field("data", &format!("[{} bytes]", self.data.len()))
            .finish()
    }
}

/// 一个标签下的记录集，线上格式: 数量(4) || 记录...
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordSet {
    pub records: Vec<ResourceRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 最早的记录过期时间；空集合永不过期
    pub fn expiration(&self) -> AbsoluteTime {
        self.records.iter()
            .map(|r| r.expiration)
            .min()
            .unwrap_or(AbsoluteTime::NEVER)
    }

    /// 可以发布的记录（去掉私有记录）
    pub fn public_records(&self) -> RecordSet {
        RecordSet::new(self.records.iter().filter(|r| !r.is_private()).cloned().collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GnsError> {
        let count = u32::try_from(self.records.len())
            .map_err(|_| GnsError::Malformed("Too many records".to_string()))?;
        let mut out = Vec::new();
        out.extend_from_slice(&count.to_be_bytes());
        for record in &self.records {
            record.write_to(&mut out)?;
        }
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, GnsError> {
        if data.len() < 4 {
            return Err(GnsError::Malformed("Record set too short".to_string()));
        }
        let count = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

        let mut pos = 4;
        // 每条记录至少16字节，防止伪造的数量导致过量分配
        let mut records = Vec::with_capacity(count.min((data.len() - pos) / RECORD_HEADER_SIZE));
        for i in 0..count {
            if data.len() < pos + RECORD_HEADER_SIZE {
                return Err(GnsError::Malformed(format!("Record {} truncated", i)));
            }
            let hdr = &data[pos..pos + RECORD_HEADER_SIZE];

            let mut exp = [0u8; 8];
            exp.copy_from_slice(&hdr[..8]);
            let size = u16::from_be_bytes([hdr[8], hdr[9]]) as usize;
            let flags = u16::from_be_bytes([hdr[10], hdr[11]]);
            let record_type = u32::from_be_bytes([hdr[12], hdr[13], hdr[14], hdr[15]]);
            pos += RECORD_HEADER_SIZE;

            if data.len() < pos + size {
                return Err(GnsError::Malformed(format!("Record {} data truncated", i)));
            }
            records.push(ResourceRecord {
                expiration: AbsoluteTime::from_be_bytes(exp),
                record_type,
                flags,
                data: data[pos..pos + size].to_vec(),
            });
            pos += size;
        }

        if pos != data.len() {
            return Err(GnsError::Malformed(format!("{} trailing bytes", data.len() - pos)));
        }

        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_set_encoding() {
        let exp = AbsoluteTime::from_epoch_secs(2_000_000_000).unwrap();
        let rs = RecordSet::new(vec![
            ResourceRecord::txt("hello", exp),
            ResourceRecord::new(RecordType::A, RecordFlags::NONE, exp, vec![10, 0, 0, 1]),
        ]);
        let bytes = rs.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4 + 16 + 5 + 16 + 4);
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(RecordSet::from_bytes(&bytes).unwrap(), rs);
    }

    #[test]
    fn test_expiration_and_private_records() {
        let soon = AbsoluteTime::now().add(Duration::from_secs(60));
        let later = soon.add(Duration::from_secs(60));
        let rs = RecordSet::new(vec![
            ResourceRecord::txt("a", later),
            ResourceRecord::new(RecordType::TXT, RecordFlags::PRIVATE, soon, b"secret".to_vec()),
        ]);
        assert_eq!(rs.expiration(), soon);

        let public = rs.public_records();
        assert_eq!(public.len(), 1);
        assert_eq!(public.expiration(), later);
        assert_eq!(RecordSet::default().expiration(), AbsoluteTime::NEVER);
    }

    #[test]
    fn test_malformed_record_sets() {
        assert!(RecordSet::from_bytes(&[0, 0]).is_err());
        // 声明1条记录但没有数据
        assert!(RecordSet::from_bytes(&[0, 0, 0, 1]).is_err());
        // 多余的字节
        assert!(RecordSet::from_bytes(&[0, 0, 0, 0, 9]).is_err());

        let big = ResourceRecord::txt(&"x".repeat(70_000), AbsoluteTime::NEVER);
        assert!(matches!(RecordSet::new(vec![big]).to_bytes(), Err(GnsError::RecordTooLarge(70_000))));
    }
}
