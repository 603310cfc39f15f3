//! Deterministic bloom filter shared with other peers.
//!
//! Bit indices are derived from SHA-512 of the entry, optionally XORed with
//! SHA-512 of a 4-byte mutator, read as 16 big-endian u32 values and reduced
//! modulo the number of bits. The layout is part of the wire format.

use crate::crypto::{HashCode, PeerId, HASH_SIZE};
use crate::filter::FilterError;

/// 每个条目设置的位数
pub const INDICES_PER_ENTRY: usize = HASH_SIZE / 4;

/// 对等节点过滤器的固定大小（字节）
pub const PEER_FILTER_SIZE: usize = 128;

/// 结果过滤器的最大大小（字节）
pub const MAX_RESULT_FILTER_SIZE: usize = 32768;

/// 两个过滤器的比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCompare {
    /// 位模式完全相同
    Same,
    /// 大小和变异器一致，可以合并
    Mergeable,
    /// 大小或变异器不同
    Different,
}

/// 根据预期条目数计算过滤器大小:
/// 不小于8、不小于4倍条目数的最小2的幂，最大32768字节
pub fn filter_size(expected: usize) -> usize {
    let wanted = expected.saturating_mul(4).max(8);
    wanted.checked_next_power_of_two()
        .unwrap_or(MAX_RESULT_FILTER_SIZE)
        .min(MAX_RESULT_FILTER_SIZE)
}

#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    mutator: Option<[u8; 4]>,
    mutator_digest: Option<HashCode>,
}

impl BloomFilter {
    /// 创建指定大小（字节）的空过滤器
    pub fn new(size: usize) -> Result<Self, FilterError> {
        if size == 0 {
            return Err(FilterError::InvalidSize(size));
        }
        Ok(Self::with_size(size))
    }

    /// 调用方保证 `size > 0`
    pub(crate) fn with_size(size: usize) -> Self {
        Self {
            bits: vec![0u8; size],
            mutator: None,
            mutator_digest: None,
        }
    }

    /// 创建带32位变异器的空过滤器
    pub fn with_mutator(size: usize, mutator: u32) -> Result<Self, FilterError> {
        let mut bf = Self::new(size)?;
        bf.set_mutator_u32(mutator);
        Ok(bf)
    }

    /// 从线上格式解析: [变异器(4字节)] || 位数组
    pub fn from_bytes(data: &[u8], with_mutator: bool) -> Result<Self, FilterError> {
        let (mutator, bits) = if with_mutator {
            if data.len() < 4 {
                return Err(FilterError::Malformed(format!("Filter data too short: {} bytes", data.len())));
            }
            let mut m = [0u8; 4];
            m.copy_from_slice(&data[..4]);
            (Some(m), &data[4..])
        } else {
            (None, data)
        };

        let mut bf = Self::new(bits.len())?;
        bf.bits.copy_from_slice(bits);
        bf.set_mutator(mutator);
        Ok(bf)
    }

    /// 设置或清除原始4字节变异器
    pub fn set_mutator(&mut self, mutator: Option<[u8; 4]>) {
        self.mutator = mutator;
        self.mutator_digest = mutator.map(|m| HashCode::of(&m));
    }

    /// 以大端序32位整数设置变异器
    pub fn set_mutator_u32(&mut self, mutator: u32) {
        self.set_mutator(Some(mutator.to_be_bytes()));
    }

    pub fn mutator(&self) -> Option<[u8; 4]> {
        self.mutator
    }

    /// 过滤器大小（字节）
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// 计算条目对应的16个位索引
    fn indices(&self, entry: &[u8]) -> [usize; INDICES_PER_ENTRY] {
        let mut h = HashCode::of(entry).0;
        if let Some(digest) = &self.mutator_digest {
            for (b, m) in h.iter_mut().zip(digest.0.iter()) {
                *b ^= m;
            }
        }

        let num_bits = 8 * self.bits.len() as u64;
        let mut idx = [0usize; INDICES_PER_ENTRY];
        for (i, chunk) in h.chunks_exact(4).enumerate() {
            let v = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64;
            idx[i] = (v % num_bits) as usize;
        }
        idx
    }

    /// 添加条目
    pub fn add(&mut self, entry: &[u8]) {
        for i in self.indices(entry) {
            self.bits[i / 8] |= 1 << (i % 8);
        }
    }

    /// 检查条目是否（可能）存在；不会出现假阴性
    pub fn contains(&self, entry: &[u8]) -> bool {
        self.indices(entry)
            .iter()
            .all(|&i| self.bits[i / 8] & (1 << (i % 8)) != 0)
    }

    /// 按位或合并另一个过滤器；大小或变异器不同时返回false且不做修改
    pub fn merge(&mut self, other: &BloomFilter) -> bool {
        if self.bits.len() != other.bits.len() || self.mutator != other.mutator {
            return false;
        }
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= b;
        }
        true
    }

    pub fn compare(&self, other: &BloomFilter) -> FilterCompare {
        if self.bits.len() != other.bits.len() || self.mutator != other.mutator {
            FilterCompare::Different
        } else if self.bits == other.bits {
            FilterCompare::Same
        } else {
            FilterCompare::Mergeable
        }
    }

    /// 线上格式: [变异器(4字节)] || 位数组
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.bits.len());
        if let Some(m) = &self.mutator {
            out.extend_from_slice(m);
        }
        out.extend_from_slice(&self.bits);
        out
    }

    /// 已设置的位数
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("size", &self.bits.len())
            .field("mutator", &self.mutator.map(hex::encode))
            .field("ones", &self.count_ones())
            .finish()
    }
}

/// 对等节点过滤器: 128字节、无变异器，记录已访问过的节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFilter {
    bf: BloomFilter,
}

impl PeerFilter {
    pub fn new() -> Self {
        Self {
            bf: BloomFilter::with_size(PEER_FILTER_SIZE),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FilterError> {
        if data.len() != PEER_FILTER_SIZE {
            return Err(FilterError::InvalidSize(data.len()));
        }
        Ok(Self { bf: BloomFilter::from_bytes(data, false)? })
    }

    pub fn add(&mut self, peer: &PeerId) {
        self.bf.add(peer.as_bytes());
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.bf.contains(peer.as_bytes())
    }

    pub fn merge(&mut self, other: &PeerFilter) -> bool {
        self.bf.merge(&other.bf)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bf.to_bytes()
    }
}

impl Default for PeerFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_entry() -> [u8; 32] {
        let mut e = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut e);
        e
    }

    #[test]
    fn test_filter_size() {
        assert_eq!(filter_size(0), 8);
        assert_eq!(filter_size(2), 8);
        assert_eq!(filter_size(3), 16);
        assert_eq!(filter_size(100), 512);
        assert_eq!(filter_size(1_000_000), MAX_RESULT_FILTER_SIZE);
        assert_eq!(filter_size(usize::MAX), MAX_RESULT_FILTER_SIZE);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut bf = BloomFilter::with_mutator(64, 0xdeadbeef).unwrap();
        let entries: Vec<[u8; 32]> = (0..50).map(|_| random_entry()).collect();
        for (i, e) in entries.iter().enumerate() {
            bf.add(e);
            // 之前加入的条目仍然存在
            for prev in &entries[..=i] {
                assert!(bf.contains(prev));
            }
        }
    }

    #[test]
    fn test_indices_are_deterministic() {
        let a = BloomFilter::with_mutator(128, 42).unwrap();
        let b = BloomFilter::from_bytes(&a.to_bytes(), true).unwrap();
        assert_eq!(a.indices(b"entry"), b.indices(b"entry"));

        // 变异器改变索引
        let c = BloomFilter::with_mutator(128, 43).unwrap();
        assert_ne!(a.indices(b"entry"), c.indices(b"entry"));
    }

    #[test]
    fn test_index_computation() {
        // 没有变异器时，索引直接来自SHA-512的大端32位分组
        let bf = BloomFilter::new(8).unwrap();
        let h = HashCode::of(b"x").0;
        let first = u32::from_be_bytes([h[0], h[1], h[2], h[3]]) as usize % 64;
        assert_eq!(bf.indices(b"x")[0], first);
    }

    #[test]
    fn test_mutator_encodings_agree() {
        let mut a = BloomFilter::new(32).unwrap();
        a.set_mutator_u32(0x01020304);
        let mut b = BloomFilter::new(32).unwrap();
        b.set_mutator(Some([1, 2, 3, 4]));
        a.add(b"same");
        b.add(b"same");
        assert_eq!(a.compare(&b), FilterCompare::Same);
        assert_eq!(&a.to_bytes()[..4], &[1, 2, 3, 4]);

        b.set_mutator(None);
        assert_eq!(b.mutator(), None);
        assert_eq!(b.to_bytes().len(), 32);
    }

    #[test]
    fn test_merge() {
        let mut a = BloomFilter::with_mutator(256, 7).unwrap();
        let mut b = BloomFilter::with_mutator(256, 7).unwrap();
        let left: Vec<[u8; 32]> = (0..20).map(|_| random_entry()).collect();
        let right: Vec<[u8; 32]> = (0..20).map(|_| random_entry()).collect();
        left.iter().for_each(|e| a.add(e));
        right.iter().for_each(|e| b.add(e));

        assert_eq!(a.compare(&b), FilterCompare::Mergeable);
        assert!(a.merge(&b));
        assert!(left.iter().chain(right.iter()).all(|e| a.contains(e)));
    }

    #[test]
    fn test_merge_mismatch_leaves_filters_untouched() {
        let mut a = BloomFilter::with_mutator(256, 7).unwrap();
        a.add(b"one");
        let before = a.clone();

        let mut other_size = BloomFilter::with_mutator(128, 7).unwrap();
        other_size.add(b"two");
        let mut other_mutator = BloomFilter::with_mutator(256, 8).unwrap();
        other_mutator.add(b"two");
        let mut unmutated = BloomFilter::new(256).unwrap();
        unmutated.add(b"two");

        for other in [&other_size, &other_mutator, &unmutated] {
            let other_before = other.clone();
            assert_eq!(a.compare(other), FilterCompare::Different);
            assert!(!a.merge(other));
            assert_eq!(a, before);
            assert_eq!(*other, other_before);
        }
    }

    #[test]
    fn test_peer_filter() {
        let mut pf = PeerFilter::new();
        let p1 = PeerId(random_entry());
        let p2 = PeerId(random_entry());
        pf.add(&p1);
        pf.add(&p2);
        assert!(pf.contains(&p1));
        assert!(pf.contains(&p2));

        // 误报率应很低（2个条目，1024位，16个索引）
        let false_positives = (0..2000)
            .filter(|_| pf.contains(&PeerId(random_entry())))
            .count();
        assert!(false_positives < 20, "too many false positives: {}", false_positives);

        let restored = PeerFilter::from_bytes(&pf.to_bytes()).unwrap();
        assert_eq!(restored, pf);
        assert!(PeerFilter::from_bytes(&[0u8; 64]).is_err());
    }
}
