use crate::utils::base32;
use std::cmp::Ordering;
use std::fmt;

/// 哈希值长度（SHA-512）
pub const HASH_SIZE: usize = 64;

/// SHA-512哈希值，同时用作DHT的路由键
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashCode(pub [u8; HASH_SIZE]);

impl HashCode {
    /// 计算数据的SHA-512哈希
    pub fn of(data: &[u8]) -> Self {
        let digest = ring::digest::digest(&ring::digest::SHA512, data);
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(digest.as_ref());
        Self(hash)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_SIZE {
            return None;
        }
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(bytes);
        Some(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 与另一个哈希的异或距离
    pub fn distance(&self, other: &HashCode) -> Distance {
        let mut d = [0u8; HASH_SIZE];
        for (i, b) in d.iter_mut().enumerate() {
            *b = self.0[i] ^ other.0[i];
        }
        Distance(d)
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", base32::encode(&self.0))
    }
}

impl fmt::Debug for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashCode({}...)", &base32::encode(&self.0)[..8])
    }
}

/// 两个键之间的异或距离，按大端整数比较
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Distance(pub [u8; HASH_SIZE]);

impl Distance {
    /// 前导零位的数量
    pub fn leading_zeros(&self) -> u32 {
        let mut n = 0;
        for b in self.0.iter() {
            if *b == 0 {
                n += 8;
            } else {
                n += b.leading_zeros();
                break;
            }
        }
        n
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha512_of_empty() {
        let h = HashCode::of(b"");
        assert_eq!(hex::encode(&h.0[..8]), "cf83e1357eefb8bd");
    }

    #[test]
    fn test_distance() {
        let a = HashCode::of(b"a");
        let b = HashCode::of(b"b");
        assert_eq!(a.distance(&a).leading_zeros(), 512);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!(a.distance(&a) < a.distance(&b));
    }
}
