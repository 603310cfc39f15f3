use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 绝对时间（自Unix纪元起的微秒数）
///
/// `AbsoluteTime::NEVER` 表示永不过期。线上格式为8字节大端序。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsoluteTime(u64);

impl AbsoluteTime {
    /// 永不过期
    pub const NEVER: AbsoluteTime = AbsoluteTime(u64::MAX);

    /// 当前时间
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        Self(micros.min(u64::MAX as u128 - 1) as u64)
    }

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// 从纪元秒数创建，溢出时返回None
    ///
    /// `NEVER.epoch_secs()` 映射回 `NEVER`。
    pub fn from_epoch_secs(secs: u64) -> Option<Self> {
        if secs == Self::NEVER.epoch_secs() {
            return Some(Self::NEVER);
        }
        secs.checked_mul(1_000_000).map(Self)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    pub fn epoch_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    pub fn is_never(&self) -> bool {
        *self == Self::NEVER
    }

    /// 加上一段时长（饱和运算，NEVER保持不变）
    pub fn add(&self, d: Duration) -> Self {
        if self.is_never() {
            return *self;
        }
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }

    /// 截断到整秒
    pub fn truncate_to_secs(&self) -> Self {
        if self.is_never() {
            return *self;
        }
        Self(self.0 / 1_000_000 * 1_000_000)
    }

    /// 检查是否已过期
    pub fn is_expired(&self) -> bool {
        !self.is_never() && *self <= Self::now()
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for AbsoluteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return write!(f, "never");
        }
        match chrono::DateTime::from_timestamp(self.epoch_secs() as i64, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl fmt::Debug for AbsoluteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbsoluteTime({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never() {
        assert!(!AbsoluteTime::NEVER.is_expired());
        assert_eq!(AbsoluteTime::NEVER.add(Duration::from_secs(10)), AbsoluteTime::NEVER);
        assert_eq!(AbsoluteTime::NEVER.to_string(), "never");
        let secs = AbsoluteTime::NEVER.epoch_secs();
        assert_eq!(AbsoluteTime::from_epoch_secs(secs), Some(AbsoluteTime::NEVER));
        assert!(!AbsoluteTime::from_epoch_secs(secs - 1).unwrap().is_never());
    }

    #[test]
    fn test_expiry() {
        let past = AbsoluteTime::from_epoch_secs(1653499308).unwrap();
        assert!(past.is_expired());
        let future = AbsoluteTime::now().add(Duration::from_secs(3600));
        assert!(!future.is_expired());
    }

    #[test]
    fn test_seconds() {
        let t = AbsoluteTime::from_micros(1_653_499_308_123_456);
        assert_eq!(t.epoch_secs(), 1_653_499_308);
        assert_eq!(t.truncate_to_secs().as_micros(), 1_653_499_308_000_000);
        assert_eq!(AbsoluteTime::from_be_bytes(t.to_be_bytes()), t);
        assert!(AbsoluteTime::from_epoch_secs(u64::MAX).is_none());
    }
}
