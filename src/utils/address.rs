use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address URI: {0}")]
    InvalidUri(String),

    #[error("Invalid scheme: {0}")]
    InvalidScheme(String),
}

/// 对等节点的网络地址，例如 `ip+udp://1.2.3.4:6789`
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// 传输方案（如 `ip+udp`、`gnunet+tcp`）
    pub scheme: String,

    /// 方案相关的地址部分
    pub authority: String,
}

impl Address {
    pub fn new(scheme: &str, authority: &str) -> Result<Self, AddressError> {
        if !is_valid_scheme(scheme) {
            return Err(AddressError::InvalidScheme(scheme.to_string()));
        }
        if authority.is_empty() || authority.contains('\0') {
            return Err(AddressError::InvalidUri(format!("{}://{}", scheme, authority)));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
        })
    }

    /// 从URI形式解析地址
    pub fn parse(uri: &str) -> Result<Self, AddressError> {
        let (scheme, authority) = uri.split_once("://")
            .ok_or_else(|| AddressError::InvalidUri(uri.to_string()))?;
        Self::new(scheme, authority)
    }

    /// 地址的URI形式
    pub fn uri(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }
}

/// 方案名只允许字母、数字以及 `+`、`-`、`.`，且必须以字母开头
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.uri())
    }
}
