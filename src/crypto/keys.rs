use crate::crypto::CryptoError;
use crate::utils::base32;
use ed25519_dalek::{ExpandedSecretKey, PublicKey as EdPublicKey, SecretKey as EdSecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 对等节点ID的长度（Ed25519公钥）
pub const PEER_ID_SIZE: usize = 32;

/// 签名长度（Ed25519）
pub const SIGNATURE_SIZE: usize = 64;

/// Represents a peer's identity: its Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; PEER_ID_SIZE]);

impl PeerId {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let id: [u8; PEER_ID_SIZE] = bytes.try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("Expected {} bytes, got {}", PEER_ID_SIZE, bytes.len())))?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 返回对应的Ed25519验证公钥
    pub fn public_key(&self) -> Result<EdPublicKey, CryptoError> {
        EdPublicKey::from_bytes(&self.0).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", base32::encode(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &base32::encode(&self.0)[..8])
    }
}

impl FromStr for PeerId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base32::decode_exact(s, PEER_ID_SIZE)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

/// Ed25519签名
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// 未签名块使用的全零签名
    pub fn empty() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let sig: [u8; SIGNATURE_SIZE] = bytes.try_into()
            .map_err(|_| CryptoError::InvalidSignature(format!("Expected {} bytes, got {}", SIGNATURE_SIZE, bytes.len())))?;
        Ok(Self(sig))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..6]))
    }
}

/// A peer's private key. Only the 32-byte Ed25519 seed is kept.
#[derive(Clone)]
pub struct PeerPrivateKey {
    seed: [u8; 32],
}

impl PeerPrivateKey {
    /// 生成新的随机私钥
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut seed);
        Self { seed }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    fn secret(&self) -> Result<EdSecretKey, CryptoError> {
        EdSecretKey::from_bytes(&self.seed).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// 对应的对等节点ID
    pub fn peer_id(&self) -> Result<PeerId, CryptoError> {
        let public = EdPublicKey::from(&self.secret()?);
        Ok(PeerId(public.to_bytes()))
    }

    /// 使用私钥对消息签名
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let secret = self.secret()?;
        let public = EdPublicKey::from(&secret);
        let expanded = ExpandedSecretKey::from(&secret);
        Ok(Signature(expanded.sign(message, &public).to_bytes()))
    }
}

impl fmt::Debug for PeerPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerPrivateKey {{ <redacted> }}")
    }
}

// 私钥以十六进制种子形式保存
impl Serialize for PeerPrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.seed))
    }
}

impl<'de> Deserialize<'de> for PeerPrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        let seed: [u8; 32] = bytes.as_slice().try_into()
            .map_err(|_| D::Error::custom("Invalid seed length"))?;
        Ok(Self { seed })
    }
}
