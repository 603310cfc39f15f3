use crate::crypto::{hkdf_sha512, signing, CryptoError, HashCode, Signature, SIGNATURE_SIZE};
use crate::utils::base32;
use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{ExpandedSecretKey, PublicKey as EdPublicKey, SecretKey as EdSecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 区域密钥类型
pub struct ZoneKeyType;

impl ZoneKeyType {
    /// ECDSA区域密钥（不支持）
    pub const PKEY: u32 = 65536;

    /// EdDSA区域密钥
    pub const EDKEY: u32 = 65556;
}

/// 密钥盲化时使用的HKDF盐
const DERIVATION_SALT: &[u8] = b"key-derivation";

/// 区域公钥，线上格式: 类型(4字节,大端) || 公钥(32字节)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    key_type: u32,
    key: [u8; 32],
}

impl ZoneKey {
    /// 序列化后的长度
    pub const SIZE: usize = 36;

    pub fn new_edkey(key: [u8; 32]) -> Self {
        Self { key_type: ZoneKeyType::EDKEY, key }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != Self::SIZE {
            return Err(CryptoError::InvalidKey(format!("Expected {} bytes, got {}", Self::SIZE, data.len())));
        }
        let mut type_bytes = [0u8; 4];
        type_bytes.copy_from_slice(&data[..4]);
        let key_type = u32::from_be_bytes(type_bytes);
        if key_type != ZoneKeyType::EDKEY {
            return Err(CryptoError::UnsupportedKeyType(key_type));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&data[4..]);
        Ok(Self { key_type, key })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.key_type.to_be_bytes());
        out[4..].copy_from_slice(&self.key);
        out
    }

    pub fn key_type(&self) -> u32 {
        self.key_type
    }

    pub fn key_data(&self) -> &[u8; 32] {
        &self.key
    }

    /// 盲化: 由区域公钥和标签推导出派生公钥
    pub fn derive(&self, label: &str, context: &str) -> Result<ZoneKey, CryptoError> {
        let point = CompressedEdwardsY(self.key)
            .decompress()
            .ok_or_else(|| CryptoError::InvalidKey("Zone key is not a curve point".to_string()))?;
        let h = derive_h(self, label, context)?;
        let derived = (&h * &point).compress();
        Ok(Self::new_edkey(derived.to_bytes()))
    }

    /// 派生公钥的SHA-512哈希
    pub fn hash(&self) -> HashCode {
        HashCode::of(&self.to_bytes())
    }

    /// 使用该公钥验证签名
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<bool, CryptoError> {
        signing::verify_raw(&self.key, message, signature)
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", base32::encode(&self.to_bytes()))
    }
}

impl fmt::Debug for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZoneKey({}:{})", self.key_type, hex::encode(&self.key[..6]))
    }
}

impl FromStr for ZoneKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = base32::decode_exact(s, Self::SIZE)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&data)
    }
}

/// 计算盲化因子 h = HKDF(key-derivation, zone, label || context) mod ℓ
fn derive_h(zone: &ZoneKey, label: &str, context: &str) -> Result<Scalar, CryptoError> {
    let mut okm = [0u8; 64];
    hkdf_sha512(DERIVATION_SALT, &zone.to_bytes(), &[label.as_bytes(), context.as_bytes()], &mut okm)?;
    Ok(Scalar::from_bytes_mod_order_wide(&okm))
}

/// 区域私钥（Ed25519种子）
#[derive(Clone)]
pub struct ZonePrivate {
    seed: [u8; 32],
}

impl ZonePrivate {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut seed);
        Self { seed }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    fn secret(&self) -> Result<EdSecretKey, CryptoError> {
        EdSecretKey::from_bytes(&self.seed).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// 对应的区域公钥
    pub fn public(&self) -> Result<ZoneKey, CryptoError> {
        let public = EdPublicKey::from(&self.secret()?);
        Ok(ZoneKey::new_edkey(public.to_bytes()))
    }

    /// 推导标签对应的派生私钥
    ///
    /// 派生私钥为 h·a mod ℓ，其公钥与 `ZoneKey::derive` 的结果相同。
    pub fn derive(&self, label: &str, context: &str) -> Result<DerivedZonePrivate, CryptoError> {
        let zone = self.public()?;
        let h = derive_h(&zone, label, context)?;

        let expanded = ExpandedSecretKey::from(&self.secret()?).to_bytes();
        let mut a = [0u8; 32];
        a.copy_from_slice(&expanded[..32]);
        let scalar = h * Scalar::from_bytes_mod_order(a);

        // 签名随机数前缀同样绑定到标签
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(h.as_bytes());
        seed.extend_from_slice(&expanded[32..]);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&HashCode::of(&seed).0[..32]);

        let public = (&scalar * &ED25519_BASEPOINT_POINT).compress().to_bytes();

        Ok(DerivedZonePrivate {
            scalar,
            prefix,
            public: ZoneKey::new_edkey(public),
        })
    }
}

impl fmt::Debug for ZonePrivate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZonePrivate {{ <redacted> }}")
    }
}

impl Serialize for ZonePrivate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.seed))
    }
}

impl<'de> Deserialize<'de> for ZonePrivate {
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

/// 派生（盲化）后的区域私钥，只用于签名
pub struct DerivedZonePrivate {
    scalar: Scalar,
    prefix: [u8; 32],
    public: ZoneKey,
}

impl DerivedZonePrivate {
    pub fn public(&self) -> &ZoneKey {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.scalar.as_bytes());
        bytes[32..].copy_from_slice(&self.prefix);

        let expanded = ExpandedSecretKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let public = EdPublicKey::from_bytes(self.public.key_data())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Signature(expanded.sign(message, &public).to_bytes()))
    }
}

/// 区域签名: 签名所用的（派生）公钥 || 签名
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ZoneSignature {
    pub key: ZoneKey,
    pub signature: Signature,
}

impl ZoneSignature {
    pub const SIZE: usize = ZoneKey::SIZE + SIGNATURE_SIZE;

    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != Self::SIZE {
            return Err(CryptoError::InvalidSignature(format!("Expected {} bytes, got {}", Self::SIZE, data.len())));
        }
        let key = ZoneKey::from_bytes(&data[..ZoneKey::SIZE])?;
        let signature = Signature::from_slice(&data[ZoneKey::SIZE..])?;
        Ok(Self { key, signature })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.key.to_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    pub fn verify(&self, message: &[u8]) -> Result<bool, CryptoError> {
        self.key.verify(message, &self.signature)
    }
}
