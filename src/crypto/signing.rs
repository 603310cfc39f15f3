use crate::crypto::{CryptoError, PeerId, Signature};
use ed25519_dalek::Verifier;

/// 签名用途标签（写入被签名数据的头部）
pub struct SignaturePurpose;

impl SignaturePurpose {
    /// GNS记录块
    pub const GNS_RECORD_SIGN: u32 = 15;

    /// 对等节点HELLO地址广告
    pub const HELLO: u32 = 40;
}

/// 被签名数据的8字节头部: 大小(4字节,大端) || 用途(4字节,大端)
pub fn purpose_header(size: u32, purpose: u32) -> [u8; 8] {
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&size.to_be_bytes());
    header[4..].copy_from_slice(&purpose.to_be_bytes());
    header
}

/// 使用Ed25519公钥验证签名
///
/// 签名不匹配时返回 `Ok(false)`；公钥或签名格式无效时返回错误。
pub fn verify_raw(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<bool, CryptoError> {
    let verifying_key = ed25519_dalek::PublicKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let sig = ed25519_dalek::Signature::try_from(&signature.0[..])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// 使用对等节点ID验证签名
pub fn verify(peer: &PeerId, message: &[u8], signature: &Signature) -> Result<bool, CryptoError> {
    verify_raw(&peer.0, message, signature)
}
