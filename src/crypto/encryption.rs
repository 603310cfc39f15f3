use crate::crypto::{hkdf_sha512, CryptoError, ZoneKey};
use crate::utils::AbsoluteTime;
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chacha20poly1305::aead::{Aead, NewAead};

const KEY_SALT: &[u8] = b"gns-aead-key";
const NONCE_SALT: &[u8] = b"gns-aead-nonce";

/// 由区域公钥、标签和过期时间派生记录加密所用的密钥和随机数
///
/// 随机数的后8字节是过期时间，因此换用不同过期时间的密文无法解密。
fn derive_block_key(zone: &ZoneKey, label: &str, expiration: AbsoluteTime) -> Result<([u8; 32], [u8; 12]), CryptoError> {
    let ikm = zone.to_bytes();

    let mut key = [0u8; 32];
    hkdf_sha512(KEY_SALT, &ikm, &[label.as_bytes()], &mut key)?;

    let mut nonce = [0u8; 12];
    hkdf_sha512(NONCE_SALT, &ikm, &[label.as_bytes()], &mut nonce[..4])?;
    nonce[4..].copy_from_slice(&expiration.to_be_bytes());

    Ok((key, nonce))
}

/// 加密GNS记录集数据
pub fn encrypt_block(
    zone: &ZoneKey,
    label: &str,
    expiration: AbsoluteTime,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (key, nonce) = derive_block_key(zone, label, expiration)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher.encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// 解密GNS记录集数据
pub fn decrypt_block(
    zone: &ZoneKey,
    label: &str,
    expiration: AbsoluteTime,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    // ChaCha20-Poly1305认证标签为16字节
    if ciphertext.len() < 16 {
        return Err(CryptoError::DecryptionFailed("Ciphertext too short".to_string()));
    }

    let (key, nonce) = derive_block_key(zone, label, expiration)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher.decrypt(Nonce::from_slice(&nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
