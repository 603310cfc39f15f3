mod hash;
mod keys;
mod signing;
mod zone;
mod encryption;

pub use hash::{HashCode, Distance, HASH_SIZE};
pub use keys::{PeerId, PeerPrivateKey, Signature, PEER_ID_SIZE, SIGNATURE_SIZE};
pub use signing::{verify, verify_raw, purpose_header, SignaturePurpose};
pub use zone::{ZoneKey, ZoneKeyType, ZonePrivate, DerivedZonePrivate, ZoneSignature};
pub use encryption::{encrypt_block, decrypt_block};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Unsupported zone key type {0}")]
    UnsupportedKeyType(u32),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

/// HKDF输出长度
struct HkdfLen(usize);

impl ring::hkdf::KeyType for HkdfLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// HKDF-SHA512，输出填满 `out`
pub(crate) fn hkdf_sha512(salt: &[u8], ikm: &[u8], info: &[&[u8]], out: &mut [u8]) -> Result<(), CryptoError> {
    let prk = ring::hkdf::Salt::new(ring::hkdf::HKDF_SHA512, salt).extract(ikm);
    let okm = prk.expand(info, HkdfLen(out.len()))
        .map_err(|_| CryptoError::KeyDerivationFailed("HKDF expand failed".to_string()))?;
    okm.fill(out)
        .map_err(|_| CryptoError::KeyDerivationFailed("HKDF fill failed".to_string()))
}

/*
 * Cryptography module for the DHT block layer
 *
 * - SHA-512 hash codes used as DHT keys
 * - Ed25519 peer identities and signatures (HELLO blocks)
 * - Zone keys with label-based key blinding (GNS blocks)
 * - Symmetric encryption of GNS record sets bound to zone, label and expiration
 */
