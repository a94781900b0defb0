//! Encryption of secrets stored in the database (currently the SMTP password).
//!
//! Values are encrypted with AES-256-GCM under the configured `encryption_key` and stored as
//! base64 of `nonce || ciphertext`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose};

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    /// Build a cipher from a base64-encoded 32 byte key.
    pub fn from_base64_key(key_b64: &str) -> anyhow::Result<Self> {
        let key_bytes = general_purpose::STANDARD
            .decode(key_b64)
            .map_err(|e| anyhow::anyhow!("Failed to decode encryption key: {}", e))?;

        if key_bytes.len() != 32 {
            anyhow::bail!("Encryption key must be 32 bytes (256 bits), got {} bytes", key_bytes.len());
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(result))
    }

    pub fn decrypt(&self, encrypted_b64: &str) -> anyhow::Result<String> {
        let data = general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|e| anyhow::anyhow!("Failed to decode encrypted data: {}", e))?;

        if data.len() < NONCE_LEN {
            anyhow::bail!("Encrypted data too short");
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("Decrypted secret is not valid UTF-8: {}", e))
    }
}
