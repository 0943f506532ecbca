//! # Cryptographic utilities — encrypting the state blob at rest
//!
//! The state blob is encrypted with **AES-256-GCM** under a per-session key.
//! The key is exported as a JSON Web Key so it can sit in session storage as a
//! plain string and be re-imported on every read and write, exactly like a
//! WebCrypto `exportKey("jwk")` / `importKey("jwk")` pair.
//!
//! ## Sealed format
//!
//! ```text
//! base64( nonce[12] ‖ ciphertext+tag )
//! ```
//!
//! Standard base64 alphabet with padding. A fresh random nonce is drawn for
//! every seal, so sealing the same plaintext twice gives different output.
//!
//! ## Public API
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`SessionKey::generate`] | Fresh random 256-bit key. |
//! | [`SessionKey::to_jwk`] / [`SessionKey::from_jwk`] | JWK export and import (`kty: "oct"`, `alg: "A256GCM"`). |
//! | [`SessionKey::seal`] / [`SessionKey::open`] | Encrypt a string to the sealed format and back. |
//! | [`CryptoSupport`] | Whether the AES-GCM facility is usable on this platform. |

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length of the AES-GCM nonce prepended to every ciphertext.
pub const NONCE_LEN: usize = 12;

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

const JWK_ALG: &str = "A256GCM";
const JWK_KTY: &str = "oct";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    KeyImport(String),
    #[error("failed to export key: {0}")]
    KeyExport(#[from] serde_json::Error),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("sealed value is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("sealed value too short: {0} bytes")]
    Truncated(usize),
    #[error("decrypted value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Availability of the symmetric cipher on this platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoSupport {
    Available,
    Unavailable,
}

impl CryptoSupport {
    /// Detect what the platform supports.
    ///
    /// Natively the cipher is compiled in and always usable. In the browser the
    /// random source comes from `window.crypto`, so its absence (old engines,
    /// some embedded webviews) makes encryption unavailable.
    pub fn detect() -> Self {
        #[cfg(all(target_arch = "wasm32", feature = "web"))]
        {
            let has_crypto = web_sys::window()
                .map(|w| w.crypto().is_ok())
                .unwrap_or(false);
            if has_crypto {
                Self::Available
            } else {
                Self::Unavailable
            }
        }
        #[cfg(not(all(target_arch = "wasm32", feature = "web")))]
        {
            Self::Available
        }
    }

    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

/// JSON Web Key representation of a symmetric key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub k: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default)]
    pub ext: bool,
    #[serde(default)]
    pub key_ops: Vec<String>,
}

/// A 256-bit AES-GCM key for one storage session.
#[derive(Clone)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn to_jwk(&self) -> JsonWebKey {
        JsonWebKey {
            kty: JWK_KTY.to_string(),
            k: URL_SAFE_NO_PAD.encode(self.bytes),
            alg: Some(JWK_ALG.to_string()),
            ext: true,
            key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
        }
    }

    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Self, CryptoError> {
        if jwk.kty != JWK_KTY {
            return Err(CryptoError::KeyImport(format!("unsupported kty {:?}", jwk.kty)));
        }
        if let Some(alg) = &jwk.alg {
            if alg != JWK_ALG {
                return Err(CryptoError::KeyImport(format!("unsupported alg {alg:?}")));
            }
        }
        let raw = URL_SAFE_NO_PAD
            .decode(jwk.k.trim_end_matches('='))
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            CryptoError::KeyImport(format!("expected {KEY_LEN} bytes, got {}", raw.len()))
        })?;
        Ok(Self { bytes })
    }

    /// Serialize the JWK to the string kept in session storage.
    pub fn export(&self) -> Result<String, CryptoError> {
        Ok(serde_json::to_string(&self.to_jwk())?)
    }

    /// Parse a JWK string previously produced by [`SessionKey::export`].
    pub fn import(exported: &str) -> Result<Self, CryptoError> {
        let jwk: JsonWebKey = serde_json::from_str(exported)
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        Self::from_jwk(&jwk)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.bytes))
    }

    /// Encrypt bytes with a random 12-byte nonce. Returns `nonce ‖ ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt `nonce ‖ ciphertext` produced by [`SessionKey::encrypt`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Truncated(sealed.len()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    /// Encrypt a UTF-8 string into the base64 sealed format.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.encrypt(plaintext.as_bytes())?))
    }

    /// Decode and decrypt a value produced by [`SessionKey::seal`].
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let bytes = STANDARD.decode(sealed)?;
        Ok(String::from_utf8(self.decrypt(&bytes)?)?)
    }
}
