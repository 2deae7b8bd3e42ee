use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};
use async_trait::async_trait;
use chacha20poly1305::aead::{AeadMutInPlace, Key, Nonce};
use chacha20poly1305::{AeadCore, KeyInit, XChaCha20Poly1305, aead::Aead};
use kaspa_bip32::{Language, Mnemonic};
use kernel_common::traits::{CredentialStore, Session};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

const NONCE_SIZE: usize = 24;
pub const KEY_FILE_VERSION: i32 = 1;

/// Mirrors the reference wallet's `Keys`/`EncryptedMnemonic` file shape: one
/// argon2id-derived XChaCha20-Poly1305 key wrapping a single mnemonic phrase.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedMnemonic {
    cipher: String,
    salt: String,
}

impl EncryptedMnemonic {
    fn decrypt(&self, password: &str) -> Result<String, String> {
        let salt = SaltString::from_b64(&self.salt).map_err(|e| e.to_string())?;
        let argon2 = Argon2::default();
        let password_hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| e.to_string())?;
        let hash = password_hash.hash.ok_or("argon2 produced no output")?;
        let key = Key::<XChaCha20Poly1305>::from_slice(hash.as_bytes());
        let mut cipher = XChaCha20Poly1305::new(key);

        let cipher_bytes = hex::decode(&self.cipher).map_err(|e| e.to_string())?;
        if cipher_bytes.len() < NONCE_SIZE {
            return Err("ciphertext shorter than nonce".to_string());
        }
        let (nonce_bytes, cipher_text) = cipher_bytes.split_at(NONCE_SIZE);
        let mut cipher_text = cipher_text.to_vec();
        let nonce = Nonce::<XChaCha20Poly1305>::from_slice(nonce_bytes);
        cipher.decrypt_in_place(nonce, &[], &mut cipher_text).map_err(|e| format!("decryption failed: {e}"))?;

        String::from_utf8(cipher_text).map_err(|e| e.to_string())
    }

    pub fn encrypt(phrase: &str, password: &str) -> Result<Self, String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| e.to_string())?;
        let hash = password_hash.hash.ok_or("argon2 produced no output")?;
        let key = Key::<XChaCha20Poly1305>::from_slice(hash.as_bytes());
        let cipher = XChaCha20Poly1305::new(key);
        let nonce = XChaCha20Poly1305::generate_nonce(OsRng);

        let mut buffer = cipher.encrypt(&nonce, phrase.as_bytes()).map_err(|e| format!("encryption failed: {e}"))?;
        let mut out = nonce.to_vec();
        out.append(&mut buffer);

        Ok(EncryptedMnemonic { cipher: hex::encode(out), salt: salt.to_string() })
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct KeysFile {
    version: i32,
    encrypted_mnemonic: EncryptedMnemonic,
    derivation_path: String,
    address: String,
}

/// File-backed `CredentialStore` (§4.6 ADDED): holds an encrypted mnemonic on
/// disk and an in-memory `Session` only while unlocked. Never logs the
/// mnemonic or password.
pub struct FileCredentialStore {
    file_path: String,
    keys: KeysFile,
    session: RwLock<Option<Session>>,
}

impl FileCredentialStore {
    pub async fn load(file_path: &str) -> Result<Self, String> {
        let raw = tokio::fs::read_to_string(file_path).await.map_err(|e| format!("reading {file_path}: {e}"))?;
        let keys: KeysFile = serde_json::from_str(&raw).map_err(|e| format!("parsing {file_path}: {e}"))?;
        Ok(Self { file_path: file_path.to_string(), keys, session: RwLock::new(None) })
    }

    pub async fn create(file_path: &str, phrase: &str, password: &str, derivation_path: &str, address: &str) -> Result<Self, String> {
        let encrypted_mnemonic = EncryptedMnemonic::encrypt(phrase, password)?;
        let keys = KeysFile {
            version: KEY_FILE_VERSION,
            encrypted_mnemonic,
            derivation_path: derivation_path.to_string(),
            address: address.to_string(),
        };
        let serialized = serde_json::to_string_pretty(&keys).map_err(|e| e.to_string())?;
        if let Some(parent) = Path::new(file_path).parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        tokio::fs::write(file_path, serialized).await.map_err(|e| e.to_string())?;
        Ok(Self { file_path: file_path.to_string(), keys, session: RwLock::new(None) })
    }

    pub async fn unlock(&self, password: &str) -> Result<(), String> {
        let phrase = self.keys.encrypted_mnemonic.decrypt(password)?;
        // Validates the phrase is well-formed before accepting it as a session.
        Mnemonic::new(phrase.as_str(), Language::English).map_err(|e| format!("invalid mnemonic: {e}"))?;
        *self.session.write().await = Some(Session {
            mnemonic: phrase,
            passphrase: None,
            derivation_path: self.keys.derivation_path.clone(),
            address: self.keys.address.clone(),
        });
        Ok(())
    }

    pub async fn lock(&self) {
        *self.session.write().await = None;
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}
