use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use log::info;

use crate::settings::ServerConfig;

const KEY_FILE: &str = ".encryption_key";
const NONCE_LEN: usize = 12;

/// Passwords encrypted at rest with AES-256-GCM, one file per login, keyed by
/// a locally generated key stored next to them.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CredentialStore { dir: dir.into() }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key_path = self.dir.join(KEY_FILE);
        let key_bytes = if key_path.exists() {
            fs::read(&key_path)?
        } else {
            let mut key_bytes = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut key_bytes);
            fs::create_dir_all(&self.dir)?;
            fs::write(&key_path, &key_bytes)?;
            key_bytes
        };
        Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create cipher from key: {}", e))
    }

    fn password_path(&self, login: &str) -> PathBuf {
        let file_name: String = login
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!(".password_{}", file_name))
    }

    pub fn encrypt_password(&self, password: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, password.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encrypt password: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    pub fn decrypt_password(&self, encrypted: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let combined = BASE64.decode(encrypted.trim())
            .map_err(|e| anyhow::anyhow!("Failed to decode base64: {}", e))?;
        if combined.len() <= NONCE_LEN {
            bail!("Stored password is truncated");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Failed to decrypt password: {}", e))?;

        String::from_utf8(plaintext)
            .map_err(|e| anyhow::anyhow!("Failed to convert decrypted bytes to string: {}", e))
    }

    /// The stored password for `login`, or the one `prompt` returns, which is
    /// then stored for next time.
    pub fn password_or_else<F>(&self, login: &str, prompt: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        let password_path = self.password_path(login);
        if password_path.exists() {
            let encrypted = fs::read_to_string(&password_path)?;
            return self.decrypt_password(&encrypted);
        }

        let password = prompt()?;
        let encrypted = self.encrypt_password(&password)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&password_path, encrypted)?;
        info!("Stored encrypted password for {}", login);
        Ok(password)
    }

    /// Fills in `server.password` from the store, prompting on the terminal
    /// the first time.
    pub fn resolve(&self, server: &mut ServerConfig) -> Result<()> {
        if server.password.is_some() {
            return Ok(());
        }
        let prompt = format!("Enter the password for {}@{}: ", server.user_name, server.host);
        let password = self.password_or_else(&server.user_name, || {
            Ok(rpassword::prompt_password(&prompt)?)
        })?;
        server.password = Some(password);
        Ok(())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        CredentialStore::new(Path::new("."))
    }
}
