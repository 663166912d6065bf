//! Symmetric encryption for record payloads and binary attachments
//!
//! Every payload is encrypted with AES-CBC under a key derived from the
//! session passphrase. The wire/disk form is `base64(IV || ciphertext)`.
//!
//! Padding appends `n` bytes of value `n` (a full block when the input is
//! already aligned). Empty input is left unpadded and encrypts to just the IV.
//! CBC carries no authentication: a wrong key decrypts to garbage, so callers
//! verify integrity themselves (see [`hash`]).

mod hash;
mod keys;

pub use hash::{content_hash, ContentKey, CONTENT_KEY_LEN};
pub use keys::{derive_key, KeyLength, SecretKey};

use crate::error::{Error, Result};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{
    block_padding::NoPadding, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use rand::RngCore;

/// AES block size, also the IV size
pub const BLOCK_SIZE: usize = 16;

/// Passphrase-keyed AES-CBC cipher
#[derive(Clone, Debug)]
pub struct Cipher {
    key: SecretKey,
}

impl Cipher {
    /// Derive the session key from a passphrase
    pub fn new(passphrase: &str, length: KeyLength) -> Self {
        Self {
            key: derive_key(passphrase, length),
        }
    }

    /// Key length in bytes
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Encrypt and encode as base64
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buf = pad(plaintext);
        match self.key.len() {
            16 => encrypt_blocks::<Aes128>(self.key.as_bytes(), &iv, &mut buf)?,
            24 => encrypt_blocks::<Aes192>(self.key.as_bytes(), &iv, &mut buf)?,
            32 => encrypt_blocks::<Aes256>(self.key.as_bytes(), &iv, &mut buf)?,
            other => return Err(Error::Crypto(format!("unsupported key length {}", other))),
        }

        let mut out = Vec::with_capacity(BLOCK_SIZE + buf.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        Ok(STANDARD.encode(out))
    }

    /// Decode and decrypt a value produced by [`Cipher::encrypt`]
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Crypto(format!("malformed ciphertext encoding: {}", e)))?;

        if raw.len() < BLOCK_SIZE {
            return Err(Error::Integrity("corrupt ciphertext".to_string()));
        }

        let (iv, body) = raw.split_at(BLOCK_SIZE);
        if body.len() % BLOCK_SIZE != 0 {
            return Err(Error::Integrity(
                "corrupt ciphertext: not a whole number of blocks".to_string(),
            ));
        }

        let mut buf = body.to_vec();
        match self.key.len() {
            16 => decrypt_blocks::<Aes128>(self.key.as_bytes(), iv, &mut buf)?,
            24 => decrypt_blocks::<Aes192>(self.key.as_bytes(), iv, &mut buf)?,
            32 => decrypt_blocks::<Aes256>(self.key.as_bytes(), iv, &mut buf)?,
            other => return Err(Error::Crypto(format!("unsupported key length {}", other))),
        }

        unpad(&mut buf);
        Ok(buf)
    }
}

fn encrypt_blocks<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let len = buf.len();
    cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length".to_string()))?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::Crypto("encryption failed".to_string()))?;
    Ok(())
}

fn decrypt_blocks<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto("invalid key or IV length".to_string()))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::Integrity("corrupt ciphertext".to_string()))?;
    Ok(())
}

fn pad(plaintext: &[u8]) -> Vec<u8> {
    if plaintext.is_empty() {
        return Vec::new();
    }
    let pad_len = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
    let mut buf = Vec::with_capacity(plaintext.len() + pad_len);
    buf.extend_from_slice(plaintext);
    buf.resize(plaintext.len() + pad_len, pad_len as u8);
    buf
}

// A pad length larger than the buffer means the input was never padded.
fn unpad(buf: &mut Vec<u8>) {
    if let Some(&last) = buf.last() {
        let pad_len = last as usize;
        if pad_len <= buf.len() {
            buf.truncate(buf.len() - pad_len);
        }
    }
}
