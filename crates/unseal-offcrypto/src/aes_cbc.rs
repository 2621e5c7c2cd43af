use aes::{Aes128, Aes192, Aes256};
use cbc::Decryptor;
use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecrypt, BlockDecryptMut, BlockSizeUser, KeyInit, KeyIvInit};
use thiserror::Error;

pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AesCbcDecryptError {
    #[error("unsupported AES key length: {0} bytes (expected 16, 24, or 32)")]
    UnsupportedKeyLength(usize),
    #[error("invalid AES-CBC IV length: {0} bytes (expected 16)")]
    InvalidIvLength(usize),
    #[error("ciphertext length is not a multiple of 16 bytes: {0}")]
    InvalidCiphertextLength(usize),
}

/// Decrypt AES-CBC ciphertext without removing padding.
///
/// Agile encryption pre-pads every plaintext to whole blocks and records the semantic length
/// elsewhere, so the caller is responsible for truncation.
pub fn decrypt_aes_cbc_no_padding(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AesCbcDecryptError> {
    if iv.len() != AES_BLOCK_SIZE {
        return Err(AesCbcDecryptError::InvalidIvLength(iv.len()));
    }
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(AesCbcDecryptError::InvalidCiphertextLength(ciphertext.len()));
    }

    let mut buf = ciphertext.to_vec();
    if buf.is_empty() {
        return Ok(buf);
    }
    match key.len() {
        16 => decrypt_with::<Aes128>(key, iv, &mut buf)?,
        24 => decrypt_with::<Aes192>(key, iv, &mut buf)?,
        32 => decrypt_with::<Aes256>(key, iv, &mut buf)?,
        other => return Err(AesCbcDecryptError::UnsupportedKeyLength(other)),
    }
    Ok(buf)
}

fn decrypt_with<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), AesCbcDecryptError>
where
    C: BlockCipher + BlockDecrypt + BlockSizeUser<BlockSize = cipher::consts::U16> + KeyInit,
    Decryptor<C>: BlockDecryptMut + KeyIvInit,
{
    let len = buf.len();
    Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| AesCbcDecryptError::UnsupportedKeyLength(key.len()))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| AesCbcDecryptError::InvalidCiphertextLength(len))?;
    Ok(())
}
