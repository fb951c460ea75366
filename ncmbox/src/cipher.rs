use aes::Aes128;
use ecb::cipher::block_padding::{Pkcs7, UnpadError};
use ecb::cipher::{BlockDecryptMut, KeyInit};

use crate::error::{NcmError, Result};

type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// AES key unlocking every container's key blob.
pub(crate) const CORE_KEY: [u8; 16] = *b"hzHRAmso5kInbaxW";

/// AES key unlocking the metadata blob.
pub(crate) const META_KEY: [u8; 16] = *b"#14ljk_!\\]&0U<'(";

/// Application signature prefixed to the per-file key inside the blob.
const KEY_SIGNATURE: &[u8] = b"neteasecloudmusic";

/// XOR mask applied to the key blob on disk.
const KEY_MASK: u8 = 0x64;

/// AES-128-ECB decrypt with PKCS#7 unpadding.
pub(crate) fn aes128_ecb_decrypt(
    key: &[u8; 16],
    data: &[u8],
) -> std::result::Result<Vec<u8>, UnpadError> {
    let mut buf = data.to_vec();
    Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map(<[u8]>::to_vec)
}

/// Recover the per-file content key from the container's key blob.
///
/// A wrong application key surfaces either as an unpad failure or as a
/// missing signature; both are [`NcmError::UnexpectedKeyFormat`], since
/// decoding audio with a wrong key would only produce garbage.
pub fn recover_content_key(key_blob: &[u8]) -> Result<Vec<u8>> {
    let masked: Vec<u8> = key_blob.iter().map(|b| b ^ KEY_MASK).collect();
    let decrypted =
        aes128_ecb_decrypt(&CORE_KEY, &masked).map_err(|_| NcmError::UnexpectedKeyFormat)?;
    let content_key = decrypted
        .strip_prefix(KEY_SIGNATURE)
        .ok_or(NcmError::UnexpectedKeyFormat)?;
    if content_key.is_empty() {
        return Err(NcmError::UnexpectedKeyFormat);
    }
    Ok(content_key.to_vec())
}

/// Substitution table driving the positional stream cipher.
///
/// Derived once per file from the recovered content key and never shared
/// or cached. Decryption of a payload byte is a pure function of the
/// byte's absolute offset and this table, so the payload may be processed
/// in chunks of any size without changing the output.
pub struct KeyBox([u8; 256]);

impl KeyBox {
    /// Run the key schedule: an identity permutation shuffled by a
    /// running index fed from the cycled key bytes.
    ///
    /// `content_key` must be non-empty; [`recover_content_key`] never
    /// yields an empty key.
    #[allow(clippy::cast_possible_truncation)]
    pub fn derive(content_key: &[u8]) -> Self {
        assert!(!content_key.is_empty(), "empty content key");
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut last = 0u8;
        let mut key_pos = 0usize;
        for i in 0..256 {
            let swap = table[i];
            let c = swap.wrapping_add(last).wrapping_add(content_key[key_pos]);
            key_pos += 1;
            if key_pos >= content_key.len() {
                key_pos = 0;
            }
            table[i] = table[c as usize];
            table[c as usize] = swap;
            last = c;
        }
        Self(table)
    }

    /// Keystream byte for the payload byte at absolute `offset`.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn stream_byte(&self, offset: u64) -> u8 {
        let table = &self.0;
        let j = ((offset + 1) & 0xff) as usize;
        let a = table[j] as usize;
        table[(a + table[(a + j) & 0xff] as usize) & 0xff]
    }

    /// XOR a chunk in place. `offset` is the absolute payload position of
    /// `buf[0]`; the same call both encrypts and decrypts.
    pub fn apply(&self, offset: u64, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte ^= self.stream_byte(offset + i as u64);
        }
    }
}
