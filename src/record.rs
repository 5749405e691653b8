//! On-disk record format and its pure encoder/decoder.
//!
//! A record is a self-delimiting, fixed-layout tuple:
//!
//! ```text
//! total_size (4, LE) | key_length (4, LE) | key | value_length (4, LE) | value | digest (20)
//! ```
//!
//! `total_size` is written first so a reader can size its buffer before
//! parsing the rest. The digest is SHA-1 over `key ++ 0x20 ++ value`.

use std::io::{self, Read};

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Width in bytes of the fixed-size header preceding `key`: `total_size` + `key_length`.
const HEADER_LEN: usize = 8;
/// Width in bytes of the trailing digest.
pub const DIGEST_LEN: usize = 20;

/// A single key/value record together with its integrity digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
    pub digest: [u8; DIGEST_LEN],
}

impl Record {
    /// Build a record, computing its digest from `key` and `value`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let digest = digest_of(&key, &value);
        Self { key, value, digest }
    }

    /// Total on-disk size of this record once encoded.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.key.len() + 4 + self.value.len() + DIGEST_LEN
    }

    /// Serialize `self` into its on-disk layout.
    pub fn encode(&self) -> Vec<u8> {
        let key_len = self.key.len() as u32;
        let value_len = self.value.len() as u32;
        let total_len = self.encoded_len() as u32;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&total_len.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(self.value.as_bytes());
        buf.extend_from_slice(&self.digest);
        buf
    }

    /// Parse a full record from `buf`, which must contain exactly
    /// `total_size` bytes as declared by its own header.
    ///
    /// Does NOT verify the digest; that is the caller's responsibility via
    /// [`Record::verify`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(corrupt("record shorter than header"));
        }
        let key_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let key_start = HEADER_LEN;
        let key_end = key_start
            .checked_add(key_len)
            .ok_or_else(|| corrupt("key length overflow"))?;
        if buf.len() < key_end + 4 {
            return Err(corrupt("buffer too short for key + value_length"));
        }
        let key = String::from_utf8(buf[key_start..key_end].to_vec()).map_err(|_| corrupt("key is not valid UTF-8"))?;

        let value_len = u32::from_le_bytes(buf[key_end..key_end + 4].try_into().unwrap()) as usize;
        let value_start = key_end + 4;
        let value_end = value_start
            .checked_add(value_len)
            .ok_or_else(|| corrupt("value length overflow"))?;
        let digest_end = value_end + DIGEST_LEN;
        if buf.len() < digest_end {
            return Err(corrupt("buffer too short for value + digest"));
        }
        let value =
            String::from_utf8(buf[value_start..value_end].to_vec()).map_err(|_| corrupt("value is not valid UTF-8"))?;

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&buf[value_end..digest_end]);

        Ok(Self { key, value, digest })
    }

    /// `true` if the stored digest matches `SHA1(key ++ " " ++ value)`.
    pub fn verify(&self) -> bool {
        self.digest == digest_of(&self.key, &self.value)
    }
}

/// SHA-1 of `key ++ 0x20 ++ value`.
pub fn digest_of(key: &str, value: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(b" ");
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

fn corrupt(reason: &str) -> Error {
    Error::CorruptFile {
        path: Default::default(),
        reason: reason.to_string(),
    }
}

/// Read just the value and digest of a record from `reader`, which must
/// already be positioned at the record's first byte (`total_size`).
///
/// Peeks the 8-byte header to learn `key_length`, skips the header and key,
/// reads `value_length`, then the value itself, then exactly
/// [`DIGEST_LEN`] digest bytes. A short read at any step is [`Error::CorruptFile`].
pub fn read_value_and_digest<R: Read>(reader: &mut R) -> Result<(String, [u8; DIGEST_LEN])> {
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_corrupt(reader, &mut header, "short read of record header")?;
    let key_len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

    skip_exact(reader, key_len)?;

    let mut value_len_buf = [0u8; 4];
    read_exact_or_corrupt(reader, &mut value_len_buf, "short read of value_length")?;
    let value_len = u32::from_le_bytes(value_len_buf) as usize;

    let mut value_buf = vec![0u8; value_len];
    read_exact_or_corrupt(reader, &mut value_buf, "short read of value bytes")?;
    let value = String::from_utf8(value_buf).map_err(|_| corrupt("value is not valid UTF-8"))?;

    let mut digest = [0u8; DIGEST_LEN];
    read_exact_or_corrupt(reader, &mut digest, "short read of digest")?;

    Ok((value, digest))
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], reason: &str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(corrupt(reason)),
        Err(e) => Err(e.into()),
    }
}

fn skip_exact<R: Read>(reader: &mut R, n: usize) -> Result<()> {
    let mut buf = vec![0u8; n];
    read_exact_or_corrupt(reader, &mut buf, "short read while skipping key bytes")
}
