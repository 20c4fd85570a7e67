//! Streaming AES-256-GCM encryption
//!
//! Archives are encrypted in the same pipeline that compresses them, so the
//! plaintext never reaches disk. The stream is cut into fixed-size chunks,
//! each sealed with its own nonce:
//!
//! ```text
//! header : MAGIC(8) | m_cost u32 | t_cost u32 | p u32 | salt_len u8 | salt | nonce_prefix(7)
//! chunk  : len u32 (high bit = last chunk) | ciphertext+tag
//! nonce  : nonce_prefix(7) | counter u32 | last-flag u8
//! ```
//!
//! The header is bound to every chunk as associated data. A stream that ends
//! before its last chunk, or carries data after it, fails to decrypt.

use std::io::{self, Read, Write};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

use super::key_derivation::{derive_key, KeyDerivationParams};
use super::secure_memory::Passphrase;
use crate::error::{EngineError, EngineResult};

/// Identifies an encrypted archive and its format version
const MAGIC: &[u8; 8] = b"BLCENC01";

/// Plaintext bytes per chunk
const CHUNK_SIZE: usize = 64 * 1024;

/// AES-GCM authentication tag size
const TAG_SIZE: usize = 16;

const NONCE_PREFIX_SIZE: usize = 7;

const LAST_CHUNK_BIT: u32 = 1 << 31;

fn build_nonce(prefix: &[u8; NONCE_PREFIX_SIZE], counter: u32, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..11].copy_from_slice(&counter.to_be_bytes());
    nonce[11] = last as u8;
    nonce
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn encode_header(params: &KeyDerivationParams, prefix: &[u8; NONCE_PREFIX_SIZE]) -> EngineResult<Vec<u8>> {
    let salt = params.salt.as_bytes();
    let salt_len = u8::try_from(salt.len())
        .map_err(|_| EngineError::Encryption("Salt too long".into()))?;

    let mut header = Vec::with_capacity(MAGIC.len() + 13 + salt.len() + NONCE_PREFIX_SIZE);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&params.memory_cost.to_be_bytes());
    header.extend_from_slice(&params.time_cost.to_be_bytes());
    header.extend_from_slice(&params.parallelism.to_be_bytes());
    header.push(salt_len);
    header.extend_from_slice(salt);
    header.extend_from_slice(prefix);
    Ok(header)
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn decode_header<R: Read>(
    reader: &mut R,
) -> io::Result<(KeyDerivationParams, [u8; NONCE_PREFIX_SIZE], Vec<u8>)> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid_data("not an encrypted backup archive"));
    }

    let memory_cost = read_u32(reader)?;
    let time_cost = read_u32(reader)?;
    let parallelism = read_u32(reader)?;

    let mut salt_len = [0u8; 1];
    reader.read_exact(&mut salt_len)?;
    let mut salt = vec![0u8; salt_len[0] as usize];
    reader.read_exact(&mut salt)?;
    let salt = String::from_utf8(salt).map_err(|_| invalid_data("salt is not valid UTF-8"))?;

    let mut prefix = [0u8; NONCE_PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;

    let params = KeyDerivationParams::with_values(salt, memory_cost, time_cost, parallelism);
    params.check_bounds().map_err(invalid_data)?;
    let header = encode_header(&params, &prefix).map_err(|e| invalid_data(e.to_string()))?;
    Ok((params, prefix, header))
}

/// Writer that seals everything written through it
///
/// [`EncryptingWriter::finish`] must be called to emit the final chunk; a
/// stream dropped without it reads back as truncated.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: Aes256Gcm,
    header: Vec<u8>,
    prefix: [u8; NONCE_PREFIX_SIZE],
    counter: u32,
    buffer: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    /// Derive a key and write the stream header
    pub fn new(mut inner: W, passphrase: &Passphrase, params: &KeyDerivationParams) -> EngineResult<Self> {
        let key = derive_key(passphrase, params)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| EngineError::Encryption(format!("Failed to create cipher: {}", e)))?;

        let mut prefix = [0u8; NONCE_PREFIX_SIZE];
        OsRng.fill_bytes(&mut prefix);

        let header = encode_header(params, &prefix)?;
        inner
            .write_all(&header)
            .map_err(|e| EngineError::Io(format!("Failed to write encryption header: {}", e)))?;

        Ok(Self {
            inner,
            cipher,
            header,
            prefix,
            counter: 0,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    fn seal_chunk(&mut self, len: usize, last: bool) -> io::Result<()> {
        if self.counter == u32::MAX {
            return Err(invalid_data("encrypted stream too long"));
        }

        let nonce = build_nonce(&self.prefix, self.counter, last);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &self.buffer[..len],
                    aad: &self.header,
                },
            )
            .map_err(|_| invalid_data("encryption failed"))?;

        let mut len_field = ciphertext.len() as u32;
        if last {
            len_field |= LAST_CHUNK_BIT;
        }
        self.inner.write_all(&len_field.to_be_bytes())?;
        self.inner.write_all(&ciphertext)?;

        self.buffer.drain(..len);
        self.counter += 1;
        Ok(())
    }

    /// Seal the final chunk and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        let remaining = self.buffer.len();
        self.seal_chunk(remaining, true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= CHUNK_SIZE {
            self.seal_chunk(CHUNK_SIZE, false)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that authenticates and decrypts a sealed stream
pub struct DecryptingReader<R: Read> {
    inner: R,
    cipher: Aes256Gcm,
    header: Vec<u8>,
    prefix: [u8; NONCE_PREFIX_SIZE],
    counter: u32,
    plain: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> DecryptingReader<R> {
    /// Read the header and derive the key
    ///
    /// A wrong passphrase is only detected when the first chunk is read.
    pub fn new(mut inner: R, passphrase: &Passphrase) -> EngineResult<Self> {
        let (params, prefix, header) = decode_header(&mut inner)
            .map_err(|e| EngineError::Integrity(format!("Unreadable encryption header: {}", e)))?;

        let key = derive_key(passphrase, &params)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| EngineError::Encryption(format!("Failed to create cipher: {}", e)))?;

        Ok(Self {
            inner,
            cipher,
            header,
            prefix,
            counter: 0,
            plain: Vec::new(),
            pos: 0,
            done: false,
        })
    }

    fn open_next_chunk(&mut self) -> io::Result<()> {
        let len_field = read_u32(&mut self.inner).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid_data("encrypted stream is truncated"),
            _ => e,
        })?;

        let last = len_field & LAST_CHUNK_BIT != 0;
        let len = (len_field & !LAST_CHUNK_BIT) as usize;
        if len < TAG_SIZE || len > CHUNK_SIZE + TAG_SIZE {
            return Err(invalid_data(format!("invalid chunk length {}", len)));
        }

        let mut ciphertext = vec![0u8; len];
        self.inner.read_exact(&mut ciphertext).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid_data("encrypted stream is truncated"),
            _ => e,
        })?;

        let nonce = build_nonce(&self.prefix, self.counter, last);
        self.plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &self.header,
                },
            )
            .map_err(|_| invalid_data("decryption failed: wrong passphrase or corrupted data"))?;
        self.pos = 0;
        self.counter = self.counter.wrapping_add(1);

        if last {
            let mut probe = [0u8; 1];
            if self.inner.read(&mut probe)? != 0 {
                return Err(invalid_data("unexpected data after final chunk"));
            }
            self.done = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.plain.len() {
            if self.done {
                return Ok(0);
            }
            self.open_next_chunk()?;
        }

        let n = buf.len().min(self.plain.len() - self.pos);
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::fast_settings;

    fn params() -> KeyDerivationParams {
        KeyDerivationParams::generate(&fast_settings())
    }

    fn seal(plaintext: &[u8], passphrase: &str) -> Vec<u8> {
        let mut writer =
            EncryptingWriter::new(Vec::new(), &Passphrase::new(passphrase), &params()).unwrap();
        writer.write_all(plaintext).unwrap();
        writer.finish().unwrap()
    }

    fn open(sealed: &[u8], passphrase: &str) -> io::Result<Vec<u8>> {
        let mut reader = DecryptingReader::new(sealed, &Passphrase::new(passphrase))
            .map_err(|e| invalid_data(e.to_string()))?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_multi_chunk_stream() {
        let plaintext: Vec<u8> = (0..(CHUNK_SIZE * 2 + 123)).map(|i| (i % 251) as u8).collect();
        let sealed = seal(&plaintext, "pw");
        assert_eq!(open(&sealed, "pw").unwrap(), plaintext);
    }

    #[test]
    fn test_empty_stream() {
        let sealed = seal(b"", "pw");
        assert!(open(&sealed, "pw").unwrap().is_empty());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = seal(b"workflow data", "right");
        assert!(open(&sealed, "wrong").is_err());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let plaintext = vec![7u8; CHUNK_SIZE + 10];
        let sealed = seal(&plaintext, "pw");

        // Cut exactly at a chunk boundary: every remaining chunk authenticates
        let first_chunk_end = sealed.len() - (4 + 10 + TAG_SIZE);
        assert!(open(&sealed[..first_chunk_end], "pw").is_err());
        assert!(open(&sealed[..sealed.len() / 2], "pw").is_err());
    }

    #[test]
    fn test_trailing_data_fails() {
        let mut sealed = seal(b"data", "pw");
        sealed.push(0);
        assert!(open(&sealed, "pw").is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = seal(b"Hello, World!", "pw");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(open(&sealed, "pw").is_err());
    }

    #[test]
    fn test_corrupt_kdf_header_is_rejected() {
        // Offsets 8..20 hold m_cost, t_cost and p
        for offset in [8, 12, 16] {
            let mut sealed = seal(b"workflow data", "pw");
            sealed[offset] = 0xFF;
            let err = DecryptingReader::new(&sealed[..], &Passphrase::new("pw"))
                .err()
                .unwrap();
            assert!(err.is_integrity(), "offset {}: {}", offset, err);
        }
    }

    #[test]
    fn test_zero_costs_are_rejected() {
        let mut sealed = seal(b"workflow data", "pw");
        sealed[12..16].copy_from_slice(&0u32.to_be_bytes());
        assert!(DecryptingReader::new(&sealed[..], &Passphrase::new("pw")).is_err());
    }

    #[test]
    fn test_not_encrypted_input() {
        let result = DecryptingReader::new(&b"plain zstd bytes here"[..], &Passphrase::new("pw"));
        assert!(result.err().unwrap().is_integrity());
    }
}
