pub(crate) mod cts;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};

use crate::algorithm::CipherAlgorithm;
use crate::error::{Error, Result};

pub(crate) const BLOCK_SIZE: usize = 16;
pub(crate) const IV_LEN: usize = 16;

/// The per-packet IV material is always 6 bytes: the 2-byte RTP sequence
/// number followed by the first 4 bytes of the timestamp.
pub(crate) const IV_SEQUENCE_LEN: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Encrypt,
    Decrypt,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Cbc,
    Ecb,
}

enum AesCore {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesCore {
    fn new(algorithm: CipherAlgorithm, key: &[u8]) -> Result<Self> {
        if key.len() != algorithm.key_len() {
            return Err(Error::KeyLength(algorithm.key_len(), key.len()));
        }
        Ok(match algorithm {
            CipherAlgorithm::Aes128 => AesCore::Aes128(Aes128::new(GenericArray::from_slice(key))),
            CipherAlgorithm::Aes192 => AesCore::Aes192(Aes192::new(GenericArray::from_slice(key))),
            CipherAlgorithm::Aes256 => AesCore::Aes256(Aes256::new(GenericArray::from_slice(key))),
        })
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesCore::Aes128(c) => c.encrypt_block(block),
            AesCore::Aes192(c) => c.encrypt_block(block),
            AesCore::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesCore::Aes128(c) => c.decrypt_block(block),
            AesCore::Aes192(c) => c.decrypt_block(block),
            AesCore::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// CipherContext is a keyed, directional block pass: AES with CBC chaining
/// state held in the context, re-pointed at a fresh IV for every packet.
/// The running IV is readable because the ciphertext-stealing final pass
/// for decryption has to XOR against the next-to-last cipher block.
pub(crate) struct CipherContext {
    core: AesCore,
    direction: Direction,
    mode: Mode,
    iv: [u8; IV_LEN],
    padding: bool,
}

impl CipherContext {
    pub fn new(
        algorithm: CipherAlgorithm,
        key: &[u8],
        direction: Direction,
        mode: Mode,
    ) -> Result<Self> {
        Ok(CipherContext {
            core: AesCore::new(algorithm, key)?,
            direction,
            mode,
            iv: [0u8; IV_LEN],
            padding: false,
        })
    }

    /// Re-initialises the chain for the next packet. The key is untouched.
    pub fn set_iv(&mut self, iv: &[u8; IV_LEN]) {
        self.iv = *iv;
    }

    /// Current chain value: after n blocks this is the n-th cipher block.
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn set_padding(&mut self, padding: bool) {
        self.padding = padding;
    }

    pub fn padding(&self) -> bool {
        self.padding
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Runs whole blocks through the cipher. `input.len()` must be a
    /// multiple of the block size and `out` at least as long.
    pub fn cipher_blocks(&mut self, input: &[u8], out: &mut [u8]) -> Result<()> {
        if input.len() % BLOCK_SIZE != 0 {
            return Err(Error::NotBlockAligned);
        }
        if out.len() < input.len() {
            return Err(Error::ShortOutputBuffer(input.len(), out.len()));
        }

        for (inb, outb) in input
            .chunks_exact(BLOCK_SIZE)
            .zip(out.chunks_exact_mut(BLOCK_SIZE))
        {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(inb);

            match (self.direction, self.mode) {
                (Direction::Encrypt, Mode::Cbc) => {
                    for (b, ivb) in block.iter_mut().zip(self.iv.iter()) {
                        *b ^= ivb;
                    }
                    self.core.encrypt_block(&mut block);
                    self.iv.copy_from_slice(&block);
                }
                (Direction::Decrypt, Mode::Cbc) => {
                    self.core.decrypt_block(&mut block);
                    for (b, ivb) in block.iter_mut().zip(self.iv.iter()) {
                        *b ^= ivb;
                    }
                    self.iv.copy_from_slice(inb);
                }
                (Direction::Encrypt, Mode::Ecb) => self.core.encrypt_block(&mut block),
                (Direction::Decrypt, Mode::Ecb) => self.core.decrypt_block(&mut block),
            }

            outb.copy_from_slice(&block);
        }

        Ok(())
    }
}

/// Expands the 6-byte per-packet seed into a cipher IV by tiling it until
/// the IV length is reached, with a truncated copy at the end. No seed
/// means an all-zero IV (used when wrapping the media key). The layout is
/// a contract with peer endpoints.
pub(crate) fn build_iv(iv: &mut [u8], iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>) {
    match iv_sequence {
        Some(seq) => {
            for chunk in iv.chunks_mut(IV_SEQUENCE_LEN) {
                chunk.copy_from_slice(&seq[..chunk.len()]);
            }
        }
        None => iv.fill(0),
    }
}
