#[cfg(test)]
mod session_test;

use bytes::Bytes;
use util::marshal::{MarshalSize, Unmarshal};

use crate::algorithm::CipherAlgorithm;
use crate::cipher::{BLOCK_SIZE, IV_SEQUENCE_LEN};
use crate::engine::CryptoEngine;
use crate::error::{Error, Result};

/// Scratch large enough for an encrypted ethernet-sized payload.
const DEFAULT_FRAME_BUFFER_SIZE: usize = 1500;

/// RTP fixed header: padding flag lives in bit 5 of the first byte.
const RTP_PADDING_MASK: u8 = 0x20;

/// KeyAgreement hands the session the raw Diffie-Hellman shared secret
/// negotiated over the signalling channel. The key-encrypting key is taken
/// from its trailing bytes.
pub trait KeyAgreement {
    fn compute_shared_secret(&self) -> Result<Vec<u8>>;
}

/// Session binds two engines to one media stream: `media_context` carries
/// the RTP payloads, `dh_context` only ever wraps and unwraps the media
/// key. The master side generates the media key; the slave side receives it
/// wrapped under the DH-derived key.
pub struct Session {
    media_context: CryptoEngine,
    dh_context: CryptoEngine,
    media_key: Bytes,
    key_len: usize,
    is_master: bool,
    initialised: bool,
    frame_buffer: Vec<u8>,
}

impl Session {
    pub fn new(algorithm_oid: &str) -> Self {
        let key_len = match CipherAlgorithm::from_oid(algorithm_oid) {
            Ok(algorithm) => algorithm.key_len(),
            Err(_) => {
                log::warn!("unsupported algorithm {}, assuming AES-128", algorithm_oid);
                16
            }
        };

        Session {
            media_context: CryptoEngine::new(algorithm_oid),
            dh_context: CryptoEngine::new(algorithm_oid),
            media_key: Bytes::new(),
            key_len,
            is_master: false,
            initialised: false,
            frame_buffer: vec![0u8; DEFAULT_FRAME_BUFFER_SIZE],
        }
    }

    /// Derives the key-encrypting key from the DH shared secret and, on the
    /// master side, generates the media key.
    pub fn create(&mut self, is_master: bool, key_agreement: &dyn KeyAgreement) -> Result<()> {
        if self.initialised {
            return Err(Error::SessionAlreadyInitialised);
        }

        let secret = key_agreement.compute_shared_secret()?;
        if secret.len() < self.key_len {
            return Err(Error::ShortSharedSecret(self.key_len, secret.len()));
        }
        // the key-encrypting key is the right-aligned tail of the secret
        self.dh_context.set_key(&secret[secret.len() - self.key_len..])?;

        self.is_master = is_master;
        if is_master {
            self.media_key = self.media_context.generate_random_key()?;
            log::trace!("media key generated, {} bytes", self.media_key.len());
        }

        self.initialised = true;
        Ok(())
    }

    /// Wraps the media key under the KEK for the signalling channel. The IV
    /// is all zeros; a non-aligned key gets a padding block.
    pub fn encode_media_key(&mut self) -> Result<Bytes> {
        let mut padding = false;
        let wrapped = self
            .dh_context
            .encrypt(&self.media_key, None, &mut padding)?;
        log::trace!(
            "media key wrapped, {} -> {} bytes",
            self.media_key.len(),
            wrapped.len()
        );
        Ok(wrapped)
    }

    /// Unwraps a received media key and installs it into the media engine.
    pub fn decode_media_key(&mut self, wrapped: &[u8]) -> Result<()> {
        if !self.initialised {
            log::warn!("media key received before session setup");
            return Err(Error::SessionNotInitialised);
        }

        // mirror the sizing policy of the wrap side
        let mut padding = self.key_len % BLOCK_SIZE != 0;
        let key = self.dh_context.decrypt(wrapped, None, &mut padding)?;
        self.media_context.set_key(&key)?;
        self.media_key = key;
        log::trace!("media key unwrapped, {} bytes", self.media_key.len());
        Ok(())
    }

    /// The original interface reported activity as the inverse of
    /// initialisation; this one says what it means.
    pub fn is_ready(&self) -> bool {
        self.initialised
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    /// Decrypts a received RTP packet's payload. The padding bit travels
    /// into the engine and comes back cleared.
    pub fn read_frame(&mut self, packet: &mut rtp::packet::Packet) -> Result<()> {
        let iv_sequence = iv_sequence(&packet.header);
        let mut padding = packet.header.padding;
        packet.payload = self
            .media_context
            .decrypt(&packet.payload, Some(&iv_sequence), &mut padding)?;
        packet.header.padding = padding;
        Ok(())
    }

    /// Encrypts an outgoing RTP packet's payload and records whether the
    /// ciphertext carries padding.
    pub fn write_frame(&mut self, packet: &mut rtp::packet::Packet) -> Result<()> {
        let iv_sequence = iv_sequence(&packet.header);
        let mut padding = packet.header.padding;
        packet.payload = self
            .media_context
            .encrypt(&packet.payload, Some(&iv_sequence), &mut padding)?;
        packet.header.padding = padding;
        Ok(())
    }

    /// Decrypts a marshalled RTP frame through the scratch buffer. A frame
    /// that fails to decrypt is emptied, not fatal: the stream continues
    /// with the next one.
    pub fn read_frame_in_place(&mut self, frame: &mut Vec<u8>) -> Result<()> {
        let header = unmarshal_header(frame)?;
        let header_len = header.marshal_size();
        let iv_sequence = iv_sequence(&header);
        let mut padding = header.padding;

        let payload_len = frame.len() - header_len;
        self.reserve_scratch(payload_len);

        match self.media_context.decrypt_in_place(
            &frame[header_len..],
            &mut self.frame_buffer,
            Some(&iv_sequence),
            &mut padding,
        ) {
            Ok(n) => {
                frame.truncate(header_len + n);
                frame[header_len..].copy_from_slice(&self.frame_buffer[..n]);
                set_padding_bit(frame, padding);
            }
            Err(err) => {
                log::warn!("frame dropped, no usable payload: {}", err);
                frame.truncate(header_len);
                set_padding_bit(frame, false);
            }
        }
        Ok(())
    }

    /// Encrypts a marshalled RTP frame through the scratch buffer.
    pub fn write_frame_in_place(&mut self, frame: &mut Vec<u8>) -> Result<()> {
        let header = unmarshal_header(frame)?;
        let header_len = header.marshal_size();
        let iv_sequence = iv_sequence(&header);
        let mut padding = header.padding;

        let payload_len = frame.len() - header_len;
        self.reserve_scratch(payload_len);

        let n = self.media_context.encrypt_in_place(
            &frame[header_len..],
            &mut self.frame_buffer,
            Some(&iv_sequence),
            &mut padding,
        )?;

        frame.resize(header_len + n, 0);
        frame[header_len..].copy_from_slice(&self.frame_buffer[..n]);
        set_padding_bit(frame, padding);
        Ok(())
    }

    fn reserve_scratch(&mut self, payload_len: usize) {
        if self.frame_buffer.len() < payload_len + BLOCK_SIZE {
            self.frame_buffer.resize(payload_len + BLOCK_SIZE, 0);
        }
    }
}

/// Seed for the per-packet IV: sequence number and the leading timestamp
/// bytes, both in network order, exactly as they sit in the RTP header.
fn iv_sequence(header: &rtp::header::Header) -> [u8; IV_SEQUENCE_LEN] {
    let mut seq = [0u8; IV_SEQUENCE_LEN];
    seq[..2].copy_from_slice(&header.sequence_number.to_be_bytes());
    seq[2..].copy_from_slice(&header.timestamp.to_be_bytes()[..4]);
    seq
}

fn unmarshal_header(frame: &[u8]) -> Result<rtp::header::Header> {
    let mut buf = frame;
    Ok(rtp::header::Header::unmarshal(&mut buf)?)
}

fn set_padding_bit(frame: &mut [u8], padding: bool) {
    if let Some(b) = frame.first_mut() {
        if padding {
            *b |= RTP_PADDING_MASK;
        } else {
            *b &= !RTP_PADDING_MASK;
        }
    }
}
