
use bytes::Bytes;
use rand::Rng;

use crate::algorithm::CipherAlgorithm;
use crate::cipher::cts::CtsBuffer;
use crate::cipher::{build_iv, CipherContext, Direction, Mode, BLOCK_SIZE, IV_LEN, IV_SEQUENCE_LEN};
use crate::error::{Error, Result};

/// CryptoEngine drives media encryption for one algorithm and one
/// direction-pair: an encrypt context and a decrypt context keyed with the
/// same key, each with its own staging buffer. One engine per media
/// direction per call leg; a single owner issues all calls.
pub struct CryptoEngine {
    algorithm_oid: String,
    algorithm: Option<CipherAlgorithm>,
    encrypt_ctx: Option<CipherContext>,
    decrypt_ctx: Option<CipherContext>,
    encrypt_helper: CtsBuffer,
    decrypt_helper: CtsBuffer,
    initialised: bool,
}

impl CryptoEngine {
    /// Creates an engine for a negotiated algorithm OID. An unknown OID is
    /// tolerated here; every keyed operation on such an engine fails.
    pub fn new(algorithm_oid: &str) -> Self {
        let algorithm = CipherAlgorithm::from_oid(algorithm_oid).ok();
        if algorithm.is_none() {
            log::warn!("unsupported algorithm {}", algorithm_oid);
        }
        CryptoEngine {
            algorithm_oid: algorithm_oid.to_owned(),
            algorithm,
            encrypt_ctx: None,
            decrypt_ctx: None,
            encrypt_helper: CtsBuffer::new(),
            decrypt_helper: CtsBuffer::new(),
            initialised: false,
        }
    }

    /// Creates an engine and installs a key in one step.
    pub fn with_key(algorithm_oid: &str, key: &[u8]) -> Result<Self> {
        let mut engine = CryptoEngine::new(algorithm_oid);
        engine.set_key(key)?;
        Ok(engine)
    }

    /// Installs a key of exactly the algorithm's length and (re)builds both
    /// cipher contexts. Packet-level IVs are installed per call; repeated
    /// `set_key` is a clean reset, not a reconstruction.
    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        let algorithm = self
            .algorithm
            .ok_or_else(|| Error::UnsupportedAlgorithm(self.algorithm_oid.clone()))?;

        self.initialised = false;

        self.encrypt_ctx = Some(CipherContext::new(
            algorithm,
            key,
            Direction::Encrypt,
            Mode::Cbc,
        )?);
        self.encrypt_helper.reset();

        self.decrypt_ctx = Some(CipherContext::new(
            algorithm,
            key,
            Direction::Decrypt,
            Mode::Cbc,
        )?);
        self.decrypt_helper.reset();

        self.initialised = true;
        Ok(())
    }

    /// Generates a random key for the engine's own algorithm, installs it
    /// and hands it back for distribution to the peer.
    pub fn generate_random_key(&mut self) -> Result<Bytes> {
        let key = CryptoEngine::random_key(&self.algorithm_oid)?;
        self.set_key(&key)?;
        Ok(key)
    }

    /// Generates a random key sized for the given algorithm OID.
    pub fn random_key(algorithm_oid: &str) -> Result<Bytes> {
        let algorithm = CipherAlgorithm::from_oid(algorithm_oid)?;
        let mut key = vec![0u8; algorithm.key_len()];
        rand::thread_rng().fill(key.as_mut_slice());
        Ok(Bytes::from(key))
    }

    pub fn is_ready(&self) -> bool {
        self.initialised
    }

    pub fn algorithm_oid(&self) -> &str {
        &self.algorithm_oid
    }

    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn iv_len(&self) -> usize {
        IV_LEN
    }

    /// Encrypts one packet payload. `padding` is set for the caller: raised
    /// when the payload is not block-aligned (the ciphertext then carries a
    /// PKCS#7 block), cleared when it is.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<Bytes> {
        let mut out = vec![0u8; plaintext.len() + BLOCK_SIZE];
        let n = self.encrypt_into(plaintext, &mut out, iv_sequence, padding)?;
        out.truncate(n);
        Ok(Bytes::from(out))
    }

    /// Decrypts one packet payload. `padding` carries the peer's RTP
    /// padding bit in; it is cleared on return because the plaintext length
    /// is exact.
    pub fn decrypt(
        &mut self,
        ciphertext: &[u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<Bytes> {
        let mut out = vec![0u8; ciphertext.len() + BLOCK_SIZE];
        let n = self.decrypt_into(ciphertext, &mut out, iv_sequence, padding)?;
        out.truncate(n);
        Ok(Bytes::from(out))
    }

    /// In-place form of [`CryptoEngine::encrypt`]: writes into a caller
    /// buffer of at least `plaintext.len() + block_size` bytes and returns
    /// the byte count produced.
    pub fn encrypt_in_place(
        &mut self,
        plaintext: &[u8],
        out: &mut [u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<usize> {
        if out.len() < plaintext.len() + BLOCK_SIZE {
            return Err(Error::ShortOutputBuffer(
                plaintext.len() + BLOCK_SIZE,
                out.len(),
            ));
        }
        self.encrypt_into(plaintext, out, iv_sequence, padding)
    }

    /// In-place form of [`CryptoEngine::decrypt`]. Any ciphertext-stealing
    /// or padding failure surfaces as an error; the caller drops the frame.
    pub fn decrypt_in_place(
        &mut self,
        ciphertext: &[u8],
        out: &mut [u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<usize> {
        if out.len() < ciphertext.len() + BLOCK_SIZE {
            return Err(Error::ShortOutputBuffer(
                ciphertext.len() + BLOCK_SIZE,
                out.len(),
            ));
        }
        self.decrypt_into(ciphertext, out, iv_sequence, padding)
    }

    fn encrypt_into(
        &mut self,
        plaintext: &[u8],
        out: &mut [u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<usize> {
        if !self.initialised {
            return Err(Error::NotInitialised);
        }
        let ctx = self.encrypt_ctx.as_mut().ok_or(Error::NotInitialised)?;

        let mut iv = [0u8; IV_LEN];
        build_iv(&mut iv, iv_sequence);
        ctx.set_iv(&iv);
        self.encrypt_helper.reset();

        // Always pad short payloads: peers do not accept ciphertext
        // stealing on the encrypt side.
        *padding = plaintext.len() % BLOCK_SIZE != 0;
        ctx.set_padding(*padding);

        let mut n;
        if !*padding && plaintext.len() % BLOCK_SIZE != 0 {
            // unreachable with the padding policy above; kept so the
            // framing stays available if a profile ever asks for it
            n = self.encrypt_helper.update_cts(ctx, out, plaintext)?;
            n += self.encrypt_helper.finish_cts(ctx, &mut out[n..])?;
        } else {
            n = self.encrypt_helper.update(ctx, out, plaintext)?;
            n += self.encrypt_helper.finish(ctx, &mut out[n..])?;
        }
        Ok(n)
    }

    fn decrypt_into(
        &mut self,
        ciphertext: &[u8],
        out: &mut [u8],
        iv_sequence: Option<&[u8; IV_SEQUENCE_LEN]>,
        padding: &mut bool,
    ) -> Result<usize> {
        if !self.initialised {
            return Err(Error::NotInitialised);
        }
        let ctx = self.decrypt_ctx.as_mut().ok_or(Error::NotInitialised)?;

        let mut iv = [0u8; IV_LEN];
        build_iv(&mut iv, iv_sequence);
        ctx.set_iv(&iv);
        self.decrypt_helper.reset();

        ctx.set_padding(*padding);

        let mut n;
        if !*padding && ciphertext.len() % BLOCK_SIZE != 0 {
            // a peer that signalled no padding on a non-aligned payload
            // used ciphertext stealing
            n = self.decrypt_helper.decrypt_update_cts(ctx, out, ciphertext)?;
            n += self.decrypt_helper.decrypt_finish_cts(ctx, &mut out[n..])?;
        } else {
            n = self.decrypt_helper.decrypt_update(ctx, out, ciphertext)?;
            n += self
                .decrypt_helper
                .decrypt_finish_relaxed(ctx, &mut out[n..])?;
        }

        // the plaintext length is exact, no padding survives decryption
        *padding = false;
        Ok(n)
    }
}
