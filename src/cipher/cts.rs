
use super::{CipherContext, Mode, BLOCK_SIZE};
use crate::error::{Error, Result};

/// CtsBuffer staples streaming block handling onto a [`CipherContext`]:
/// a partial-block staging area plus a one-block lookahead. The lookahead
/// is what lets the final pass either swap the last two blocks (ciphertext
/// stealing) or inspect trailing padding before releasing it.
///
/// Ciphertext stealing here follows the framing some H.323 terminals emit
/// for payloads that are not block-aligned; the relaxed padding final exists
/// because others (Polycom m100, PVX) fill PKCS#7 padding with garbage.
pub(crate) struct CtsBuffer {
    buf: [u8; BLOCK_SIZE],
    buf_len: usize,
    final_buf: [u8; BLOCK_SIZE],
    final_used: bool,
}

impl CtsBuffer {
    pub fn new() -> Self {
        CtsBuffer {
            buf: [0u8; BLOCK_SIZE],
            buf_len: 0,
            final_buf: [0u8; BLOCK_SIZE],
            final_used: false,
        }
    }

    /// Called at the start of every packet. Only the counters are cleared;
    /// the backing arrays are dead until the counters say otherwise.
    pub fn reset(&mut self) {
        self.buf_len = 0;
        self.final_used = false;
    }

    /// Standard streaming update: emits only complete blocks and carries
    /// the partial tail over to the next call.
    pub fn update(
        &mut self,
        ctx: &mut CipherContext,
        out: &mut [u8],
        mut input: &[u8],
    ) -> Result<usize> {
        if input.is_empty() {
            return Ok(0);
        }

        if self.buf_len == 0 && input.len() % BLOCK_SIZE == 0 {
            ctx.cipher_blocks(input, out)?;
            return Ok(input.len());
        }

        let mut written = 0;
        if self.buf_len != 0 {
            if self.buf_len + input.len() < BLOCK_SIZE {
                self.buf[self.buf_len..self.buf_len + input.len()].copy_from_slice(input);
                self.buf_len += input.len();
                return Ok(0);
            }
            let fill = BLOCK_SIZE - self.buf_len;
            self.buf[self.buf_len..].copy_from_slice(&input[..fill]);
            ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
            input = &input[fill..];
            written = BLOCK_SIZE;
        }

        let tail = input.len() % BLOCK_SIZE;
        let whole = input.len() - tail;
        if whole > 0 {
            ctx.cipher_blocks(&input[..whole], &mut out[written..written + whole])?;
            written += whole;
        }

        if tail != 0 {
            self.buf[..tail].copy_from_slice(&input[whole..]);
        }
        self.buf_len = tail;
        Ok(written)
    }

    /// Standard final. With padding enabled the staged tail is PKCS#7
    /// filled and released as one cipher block; without padding the stream
    /// must already be block-aligned.
    pub fn finish(&mut self, ctx: &mut CipherContext, out: &mut [u8]) -> Result<usize> {
        if !ctx.padding() {
            if self.buf_len != 0 {
                return Err(Error::NotBlockAligned);
            }
            return Ok(0);
        }

        let pad = (BLOCK_SIZE - self.buf_len) as u8;
        for b in self.buf[self.buf_len..].iter_mut() {
            *b = pad;
        }
        ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
        self.buf_len = 0;
        Ok(BLOCK_SIZE)
    }

    /// Like [`CtsBuffer::update`], except one already-positioned block is
    /// always kept back in the lookahead so [`CtsBuffer::finish_cts`] can
    /// swap the final two blocks. On exit, once more than one block has
    /// been seen, `final_buf` and `buf` together span the last two blocks
    /// of the stream.
    pub fn update_cts(
        &mut self,
        ctx: &mut CipherContext,
        out: &mut [u8],
        mut input: &[u8],
    ) -> Result<usize> {
        if input.is_empty() {
            return Ok(0);
        }

        if self.buf_len + input.len() <= BLOCK_SIZE {
            self.buf[self.buf_len..self.buf_len + input.len()].copy_from_slice(input);
            self.buf_len += input.len();
            return Ok(0);
        }

        let mut written = 0;
        if self.final_used {
            ctx.cipher_blocks(&self.final_buf, &mut out[..BLOCK_SIZE])?;
            written = BLOCK_SIZE;
            self.final_used = false;
        }

        let fill = BLOCK_SIZE - self.buf_len;
        self.buf[self.buf_len..].copy_from_slice(&input[..fill]);
        input = &input[fill..];
        self.buf_len = BLOCK_SIZE;

        if input.len() <= BLOCK_SIZE {
            self.final_buf = self.buf;
            self.final_used = true;
            self.buf[..input.len()].copy_from_slice(input);
            self.buf_len = input.len();
            return Ok(written);
        }

        ctx.cipher_blocks(&self.buf, &mut out[written..written + BLOCK_SIZE])?;
        written += BLOCK_SIZE;
        self.buf_len = 0;

        // The last full block and the trailing remainder stay staged. When
        // the input is block-aligned the "remainder" is itself a full block.
        let leftover = input.len() % BLOCK_SIZE;
        let middle = if leftover != 0 {
            input.len() - BLOCK_SIZE - leftover
        } else {
            input.len() - 2 * BLOCK_SIZE
        };
        let keep = if leftover != 0 { leftover } else { BLOCK_SIZE };

        self.buf[..keep].copy_from_slice(&input[middle + BLOCK_SIZE..]);
        self.buf_len = keep;
        self.final_buf.copy_from_slice(&input[middle..middle + BLOCK_SIZE]);
        self.final_used = true;

        ctx.cipher_blocks(&input[..middle], &mut out[written..written + middle])?;
        Ok(written + middle)
    }

    /// Ciphertext-stealing final for encryption: emits the zero-filled tail
    /// block first, then the truncated cipher of the held-back block, for a
    /// ciphertext exactly as long as the plaintext.
    pub fn finish_cts(&mut self, ctx: &mut CipherContext, out: &mut [u8]) -> Result<usize> {
        if !self.final_used {
            return Err(Error::CtsMissingFinalBlock);
        }
        if self.buf_len == 0 {
            return Err(Error::CtsMissingPartialBlock);
        }

        let leftover = self.buf_len;
        let mut tmp = [0u8; BLOCK_SIZE];

        match ctx.mode() {
            Mode::Ecb => {
                // C_n plus C'
                ctx.cipher_blocks(&self.final_buf, &mut tmp)?;
                // P_n plus C'
                self.buf[leftover..].copy_from_slice(&tmp[leftover..]);
                // C_{n-1}
                ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
            }
            Mode::Cbc => {
                // C_n plus C'
                ctx.cipher_blocks(&self.final_buf, &mut tmp)?;
                // P_n plus zeros; the chain XORs in the previous cipher
                // block, which is exactly what stealing wants.
                self.buf[leftover..].fill(0);
                // C_{n-1}
                ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
            }
        }

        out[BLOCK_SIZE..BLOCK_SIZE + leftover].copy_from_slice(&tmp[..leftover]);
        Ok(BLOCK_SIZE + leftover)
    }

    /// CTS decryption shares the update bookkeeping with encryption; the
    /// context direction does the rest.
    pub fn decrypt_update_cts(
        &mut self,
        ctx: &mut CipherContext,
        out: &mut [u8],
        input: &[u8],
    ) -> Result<usize> {
        self.update_cts(ctx, out, input)
    }

    /// Undoes the two-block swap. The context's running IV is the
    /// next-to-last full cipher block (the updates kept it advanced), and
    /// because the block pass chains internally, its contribution has to be
    /// XOR-cancelled at each step.
    pub fn decrypt_finish_cts(&mut self, ctx: &mut CipherContext, out: &mut [u8]) -> Result<usize> {
        if !self.final_used {
            return Err(Error::CtsMissingFinalBlock);
        }
        if self.buf_len == 0 {
            return Err(Error::CtsMissingPartialBlock);
        }

        let leftover = self.buf_len;
        let mut tmp = [0u8; BLOCK_SIZE];

        match ctx.mode() {
            Mode::Ecb => {
                // P_n plus C'
                ctx.cipher_blocks(&self.final_buf, &mut tmp)?;
                // C_n plus C'
                self.buf[leftover..].copy_from_slice(&tmp[leftover..]);
                // P_{n-1}
                ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
            }
            Mode::Cbc => {
                let c_n_minus_2 = *ctx.iv();

                // C_n plus zeros
                self.buf[leftover..].fill(0);

                // final_buf is C_{n-1}; the chained pass gives (P_n plus C')''
                ctx.cipher_blocks(&self.final_buf, &mut tmp)?;
                for (t, c) in tmp.iter_mut().zip(c_n_minus_2.iter()) {
                    *t ^= c;
                }
                // now (P_n plus C')' -> P_n plus C'
                for (t, b) in tmp.iter_mut().zip(self.buf.iter()) {
                    *t ^= b;
                }

                // reconstruct C_n plus C' and decrypt to P_{n-1}''
                self.buf[leftover..].copy_from_slice(&tmp[leftover..]);
                ctx.cipher_blocks(&self.buf, &mut out[..BLOCK_SIZE])?;
                for (o, f) in out[..BLOCK_SIZE].iter_mut().zip(self.final_buf.iter()) {
                    *o ^= f;
                }
                for (o, c) in out[..BLOCK_SIZE].iter_mut().zip(c_n_minus_2.iter()) {
                    *o ^= c;
                }
            }
        }

        out[BLOCK_SIZE..BLOCK_SIZE + leftover].copy_from_slice(&tmp[..leftover]);
        Ok(BLOCK_SIZE + leftover)
    }

    /// Padded-CBC decrypt update. Same block accounting as
    /// [`CtsBuffer::update`], but the last fully deciphered block is held
    /// back so the final pass can strip the padding it carries; a block
    /// retained by the previous call is released first.
    pub fn decrypt_update(
        &mut self,
        ctx: &mut CipherContext,
        out: &mut [u8],
        input: &[u8],
    ) -> Result<usize> {
        if input.is_empty() {
            return Ok(0);
        }

        if !ctx.padding() {
            return self.update(ctx, out, input);
        }

        let mut offset = 0;
        if self.final_used {
            out[..BLOCK_SIZE].copy_from_slice(&self.final_buf);
            offset = BLOCK_SIZE;
        }

        let mut written = self.update(ctx, &mut out[offset..], input)?;

        // A block-aligned stream so far means the most recent output block
        // may be all padding; keep it until the next call or the final.
        if self.buf_len == 0 {
            written -= BLOCK_SIZE;
            self.final_buf
                .copy_from_slice(&out[offset + written..offset + written + BLOCK_SIZE]);
            self.final_used = true;
        } else {
            self.final_used = false;
        }

        Ok(offset + written)
    }

    /// Relaxed PKCS#7 final: only the pad count in the last byte is
    /// validated. Broken terminals put arbitrary bytes in the filler, so
    /// the filler is deliberately not checked.
    pub fn decrypt_finish_relaxed(
        &mut self,
        ctx: &mut CipherContext,
        out: &mut [u8],
    ) -> Result<usize> {
        if !ctx.padding() {
            if self.buf_len != 0 {
                return Err(Error::NotBlockAligned);
            }
            return Ok(0);
        }

        if self.buf_len != 0 || !self.final_used {
            return Err(Error::WrongFinalBlockLength);
        }

        let pad = self.final_buf[BLOCK_SIZE - 1] as usize;
        if pad == 0 || pad > BLOCK_SIZE {
            return Err(Error::BadPadding);
        }

        let n = BLOCK_SIZE - pad;
        out[..n].copy_from_slice(&self.final_buf[..n]);
        Ok(n)
    }
}
