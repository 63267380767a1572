//! RFC 4648 Base64 with `=` padding

use crate::wbuffer::{rollback_on_err, WBuffer};
use pkit_core::error::{KitError, KitResult};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const PAD: u8 = b'=';
const INVALID: u8 = 0xff;

static DECODE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 64 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// `4 * ceil(len / 3)`, `NoMemory` on overflow
pub fn size_base64encode(len: usize) -> KitResult<usize> {
    len.div_ceil(3).checked_mul(4).ok_or(KitError::NoMemory)
}

/// Decoded length of `src`
///
/// `Invalid` when the length is not a multiple of 4 or carries more than
/// two padding bytes.
pub fn size_base64decode(src: &[u8]) -> KitResult<usize> {
    if src.len() % 4 != 0 {
        return Err(KitError::Invalid);
    }
    let pad = src.iter().rev().take_while(|&&b| b == PAD).count();
    if pad > 2 {
        return Err(KitError::Invalid);
    }
    Ok(src.len() / 4 * 3 - pad)
}

/// Append the Base64 encoding of `src` to `wb`
pub fn base64encode<W>(wb: &mut W, src: &[u8]) -> KitResult<()>
where
    W: WBuffer + ?Sized,
{
    let out = wb.reserve(size_base64encode(src.len())?)?;

    for (chunk, quad) in src.chunks(3).zip(out.chunks_exact_mut(4)) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let group = b0 << 16 | b1 << 8 | b2;

        quad[0] = ALPHABET[(group >> 18) as usize & 0x3f];
        quad[1] = ALPHABET[(group >> 12) as usize & 0x3f];
        quad[2] = if chunk.len() > 1 { ALPHABET[(group >> 6) as usize & 0x3f] } else { PAD };
        quad[3] = if chunk.len() > 2 { ALPHABET[group as usize & 0x3f] } else { PAD };
    }
    Ok(())
}

/// Append the decoding of `src` to `wb`
///
/// Any byte outside the alphabet, other than trailing padding, is
/// `Invalid`; `wb` is then restored to its size on entry.
pub fn base64decode<W>(wb: &mut W, src: &[u8]) -> KitResult<()>
where
    W: WBuffer + ?Sized,
{
    let size = size_base64decode(src)?;
    let pad = src.len() / 4 * 3 - size;

    rollback_on_err(wb, |wb| {
        let out = wb.reserve(size)?;
        let body = src.len() - pad;
        let mut o = 0;

        for (q, quad) in src.chunks_exact(4).enumerate() {
            let mut group = 0u32;
            let mut sextets = 0;
            for (k, &b) in quad.iter().enumerate() {
                if q * 4 + k >= body {
                    break;
                }
                let v = DECODE[b as usize];
                if v == INVALID {
                    return Err(KitError::Invalid);
                }
                group |= (v as u32) << (18 - 6 * k);
                sextets += 1;
            }

            // 4 sextets give 3 bytes, 3 give 2, 2 give 1
            let bytes = sextets - 1;
            for k in 0..bytes {
                out[o] = (group >> (16 - 8 * k)) as u8;
                o += 1;
            }
        }
        debug_assert_eq!(o, size);
        Ok(())
    })
}
