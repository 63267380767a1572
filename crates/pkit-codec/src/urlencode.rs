//! Percent encoding
//!
//! Safe bytes are ASCII alphanumerics and `- _ . *`; every other byte is
//! written as `%XX` with uppercase hex. One byte can be exempted and
//! mapped to a replacement instead (`/` kept in paths, space to `+` in form
//! data). The decoder applies the reverse mapping outside of escapes and
//! passes a `%` that is not followed by two hex digits through literally.

use crate::wbuffer::{rollback_on_err, WBuffer};
use pkit_core::error::{KitError, KitResult};

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

static URL_SAFE: [bool; 256] = {
    let mut table = [false; 256];
    let mut b = 0;
    while b < 256 {
        let c = b as u8;
        table[b] = c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b'*');
        b += 1;
    }
    table
};

/// True for bytes written unescaped
#[inline]
pub fn is_url_safe(b: u8) -> bool {
    URL_SAFE[b as usize]
}

#[inline]
fn unhex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decoded byte of a valid escape starting at `src[0] == b'%'`
#[inline]
fn escape_at(src: &[u8]) -> Option<u8> {
    match src {
        [b'%', hi, lo, ..] => Some(unhex(*hi)? << 4 | unhex(*lo)?),
        _ => None,
    }
}

/// Encoded length of `src`; `except` is the exempted byte
pub fn size_urlencode(src: &[u8], except: Option<u8>) -> KitResult<usize> {
    src.iter().try_fold(0usize, |acc, &b| {
        let n = if is_url_safe(b) || Some(b) == except { 1 } else { 3 };
        acc.checked_add(n).ok_or(KitError::NoMemory)
    })
}

/// Append the percent encoding of `src` to `wb`
///
/// `except = Some((from, to))` writes `to` for every `from` in the input
/// instead of escaping it.
pub fn urlencode<W>(wb: &mut W, src: &[u8], except: Option<(u8, u8)>) -> KitResult<()>
where
    W: WBuffer + ?Sized,
{
    let size = size_urlencode(src, except.map(|(from, _)| from))?;
    let out = wb.reserve(size)?;

    let mut o = 0;
    for &b in src {
        match except {
            Some((from, to)) if b == from => {
                out[o] = to;
                o += 1;
            }
            _ if is_url_safe(b) => {
                out[o] = b;
                o += 1;
            }
            _ => {
                out[o] = b'%';
                out[o + 1] = HEX_UPPER[(b >> 4) as usize];
                out[o + 2] = HEX_UPPER[(b & 0xf) as usize];
                o += 3;
            }
        }
    }
    debug_assert_eq!(o, size);
    Ok(())
}

/// Decoded length of `src`, never larger than `src.len()`
pub fn size_urldecode(src: &[u8]) -> usize {
    let mut size = 0;
    let mut i = 0;
    while i < src.len() {
        i += if src[i] == b'%' && escape_at(&src[i..]).is_some() { 3 } else { 1 };
        size += 1;
    }
    size
}

/// Append the decoding of `src` to `wb`
///
/// `change = Some((from, to))` maps `from` to `to` outside of escapes.
pub fn urldecode<W>(wb: &mut W, src: &[u8], change: Option<(u8, u8)>) -> KitResult<()>
where
    W: WBuffer + ?Sized,
{
    rollback_on_err(wb, |wb| {
        let out = wb.reserve(size_urldecode(src))?;
        let mut o = 0;
        let mut i = 0;
        while i < src.len() {
            let b = src[i];
            if b == b'%' {
                if let Some(decoded) = escape_at(&src[i..]) {
                    out[o] = decoded;
                    o += 1;
                    i += 3;
                    continue;
                }
            }
            out[o] = match change {
                Some((from, to)) if b == from => to,
                _ => b,
            };
            o += 1;
            i += 1;
        }
        debug_assert_eq!(o, out.len());
        Ok(())
    })
}
