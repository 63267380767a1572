//! Substring search with the Boyer-Moore good-suffix rule
//!
//! Windows are compared right to left. After a mismatch with `j` bytes
//! matched the pattern advances by `shift[j]`, the smallest move that lines
//! the matched tail up with an earlier re-occurrence inside the pattern (or
//! slides past it). Bytes that the move aligns with already verified text
//! are not compared again, which keeps the worst case linear.
//!
//! Patterns are limited to [`MAX_PATTERN`] bytes so shifts fit a `u8`. The
//! one-shot [`search`] and [`rsearch`] accept longer needles by searching
//! for their first `MAX_PATTERN` bytes and verifying the rest.

use pkit_core::error::{KitError, KitResult};

/// Longest pattern accepted by [`StrSearch::prepare`]
pub const MAX_PATTERN: usize = 255;

/// Fill `shift[..m]` for the pattern read through `pat`
///
/// Suffix-length table first, then the classic two-pass good-suffix
/// fill, then re-indexed by number of matched bytes.
fn good_suffix_shift<P>(pat: P, m: usize, shift: &mut [u8; MAX_PATTERN])
where
    P: Fn(usize) -> u8,
{
    debug_assert!((1..=MAX_PATTERN).contains(&m));

    // suff[i]: length of the longest common suffix of pat[..=i] and pat
    let mut suff = [0usize; MAX_PATTERN];
    suff[m - 1] = m;
    let mut f = m - 1;
    let mut g = m as isize - 1;
    for i in (0..m - 1).rev() {
        let ii = i as isize;
        if ii > g && suff[i + m - 1 - f] < (ii - g) as usize {
            suff[i] = suff[i + m - 1 - f];
        } else {
            if ii < g {
                g = ii;
            }
            f = i;
            while g >= 0 && pat(g as usize) == pat(g as usize + m - 1 - f) {
                g -= 1;
            }
            suff[i] = (f as isize - g) as usize;
        }
    }

    // gs[i]: shift after a mismatch at pattern offset i
    let mut gs = [m; MAX_PATTERN];
    let mut j = 0;
    for i in (0..m).rev() {
        if suff[i] == i + 1 {
            while j < m - 1 - i {
                if gs[j] == m {
                    gs[j] = m - 1 - i;
                }
                j += 1;
            }
        }
    }
    for i in 0..m - 1 {
        gs[m - 1 - suff[i]] = m - 1 - i;
    }

    for matched in 0..m {
        shift[matched] = gs[m - 1 - matched] as u8;
    }
}

/// Leftmost window of `hay` equal to `pat`
///
/// Both sequences are read through accessors so the reverse search can
/// run the same loop over mirrored indices.
#[inline(always)]
fn scan<P, H>(pat: P, m: usize, hay: H, n: usize, shift: &[u8; MAX_PATTERN]) -> Option<usize>
where
    P: Fn(usize) -> u8,
    H: Fn(usize) -> u8,
{
    if m > n {
        return None;
    }

    // Offsets [known_lo, known_hi) of the current window are known to match
    let mut known_lo = 0;
    let mut known_hi = 0;
    let mut pos = 0;
    while pos <= n - m {
        let mut i = m;
        loop {
            if i == 0 {
                return Some(pos);
            }
            if i == known_hi && known_lo < known_hi {
                i = known_lo;
                continue;
            }
            if hay(pos + i - 1) != pat(i - 1) {
                break;
            }
            i -= 1;
        }

        let matched = m - i;
        let k = shift[matched] as usize;
        known_lo = (m - matched).saturating_sub(k);
        known_hi = m - k;
        pos += k;
    }
    None
}

/// Prepared forward search for one pattern
#[derive(Clone)]
pub struct StrSearch {
    pattern: [u8; MAX_PATTERN],
    len: usize,
    shift: [u8; MAX_PATTERN],
}

impl StrSearch {
    /// Build the shift table for `needle`
    ///
    /// `Invalid` for an empty needle or one longer than [`MAX_PATTERN`].
    pub fn prepare(needle: &[u8]) -> KitResult<Self> {
        let m = needle.len();
        if m == 0 || m > MAX_PATTERN {
            return Err(KitError::Invalid);
        }
        let mut pattern = [0u8; MAX_PATTERN];
        pattern[..m].copy_from_slice(needle);
        let mut shift = [0u8; MAX_PATTERN];
        good_suffix_shift(|i| needle[i], m, &mut shift);
        Ok(StrSearch { pattern, len: m, shift })
    }

    #[inline]
    pub fn needle(&self) -> &[u8] {
        &self.pattern[..self.len]
    }

    /// Offset of the first occurrence in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        let pat = self.needle();
        if pat.len() == 1 {
            return haystack.iter().position(|&b| b == pat[0]);
        }
        scan(|i| pat[i], pat.len(), |i| haystack[i], haystack.len(), &self.shift)
    }
}

/// Prepared reverse search, finds the last occurrence
#[derive(Clone)]
pub struct RevStrSearch {
    pattern: [u8; MAX_PATTERN],
    len: usize,
    shift: [u8; MAX_PATTERN],
}

impl RevStrSearch {
    /// Build the mirrored shift table for `needle`
    pub fn prepare(needle: &[u8]) -> KitResult<Self> {
        let m = needle.len();
        if m == 0 || m > MAX_PATTERN {
            return Err(KitError::Invalid);
        }
        let mut pattern = [0u8; MAX_PATTERN];
        pattern[..m].copy_from_slice(needle);
        let mut shift = [0u8; MAX_PATTERN];
        good_suffix_shift(|i| needle[m - 1 - i], m, &mut shift);
        Ok(RevStrSearch { pattern, len: m, shift })
    }

    #[inline]
    pub fn needle(&self) -> &[u8] {
        &self.pattern[..self.len]
    }

    /// Offset of the last occurrence in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        let pat = self.needle();
        let (m, n) = (pat.len(), haystack.len());
        if m == 1 {
            return haystack.iter().rposition(|&b| b == pat[0]);
        }
        scan(|i| pat[m - 1 - i], m, |i| haystack[n - 1 - i], n, &self.shift)
            .map(|rpos| n - rpos - m)
    }
}

/// First occurrence of `needle` in `haystack`, `None` for an empty needle
pub fn search(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let m = needle.len();
    if m <= MAX_PATTERN {
        return StrSearch::prepare(needle).ok()?.find(haystack);
    }

    let (head, rest) = needle.split_at(MAX_PATTERN);
    let head = StrSearch::prepare(head).ok()?;
    let mut start = 0;
    loop {
        let p = start + head.find(&haystack[start..])?;
        let tail = haystack.get(p + MAX_PATTERN..p + m)?;
        if tail == rest {
            return Some(p);
        }
        start = p + 1;
    }
}

/// Last occurrence of `needle` in `haystack`, `None` for an empty needle
pub fn rsearch(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let m = needle.len();
    if m <= MAX_PATTERN {
        return RevStrSearch::prepare(needle).ok()?.find(haystack);
    }

    let (head, rest) = needle.split_at(MAX_PATTERN);
    let head = RevStrSearch::prepare(head).ok()?;
    // Candidates must leave room for the whole needle
    let mut end = haystack.len().checked_sub(m)? + MAX_PATTERN;
    loop {
        let p = head.find(&haystack[..end])?;
        if &haystack[p + MAX_PATTERN..p + m] == rest {
            return Some(p);
        }
        end = p + MAX_PATTERN - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_all(hay: &[u8], pat: &[u8]) -> Vec<usize> {
        if pat.is_empty() || pat.len() > hay.len() {
            return Vec::new();
        }
        (0..=hay.len() - pat.len()).filter(|&p| &hay[p..p + pat.len()] == pat).collect()
    }

    fn all_forward(hay: &[u8], pat: &[u8]) -> Vec<usize> {
        let s = StrSearch::prepare(pat).unwrap();
        let mut found = Vec::new();
        let mut start = 0;
        while let Some(p) = s.find(&hay[start..]) {
            found.push(start + p);
            start += p + 1;
        }
        found
    }

    fn all_reverse(hay: &[u8], pat: &[u8]) -> Vec<usize> {
        let s = RevStrSearch::prepare(pat).unwrap();
        let mut found = Vec::new();
        let mut end = hay.len();
        while let Some(p) = s.find(&hay[..end]) {
            found.push(p);
            // Overlapping occurrences end before p + m
            end = p + pat.len() - 1;
        }
        found
    }

    fn xorshift_bytes(len: usize, alphabet: &[u8], seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                alphabet[x as usize % alphabet.len()]
            })
            .collect()
    }

    #[test]
    fn test_shift_table_textbook() {
        // GCAGAGAG: good-suffix shifts by mismatch offset are 7 7 7 2 7 4 7 1
        let s = StrSearch::prepare(b"GCAGAGAG").unwrap();
        let by_offset: Vec<u8> = (0..8).map(|off| s.shift[7 - off]).collect();
        assert_eq!(by_offset, [7, 7, 7, 2, 7, 4, 7, 1]);
    }

    #[test]
    fn test_prepare_limits() {
        assert!(StrSearch::prepare(b"").is_err());
        assert!(RevStrSearch::prepare(b"").is_err());
        assert!(StrSearch::prepare(&[b'a'; MAX_PATTERN]).is_ok());
        assert_eq!(StrSearch::prepare(&[b'a'; MAX_PATTERN + 1]).err(), Some(KitError::Invalid));
        assert_eq!(search(b"abc", b""), None);
        assert_eq!(rsearch(b"abc", b""), None);
    }

    #[test]
    fn test_simple_hits() {
        assert_eq!(search(b"hello world", b"world"), Some(6));
        assert_eq!(search(b"hello world", b"o"), Some(4));
        assert_eq!(rsearch(b"hello world", b"o"), Some(7));
        assert_eq!(search(b"hello", b"hello!"), None);
        assert_eq!(search(b"aaaaab", b"aab"), Some(3));
        assert_eq!(rsearch(b"abcabcabc", b"abc"), Some(6));
        assert_eq!(search(b"abcabcabc", b"cab"), Some(2));
    }

    #[test]
    fn test_periodic_patterns_match_naive() {
        let hay = xorshift_bytes(20_000, b"ab", 7);
        for pat in [&b"aaaa"[..], b"abab", b"abaab", b"aabaabaa", b"babbab", b"ab"] {
            let expect = naive_all(&hay, pat);
            assert_eq!(all_forward(&hay, pat), expect, "pattern {:?}", pat);
            let mut rev = expect.clone();
            rev.reverse();
            assert_eq!(all_reverse(&hay, pat), rev, "pattern {:?}", pat);
        }
    }

    #[test]
    fn test_random_patterns_match_naive() {
        let hay = xorshift_bytes(8_000, b"abc", 99);
        for (seed, len) in (1..60u32).zip((1..12).cycle()) {
            let pat = xorshift_bytes(len, b"abc", seed);
            assert_eq!(all_forward(&hay, &pat), naive_all(&hay, &pat), "pattern {:?}", pat);
            assert_eq!(rsearch(&hay, &pat), naive_all(&hay, &pat).last().copied());
        }
    }

    #[test]
    fn test_long_needle() {
        let needle = xorshift_bytes(600, b"xyz", 3);
        let mut hay = xorshift_bytes(5_000, b"xyz", 4);
        hay[100..700].copy_from_slice(&needle);
        hay[3000..3600].copy_from_slice(&needle);
        // Decoy sharing only the first piece
        hay[1500..1500 + MAX_PATTERN].copy_from_slice(&needle[..MAX_PATTERN]);

        assert_eq!(search(&hay, &needle), Some(100));
        assert_eq!(rsearch(&hay, &needle), Some(3000));
        assert_eq!(search(&hay[101..], &needle), Some(2899));
        assert_eq!(rsearch(&hay[..3599], &needle), Some(100));
        assert_eq!(search(&hay[..699], &needle), None);
    }
}
