//! Filepath: src/key.rs
//!
//! Fixed-width key codec.
//!
//! A key is `WORDS` machine words. Byte input is split into 8-byte chunks,
//! each read as a big-endian `u64` and zero-padded, so comparing words most
//! significant first is the same as comparing the bytes lexicographically.
//! Keys shorter than the full width compare as if padded with `\0`.

use std::cmp::Ordering;
use std::fmt as StdFmt;

/// Size of one key word in bytes.
pub const IKEY_SIZE: usize = 8;

/// Default number of words per key.
pub const DEFAULT_KEY_WORDS: usize = 2;

/// Default key width in bytes (16).
pub const DEFAULT_KEY_SIZE: usize = DEFAULT_KEY_WORDS * IKEY_SIZE;

/// A fixed-width key decomposed into big-endian words.
///
/// # Example
///
/// ```rust
/// use fourtree::key::Key;
///
/// let a: Key = Key::new(b"apple");
/// let b: Key = Key::new(b"banana");
///
/// assert!(a < b);
/// assert_eq!(a.word(0), u64::from_be_bytes(*b"apple\0\0\0"));
/// assert_eq!(a.word(1), 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key<const WORDS: usize = DEFAULT_KEY_WORDS> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> Key<WORDS> {
    /// Maximum number of bytes a key of this width holds.
    pub const CAPACITY: usize = WORDS * IKEY_SIZE;

    /// Encode a byte string.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than [`Self::CAPACITY`]. Oversized keys
    /// are a caller bug, not a runtime condition.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        assert!(
            data.len() <= Self::CAPACITY,
            "key length {} exceeds maximum {}",
            data.len(),
            Self::CAPACITY
        );

        let mut words: [u64; WORDS] = [0; WORDS];
        for (word, chunk) in words.iter_mut().zip(data.chunks(IKEY_SIZE)) {
            let mut bytes: [u8; IKEY_SIZE] = [0; IKEY_SIZE];
            bytes[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_be_bytes(bytes);
        }

        Self { words }
    }

    /// Build a key directly from its words.
    #[must_use]
    pub const fn from_words(words: [u64; WORDS]) -> Self {
        Self { words }
    }

    /// All words, most significant first.
    #[inline]
    #[must_use]
    pub const fn words(&self) -> &[u64; WORDS] {
        &self.words
    }

    /// The word at `index`.
    ///
    /// # Panics
    /// Panics if `index >= WORDS`.
    #[inline]
    #[must_use]
    pub const fn word(&self, index: usize) -> u64 {
        self.words[index]
    }

    /// Compare against a key given as a word source, most significant first.
    ///
    /// Stops at the first differing word, so callers that load words lazily
    /// (from atomics) only read what the comparison needs.
    #[inline]
    pub fn compare_with<F>(&self, mut word_at: F) -> Ordering
    where
        F: FnMut(usize) -> u64,
    {
        for (i, &mine) in self.words.iter().enumerate() {
            match mine.cmp(&word_at(i)) {
                Ordering::Equal => {}
                decided => return decided,
            }
        }
        Ordering::Equal
    }

    /// Decode back to the full-width byte string (including padding).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    /// Human-readable form: trailing padding dropped, non-printable bytes
    /// escaped as `\xNN`.
    #[must_use]
    pub fn printable(&self) -> String {
        let bytes: Vec<u8> = self.to_bytes();
        let end: usize = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);

        let mut out = String::with_capacity(end);
        for &b in &bytes[..end] {
            if b.is_ascii_graphic() || b == b' ' {
                out.push(char::from(b));
            } else {
                out.push_str(&format!("\\x{b:02x}"));
            }
        }
        out
    }
}

impl<const WORDS: usize> StdFmt::Debug for Key<WORDS> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_tuple("Key").field(&self.printable()).finish()
    }
}

impl<const WORDS: usize> StdFmt::Display for Key<WORDS> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.write_str(&self.printable())
    }
}
