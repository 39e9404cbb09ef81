//! Binary wire formats of the history service
//!
//! Both reads return a flat array of little-endian `f64` words.
//!
//! # Raw reads
//!
//! ```text
//! status, num_var,
//! hs_status[0..num_var], num_values[0..num_var],
//! var0: t, v, t, v, ...   (num_values[0] pairs)
//! var1: ...
//! ```
//!
//! # Binned reads
//!
//! ```text
//! status, start, end, num_bins, num_var,
//! hs_status[0..num_var], num_entries[0..num_var],
//! last_time[0..num_var], last_value[0..num_var],
//! var0: bin0 (9 words), bin1, ...   (num_bins records)
//! var1: ...
//! ```
//!
//! A bin record is `count, mean, rms, min, max, first_time, first_value,
//! last_time, last_value`. Every variable carries exactly `num_bins`
//! records, whether or not it has entries.

mod binned;
mod raw;

pub use binned::{decode_binned, encode_binned, BinRecord, BinnedPayload, BinnedVariable};
pub use raw::{decode_raw, encode_raw, RawPayload, RawVariable};

use crate::error::{HistScopeError, Result};

/// Per-variable status reported by the history service on success
pub const HS_SUCCESS: i32 = 1;

/// Words per binned record
pub const BIN_RECORD_WORDS: usize = 9;

/// Sequential reader over the `f64` words of a payload
pub(crate) struct WordReader {
    words: Vec<f64>,
    pos: usize,
}

impl WordReader {
    /// Split `bytes` into little-endian words
    pub(crate) fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 8 != 0 {
            return Err(HistScopeError::Protocol(format!(
                "payload of {} bytes is not a whole number of 64-bit words",
                bytes.len()
            )));
        }

        let words = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                f64::from_le_bytes(word)
            })
            .collect();

        Ok(Self { words, pos: 0 })
    }

    pub(crate) fn remaining(&self) -> usize {
        self.words.len() - self.pos
    }

    pub(crate) fn next(&mut self, what: &str) -> Result<f64> {
        let word = self.words.get(self.pos).copied().ok_or_else(|| {
            HistScopeError::Protocol(format!("payload truncated while reading {}", what))
        })?;
        self.pos += 1;
        Ok(word)
    }

    /// Read a word that must hold a non-negative integer count
    pub(crate) fn count(&mut self, what: &str) -> Result<usize> {
        let word = self.next(what)?;
        if !word.is_finite() || word < 0.0 || word.fract() != 0.0 || word > u32::MAX as f64 {
            return Err(HistScopeError::Protocol(format!(
                "{} is not a valid count: {}",
                what, word
            )));
        }
        Ok(word as usize)
    }

    /// Fail unless at least `n` words remain
    pub(crate) fn require(&self, n: usize, what: &str) -> Result<()> {
        if self.remaining() < n {
            return Err(HistScopeError::Protocol(format!(
                "payload truncated: {} needs {} words, {} left",
                what,
                n,
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Log and skip anything after the last expected word
    pub(crate) fn finish(self, what: &str) {
        if self.remaining() > 0 {
            tracing::warn!(
                "Ignoring {} trailing words after {} payload",
                self.remaining(),
                what
            );
        }
    }
}

pub(crate) fn push_words(out: &mut Vec<u8>, words: impl IntoIterator<Item = f64>) {
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_rejects_partial_word() {
        assert!(WordReader::new(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_reader_counts() {
        let mut bytes = Vec::new();
        push_words(&mut bytes, [3.0, -1.0, 2.5, f64::NAN]);
        let mut r = WordReader::new(&bytes).unwrap();
        assert_eq!(r.count("a").unwrap(), 3);
        assert!(r.count("b").is_err());
        assert!(r.count("c").is_err());
        assert!(r.count("d").is_err());
        assert!(r.next("e").is_err());
    }
}
