//! Raw history reads

use super::{push_words, WordReader, HS_SUCCESS};
use crate::error::{HistScopeError, Result};

/// One variable of a raw read
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariable {
    pub hs_status: i32,
    /// `(time, value)` pairs in server order
    pub points: Vec<(f64, f64)>,
}

/// Decoded raw read
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub status: i32,
    pub variables: Vec<RawVariable>,
}

impl RawPayload {
    pub fn total_points(&self) -> usize {
        self.variables.iter().map(|v| v.points.len()).sum()
    }
}

/// Decode a raw read for `expected_vars` variables
pub fn decode_raw(bytes: &[u8], expected_vars: usize) -> Result<RawPayload> {
    let mut r = WordReader::new(bytes)?;

    let status = r.next("status")? as i32;
    let num_var = r.count("variable count")?;
    if num_var != expected_vars {
        return Err(HistScopeError::Protocol(format!(
            "raw read returned {} variables, {} requested",
            num_var, expected_vars
        )));
    }

    r.require(2 * num_var, "raw header")?;
    let mut hs_status = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        hs_status.push(r.next("hs_status")? as i32);
    }
    let mut counts = Vec::with_capacity(num_var);
    for _ in 0..num_var {
        counts.push(r.count("value count")?);
    }

    let total: usize = counts.iter().sum();
    r.require(2 * total, "raw samples")?;

    let mut variables = Vec::with_capacity(num_var);
    for (hs_status, n) in hs_status.into_iter().zip(counts) {
        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            let t = r.next("time")?;
            let v = r.next("value")?;
            points.push((t, v));
        }
        variables.push(RawVariable { hs_status, points });
    }

    r.finish("raw");
    Ok(RawPayload { status, variables })
}

/// Encode `(time, value)` pairs per variable in the raw wire format
pub fn encode_raw(variables: &[Vec<(f64, f64)>]) -> Vec<u8> {
    let n = variables.len();
    let total: usize = variables.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(8 * (2 + 2 * n + 2 * total));

    push_words(&mut out, [HS_SUCCESS as f64, n as f64]);
    push_words(&mut out, std::iter::repeat(HS_SUCCESS as f64).take(n));
    push_words(&mut out, variables.iter().map(|v| v.len() as f64));
    for var in variables {
        push_words(&mut out, var.iter().flat_map(|&(t, v)| [t, v]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_two_variables() {
        let bytes = encode_raw(&[vec![(100.0, 5.0), (200.0, 7.0)], vec![(150.0, -1.0)]]);
        let payload = decode_raw(&bytes, 2).unwrap();

        assert_eq!(payload.status, HS_SUCCESS);
        assert_eq!(payload.variables[0].points, vec![(100.0, 5.0), (200.0, 7.0)]);
        assert_eq!(payload.variables[1].points, vec![(150.0, -1.0)]);
        assert_eq!(payload.variables[1].hs_status, HS_SUCCESS);
        assert_eq!(payload.total_points(), 3);
    }

    #[test]
    fn test_decode_empty_variable() {
        let bytes = encode_raw(&[vec![], vec![(1.0, 2.0)]]);
        let payload = decode_raw(&bytes, 2).unwrap();
        assert!(payload.variables[0].points.is_empty());
        assert_eq!(payload.variables[1].points.len(), 1);
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode_raw(&[vec![(100.0, 5.0), (200.0, 7.0)]]);
        let err = decode_raw(&bytes[..bytes.len() - 8], 1).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_decode_variable_count_mismatch() {
        let bytes = encode_raw(&[vec![(100.0, 5.0)]]);
        assert!(decode_raw(&bytes, 2).is_err());
    }

    #[test]
    fn test_decode_ignores_trailing_words() {
        let mut bytes = encode_raw(&[vec![(100.0, 5.0)]]);
        bytes.extend_from_slice(&0f64.to_le_bytes());
        let payload = decode_raw(&bytes, 1).unwrap();
        assert_eq!(payload.variables[0].points, vec![(100.0, 5.0)]);
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(decode_raw(&[], 1).unwrap_err().is_protocol());
    }
}
