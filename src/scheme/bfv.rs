//! BFV (integer-arithmetic) scheme adapter.

use crate::error::{Error, Result};
use crate::value::{Ciphertext, Plaintext};

use super::{HeScheme, Scheme, SchemeParameters};

/// Reduces `v` modulo `t`, centered into `[-t/2, t/2)` the way BFV's signed
/// integer encoding represents negative values.
fn center_mod(v: f64, t: u64) -> f64 {
    let t = t as i64;
    let raw = v.round() as i64;
    let mut r = raw.rem_euclid(t);
    if r >= (t + 1) / 2 {
        r -= t;
    }
    r as f64
}

/// The integer-arithmetic HE scheme.
///
/// Payload values are kept in the clear (see `scheme` module docs) but are
/// reduced modulo `plain_modulus`, centered, after every homomorphic op —
/// the one piece of real BFV numeric behavior worth preserving for callers
/// that rely on modular wraparound.
pub struct BfvScheme {
    params: SchemeParameters,
    plain_modulus: u64,
}

impl BfvScheme {
    /// Builds a BFV adapter, validating `params` first.
    pub fn new(params: SchemeParameters) -> Result<Self> {
        params.validate()?;
        if params.scheme != Scheme::Bfv {
            return Err(Error::SchemeParamError(
                "BfvScheme requires Scheme::Bfv parameters".into(),
            ));
        }
        let plain_modulus = params.plain_modulus.ok_or_else(|| {
            Error::SchemeParamError("BFV parameters missing plain_modulus".into())
        })?;
        Ok(Self {
            params,
            plain_modulus,
        })
    }

    fn reduce(&self, v: f64) -> f64 {
        center_mod(v, self.plain_modulus)
    }

    fn reduce_all(&self, values: impl Iterator<Item = f64>) -> Vec<f64> {
        values.map(|v| self.reduce(v)).collect()
    }
}

/// Matches a plaintext operand's lane count to a ciphertext's batch size: a
/// single-lane plaintext broadcasts across every lane (e.g. a scalar bias
/// added to a packed tensor), otherwise the lane counts must agree exactly.
fn broadcast_plain(batch_size: usize, values: &[f64]) -> Result<Vec<f64>> {
    match values.len() {
        n if n == batch_size => Ok(values.to_vec()),
        1 => Ok(vec![values[0]; batch_size]),
        n => Err(Error::ShapeMismatch(format!(
            "plaintext has {n} lanes, ciphertext batch_size is {batch_size}"
        ))),
    }
}

impl HeScheme for BfvScheme {
    fn scheme_kind(&self) -> Scheme {
        Scheme::Bfv
    }

    fn params(&self) -> &SchemeParameters {
        &self.params
    }

    fn encode(&self, values: &[f64], _scale: f64) -> Result<Plaintext> {
        for &v in values {
            if v.ceil() != v {
                return Err(Error::BfvNonIntegral(v));
            }
        }
        Ok(Plaintext::new(
            values.iter().map(|&v| self.reduce(v)).collect(),
            false,
        ))
    }

    fn decode(&self, p: &Plaintext) -> Vec<f64> {
        p.values().to_vec()
    }

    fn encrypt(&self, p: &Plaintext) -> Ciphertext {
        Ciphertext::new(p.values().to_vec(), 0, 1.0, false, p.len())
    }

    fn decrypt(&self, c: &Ciphertext) -> Plaintext {
        Plaintext::new(c.payload().to_vec(), false)
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let payload = self.reduce_all(
            a.payload()
                .iter()
                .zip(b.payload())
                .map(|(x, y)| x + y),
        );
        let mut out = a.sibling(payload);
        out.set_degree(2);
        Ok(out)
    }

    fn add_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext> {
        let b_values = broadcast_plain(a.batch_size(), b.values())?;
        let payload = self.reduce_all(a.payload().iter().zip(&b_values).map(|(x, y)| x + y));
        let mut out = a.sibling(payload);
        out.set_degree(2);
        Ok(out)
    }

    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let payload = self.reduce_all(a.payload().iter().zip(b.payload()).map(|(x, y)| x * y));
        let mut out = a.sibling(payload);
        out.set_degree(3);
        Ok(out)
    }

    fn mul_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext> {
        let b_values = broadcast_plain(a.batch_size(), b.values())?;
        let payload = self.reduce_all(a.payload().iter().zip(&b_values).map(|(x, y)| x * y));
        let mut out = a.sibling(payload);
        out.set_degree(3);
        Ok(out)
    }

    fn square(&self, a: &Ciphertext) -> Result<Ciphertext> {
        self.mul(a, a)
    }

    fn negate(&self, a: &Ciphertext) -> Ciphertext {
        let payload = self.reduce_all(a.payload().iter().map(|&x| -x));
        let mut out = a.sibling(payload);
        out.set_degree(a.degree());
        out.set_known_value(a.known_value().map(|v| -v));
        out
    }

    fn relinearize(&self, c: &mut Ciphertext) -> Result<()> {
        c.set_degree(2);
        Ok(())
    }

    fn rescale_to_next(&self, _c: &mut Ciphertext) -> Result<()> {
        // BFV has no modulus-switching chain to rescale along.
        Ok(())
    }

    fn top_chain_index(&self) -> u32 {
        0
    }

    fn save_params(&self) -> Vec<u8> {
        serde_json::to_vec(&self.params).expect("SchemeParameters always serializes")
    }

    fn empty_plaintext(&self) -> Plaintext {
        Plaintext::new(Vec::new(), false)
    }

    fn empty_ciphertext(&self, batch_size: usize) -> Ciphertext {
        Ciphertext::new(vec![0.0; batch_size], 0, 1.0, false, batch_size)
    }
}
