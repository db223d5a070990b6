//! CKKS (fixed-point approximate) scheme adapter.

use crate::error::{Error, Result};
use crate::value::{Ciphertext, Plaintext};

use super::{HeScheme, Scheme, SchemeParameters};

/// Quantizes `v` to the nearest representable value at fixed-point `scale`,
/// the source of CKKS's approximation error.
fn quantize(v: f64, scale: f64) -> f64 {
    (v * scale).round() / scale
}

/// The fixed-point approximate HE scheme.
pub struct CkksScheme {
    params: SchemeParameters,
}

impl CkksScheme {
    /// Builds a CKKS adapter, validating `params` first.
    pub fn new(params: SchemeParameters) -> Result<Self> {
        params.validate()?;
        if params.scheme != Scheme::Ckks {
            return Err(Error::SchemeParamError(
                "CkksScheme requires Scheme::Ckks parameters".into(),
            ));
        }
        Ok(Self { params })
    }

    fn check_chain(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        if a.chain_index() != b.chain_index() {
            return Err(Error::ChainMismatch {
                left: a.chain_index(),
                right: b.chain_index(),
            });
        }
        Ok(())
    }

    fn check_scale(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        // Fixed-point scales can drift by float rounding; compare with a
        // relative tolerance rather than bit-exact equality.
        let tol = 1e-6 * a.scale().max(b.scale()).max(1.0);
        if (a.scale() - b.scale()).abs() > tol {
            return Err(Error::ScaleMismatch {
                left: a.scale(),
                right: b.scale(),
            });
        }
        Ok(())
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

impl HeScheme for CkksScheme {
    fn scheme_kind(&self) -> Scheme {
        Scheme::Ckks
    }

    fn params(&self) -> &SchemeParameters {
        &self.params
    }

    fn encode(&self, values: &[f64], scale: f64) -> Result<Plaintext> {
        Ok(Plaintext::new(
            values.iter().map(|&v| quantize(v, scale)).collect(),
            false,
        ))
    }

    fn decode(&self, p: &Plaintext) -> Vec<f64> {
        p.values().to_vec()
    }

    fn encrypt(&self, p: &Plaintext) -> Ciphertext {
        Ciphertext::new(
            p.values().to_vec(),
            self.top_chain_index(),
            self.params.scale,
            p.complex_packing(),
            p.len(),
        )
    }

    fn decrypt(&self, c: &Ciphertext) -> Plaintext {
        Plaintext::new(c.payload().to_vec(), c.complex_packing())
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_chain(a, b)?;
        self.check_scale(a, b)?;
        let payload: Vec<f64> = a
            .payload()
            .iter()
            .zip(b.payload())
            .map(|(x, y)| x + y)
            .collect();
        let mut out = a.sibling(payload);
        out.set_degree(2);
        Ok(out)
    }

    fn add_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext> {
        let b_values = broadcast_plain(a.batch_size(), b.values())?;
        let payload: Vec<f64> = a
            .payload()
            .iter()
            .zip(&b_values)
            .map(|(x, y)| x + y)
            .collect();
        let mut out = a.sibling(payload);
        out.set_degree(2);
        Ok(out)
    }

    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_chain(a, b)?;
        self.check_scale(a, b)?;
        let payload: Vec<f64> = a
            .payload()
            .iter()
            .zip(b.payload())
            .map(|(x, y)| x * y)
            .collect();
        let mut out = Ciphertext::new(
            payload,
            a.chain_index(),
            a.scale() * b.scale(),
            a.complex_packing(),
            a.batch_size(),
        );
        out.set_degree(3);
        Ok(out)
    }

    fn mul_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext> {
        let b_values = broadcast_plain(a.batch_size(), b.values())?;
        let payload: Vec<f64> = a
            .payload()
            .iter()
            .zip(&b_values)
            .map(|(x, y)| x * y)
            .collect();
        let mut out = Ciphertext::new(
            payload,
            a.chain_index(),
            a.scale() * self.params.scale,
            a.complex_packing(),
            a.batch_size(),
        );
        out.set_degree(3);
        Ok(out)
    }

    fn square(&self, a: &Ciphertext) -> Result<Ciphertext> {
        self.mul(a, a)
    }

    fn negate(&self, a: &Ciphertext) -> Ciphertext {
        let payload: Vec<f64> = a.payload().iter().map(|&x| -x).collect();
        let mut out = a.sibling(payload);
        out.set_degree(a.degree());
        out.set_known_value(a.known_value().map(|v| -v));
        out
    }

    fn relinearize(&self, c: &mut Ciphertext) -> Result<()> {
        c.set_degree(2);
        Ok(())
    }

    fn rescale_to_next(&self, c: &mut Ciphertext) -> Result<()> {
        if c.chain_index() == 0 {
            return Ok(());
        }
        let dropped_bits = self
            .params
            .coeff_modulus
            .get(c.chain_index() as usize)
            .copied()
            .unwrap_or(30);
        let modulus = (1u64 << dropped_bits) as f64;
        c.set_scale(c.scale() / modulus);
        c.set_chain_index(c.chain_index() - 1);
        Ok(())
    }

    fn top_chain_index(&self) -> u32 {
        self.params.top_chain_index()
    }

    fn save_params(&self) -> Vec<u8> {
        serde_json::to_vec(&self.params).expect("SchemeParameters always serializes")
    }

    fn empty_plaintext(&self) -> Plaintext {
        Plaintext::new(Vec::new(), false)
    }

    fn empty_ciphertext(&self, batch_size: usize) -> Ciphertext {
        Ciphertext::new(
            vec![0.0; batch_size],
            self.top_chain_index(),
            self.params.scale,
            false,
            batch_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> CkksScheme {
        CkksScheme::new(SchemeParameters::ckks_default()).unwrap()
    }

    #[test]
    fn encode_decode_within_precision() {
        let s = scheme();
        let p = s.encode(&[1.2345, -6.789], s.params.scale).unwrap();
        let out = s.decode(&p);
        assert!((out[0] - 1.2345).abs() < 1e-6);
        assert!((out[1] + 6.789).abs() < 1e-6);
    }

    #[test]
    fn multiply_approximately_matches_plain() {
        let s = scheme();
        let a = s.encrypt(&s.encode(&[2.5], s.params.scale).unwrap());
        let b = s.encrypt(&s.encode(&[4.0], s.params.scale).unwrap());
        let c = s.mul(&a, &b).unwrap();
        assert_eq!(c.degree(), 3);
        let out = s.decrypt(&c);
        assert!((out.values()[0] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn rescale_decrements_chain_index_and_divides_scale() {
        let s = scheme();
        let mut c = s.encrypt(&s.encode(&[1.0], s.params.scale).unwrap());
        let before_chain = c.chain_index();
        let before_scale = c.scale();
        s.rescale_to_next(&mut c).unwrap();
        assert_eq!(c.chain_index(), before_chain - 1);
        assert!(c.scale() < before_scale);
    }

    #[test]
    fn rescale_is_idempotent_at_chain_index_zero() {
        let s = scheme();
        let mut c = s.encrypt(&s.encode(&[1.0], s.params.scale).unwrap());
        for _ in 0..10 {
            let _ = s.rescale_to_next(&mut c);
        }
        assert_eq!(c.chain_index(), 0);
        s.rescale_to_next(&mut c).unwrap();
        assert_eq!(c.chain_index(), 0);
    }

    #[test]
    fn chain_mismatch_is_rejected() {
        let s = scheme();
        let mut a = s.encrypt(&s.encode(&[1.0], s.params.scale).unwrap());
        let b = s.encrypt(&s.encode(&[1.0], s.params.scale).unwrap());
        s.rescale_to_next(&mut a).unwrap();
        assert!(matches!(s.add(&a, &b), Err(Error::ChainMismatch { .. })));
    }
}
