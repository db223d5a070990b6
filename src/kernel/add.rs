//! `scalar_add` / tensor `add`, §4.3.1.

use rayon::prelude::*;

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::{Ciphertext, HeValue, Plaintext};

use super::reconcile_chain;

fn encode_like(ctx: &SchemeContext, template: &Ciphertext, values: &[f64]) -> Result<Plaintext> {
    ctx.scheme().encode(values, template.scale())
}

/// `c = a + b` for every combination of plain/cipher operands (§4.3.1).
pub fn scalar_add(ctx: &SchemeContext, a: &HeValue, b: &HeValue) -> Result<HeValue> {
    match (a, b) {
        (HeValue::Plain(pa), HeValue::Plain(pb)) => {
            let values: Vec<f64> = pa.values().iter().zip(pb.values()).map(|(x, y)| x + y).collect();
            Ok(HeValue::from_plain(Plaintext::new(values, pa.complex_packing())))
        }
        (HeValue::Cipher(ca), HeValue::Plain(pb)) => {
            if pb.is_constant(0.0) {
                return Ok(a.clone());
            }
            Ok(HeValue::from_cipher(ctx.scheme().add_plain(ca, pb)?))
        }
        (HeValue::Plain(_), HeValue::Cipher(_)) => scalar_add(ctx, b, a),
        (HeValue::Cipher(ca), HeValue::Cipher(cb)) => {
            if let (Some(z), None) = (ca.known_value(), cb.known_value()) {
                let plain = encode_like(ctx, cb, &vec![z; cb.batch_size()])?;
                return Ok(HeValue::from_cipher(ctx.scheme().add_plain(cb, &plain)?));
            }
            if let (None, Some(z)) = (ca.known_value(), cb.known_value()) {
                let plain = encode_like(ctx, ca, &vec![z; ca.batch_size()])?;
                return Ok(HeValue::from_cipher(ctx.scheme().add_plain(ca, &plain)?));
            }
            let (ra, rb) = reconcile_chain(ctx, ca, cb)?;
            Ok(HeValue::from_cipher(ctx.scheme().add(&ra, &rb)?))
        }
    }
}

/// Elementwise `add` over two tensors of matching length.
pub fn tensor_add(ctx: &SchemeContext, a: &[HeValue], b: &[HeValue]) -> Result<Vec<HeValue>> {
    a.par_iter()
        .zip(b.par_iter())
        .map(|(x, y)| scalar_add(ctx, x, y))
        .collect()
}

/// Elementwise `add` over two [`HeTensor`]s of matching shape, returning a new tensor.
pub fn add(ctx: &SchemeContext, a: &HeTensor, b: &HeTensor) -> Result<HeTensor> {
    a.zip_map(b, |x, y| scalar_add(ctx, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::bfv::BfvScheme;
    use crate::scheme::SchemeParameters;

    fn ctx() -> SchemeContext {
        let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
        SchemeContext::new(Box::new(scheme)).unwrap()
    }

    #[test]
    fn plain_plain_add() {
        let ctx = ctx();
        let a = HeValue::from_plain(Plaintext::new(vec![1.0, 2.0], false));
        let b = HeValue::from_plain(Plaintext::new(vec![10.0, 20.0], false));
        let c = scalar_add(&ctx, &a, &b).unwrap();
        assert_eq!(c.as_plain().values(), &[11.0, 22.0]);
    }

    #[test]
    fn cipher_plain_zero_aliases_input() {
        let ctx = ctx();
        let p = ctx.scheme().encode(&[5.0], 1.0).unwrap();
        let cipher = HeValue::from_cipher(ctx.scheme().encrypt(&p));
        let zero = HeValue::from_plain(Plaintext::new(vec![0.0], false));
        let out = scalar_add(&ctx, &cipher, &zero).unwrap();
        assert_eq!(out, cipher);
    }

    #[test]
    fn cipher_cipher_add_decrypts_correctly() {
        let ctx = ctx();
        let pa = ctx.scheme().encode(&[1.0, 2.0, 3.0, 4.0], 1.0).unwrap();
        let pb = ctx.scheme().encode(&[10.0, 20.0, 30.0, 40.0], 1.0).unwrap();
        let a = HeValue::from_cipher(ctx.scheme().encrypt(&pa));
        let b = HeValue::from_cipher(ctx.scheme().encrypt(&pb));
        let c = scalar_add(&ctx, &a, &b).unwrap();
        let decrypted = ctx.scheme().decrypt(c.as_cipher());
        assert_eq!(ctx.scheme().decode(&decrypted), vec![11.0, 22.0, 33.0, 44.0]);
    }
}
