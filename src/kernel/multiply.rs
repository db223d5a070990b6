//! `scalar_multiply` / tensor `multiply`, §4.3.2.

use rayon::prelude::*;

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::{Ciphertext, HeValue, Plaintext};

use super::reconcile_chain;

fn zero_cipher(ctx: &SchemeContext, batch_size: usize) -> Result<Ciphertext> {
    if let Some(c) = ctx.cached_ciphertext(0, batch_size) {
        return Ok(c);
    }
    let plain = ctx
        .scheme()
        .encode(&vec![0.0; batch_size], ctx.scheme().params().scale)?;
    let mut c = ctx.scheme().encrypt(&plain);
    c.set_known_value(Some(0.0));
    Ok(c)
}

/// Folds multiplication by a cached constant (0, 1, −1) against `other`,
/// returning `None` if `k` isn't one of those three.
fn fold_cipher_constant(
    ctx: &SchemeContext,
    k: f64,
    other: &Ciphertext,
) -> Option<Result<HeValue>> {
    if k == 0.0 {
        return Some(zero_cipher(ctx, other.batch_size()).map(HeValue::from_cipher));
    }
    if k == 1.0 {
        return Some(Ok(HeValue::from_cipher(other.clone())));
    }
    if k == -1.0 {
        return Some(Ok(HeValue::from_cipher(ctx.scheme().negate(other))));
    }
    None
}

/// `c = a * b` for every combination of plain/cipher operands (§4.3.2).
///
/// After any Cipher×Cipher or Cipher×Plain multiply that isn't folded away,
/// the output's polynomial degree is 3 — callers must schedule a relinearize
/// (§4.7) and, for CKKS, a rescale (§4.3.5).
pub fn scalar_multiply(ctx: &SchemeContext, a: &HeValue, b: &HeValue) -> Result<HeValue> {
    match (a, b) {
        (HeValue::Plain(pa), HeValue::Plain(pb)) => {
            let values: Vec<f64> = pa.values().iter().zip(pb.values()).map(|(x, y)| x * y).collect();
            Ok(HeValue::from_plain(Plaintext::new(values, pa.complex_packing())))
        }
        (HeValue::Cipher(ca), HeValue::Plain(pb)) => {
            if pb.is_constant(0.0) {
                return Ok(HeValue::from_cipher(zero_cipher(ctx, ca.batch_size())?));
            }
            if pb.is_constant(1.0) {
                return Ok(a.clone());
            }
            if pb.is_constant(-1.0) {
                return Ok(HeValue::from_cipher(ctx.scheme().negate(ca)));
            }
            Ok(HeValue::from_cipher(ctx.scheme().mul_plain(ca, pb)?))
        }
        (HeValue::Plain(_), HeValue::Cipher(_)) => scalar_multiply(ctx, b, a),
        (HeValue::Cipher(ca), HeValue::Cipher(cb)) => {
            if let Some(z) = ca.known_value() {
                if let Some(result) = fold_cipher_constant(ctx, z, cb) {
                    return result;
                }
            }
            if let Some(z) = cb.known_value() {
                if let Some(result) = fold_cipher_constant(ctx, z, ca) {
                    return result;
                }
            }
            if std::ptr::eq(a, b) {
                Ok(HeValue::from_cipher(ctx.scheme().square(ca)?))
            } else {
                let (ra, rb) = reconcile_chain(ctx, ca, cb)?;
                Ok(HeValue::from_cipher(ctx.scheme().mul(&ra, &rb)?))
            }
        }
    }
}

/// Elementwise `multiply` over two tensors of matching length.
pub fn tensor_multiply(ctx: &SchemeContext, a: &[HeValue], b: &[HeValue]) -> Result<Vec<HeValue>> {
    a.par_iter()
        .zip(b.par_iter())
        .map(|(x, y)| scalar_multiply(ctx, x, y))
        .collect()
}

/// Elementwise `multiply` over two [`HeTensor`]s of matching shape.
pub fn multiply(ctx: &SchemeContext, a: &HeTensor, b: &HeTensor) -> Result<HeTensor> {
    a.zip_map(b, |x, y| scalar_multiply(ctx, x, y))
}
