//! `dot`, §4.3.4: elementwise multiply followed by a pairwise-tree sum.
//!
//! The summation order is a pairwise tree rather than a linear left fold —
//! same reduction shape as `ngraph::he::kernel::dot`, which keeps rounding
//! behavior (and, for BFV, the modular reduction path) stable regardless of
//! vector length.

use crate::error::{Error, Result};
use crate::scheme::SchemeContext;
use crate::value::HeValue;

use super::add::scalar_add;
use super::multiply::scalar_multiply;

/// Pairwise-sums `values` down to a single [`HeValue`]. Empty input is a
/// caller error — there is no well-typed identity element to return, since
/// the scheme's chain/scale bookkeeping has to come from *some* ciphertext.
fn pairwise_sum(ctx: &SchemeContext, mut values: Vec<HeValue>) -> Result<HeValue> {
    if values.is_empty() {
        return Err(Error::ShapeMismatch(
            "dot: cannot reduce an empty vector".into(),
        ));
    }
    while values.len() > 1 {
        let mut next = Vec::with_capacity((values.len() + 1) / 2);
        let mut it = values.into_iter();
        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next.push(scalar_add(ctx, &a, &b)?),
                None => next.push(a),
            }
        }
        values = next;
    }
    Ok(values.into_iter().next().unwrap())
}

/// `dot(a, b)`: `sum_i(a[i] * b[i])`, reduced pairwise. `a` and `b` must have
/// the same length.
pub fn dot(ctx: &SchemeContext, a: &[HeValue], b: &[HeValue]) -> Result<HeValue> {
    if a.len() != b.len() {
        return Err(Error::ShapeMismatch(format!(
            "dot operands have mismatched lengths {} and {}",
            a.len(),
            b.len()
        )));
    }
    let products: Vec<HeValue> = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| scalar_multiply(ctx, x, y))
        .collect::<Result<_>>()?;
    pairwise_sum(ctx, products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::bfv::BfvScheme;
    use crate::scheme::SchemeParameters;
    use crate::value::Plaintext;

    fn ctx() -> SchemeContext {
        let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
        SchemeContext::new(Box::new(scheme)).unwrap()
    }

    fn cipher_vec(ctx: &SchemeContext, values: &[f64]) -> Vec<HeValue> {
        values
            .iter()
            .map(|&v| {
                let p = ctx.scheme().encode(&[v], 1.0).unwrap();
                HeValue::from_cipher(ctx.scheme().encrypt(&p))
            })
            .collect()
    }

    #[test]
    fn dot_matches_plain_dot_product() {
        let ctx = ctx();
        let a = cipher_vec(&ctx, &[1.0, 2.0, 3.0, 4.0]);
        let b = cipher_vec(&ctx, &[10.0, 20.0, 30.0, 40.0]);
        let result = dot(&ctx, &a, &b).unwrap();
        let decoded = ctx.scheme().decode(&ctx.scheme().decrypt(result.as_cipher()));
        // 10 + 40 + 90 + 160 = 300
        assert_eq!(decoded, vec![300.0]);
    }

    #[test]
    fn dot_handles_odd_length_via_carry() {
        let ctx = ctx();
        let a = cipher_vec(&ctx, &[1.0, 2.0, 3.0]);
        let b = cipher_vec(&ctx, &[1.0, 1.0, 1.0]);
        let result = dot(&ctx, &a, &b).unwrap();
        let decoded = ctx.scheme().decode(&ctx.scheme().decrypt(result.as_cipher()));
        assert_eq!(decoded, vec![6.0]);
    }

    #[test]
    fn dot_rejects_length_mismatch() {
        let ctx = ctx();
        let a = cipher_vec(&ctx, &[1.0, 2.0]);
        let b = cipher_vec(&ctx, &[1.0]);
        assert!(matches!(dot(&ctx, &a, &b), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn dot_of_single_element_is_the_product() {
        let ctx = ctx();
        let a = cipher_vec(&ctx, &[7.0]);
        let b = cipher_vec(&ctx, &[6.0]);
        let result = dot(&ctx, &a, &b).unwrap();
        let decoded = ctx.scheme().decode(&ctx.scheme().decrypt(result.as_cipher()));
        assert_eq!(decoded, vec![42.0]);
    }

    #[test]
    fn dot_with_plain_operand() {
        let ctx = ctx();
        let a = cipher_vec(&ctx, &[2.0, 3.0]);
        let b = vec![
            HeValue::from_plain(Plaintext::new(vec![5.0], false)),
            HeValue::from_plain(Plaintext::new(vec![5.0], false)),
        ];
        let result = dot(&ctx, &a, &b).unwrap();
        let decoded = ctx.scheme().decode(&ctx.scheme().decrypt(result.as_cipher()));
        assert_eq!(decoded, vec![25.0]);
    }
}
