//! `scalar_negate` / tensor `negate`, §4.3.3.

use rayon::prelude::*;

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::{HeValue, Plaintext};

/// `c = -a`, purely local: no chain or scale bookkeeping changes.
pub fn scalar_negate(ctx: &SchemeContext, a: &HeValue) -> HeValue {
    match a {
        HeValue::Plain(p) => HeValue::from_plain(Plaintext::new(
            p.values().iter().map(|&v| -v).collect(),
            p.complex_packing(),
        )),
        HeValue::Cipher(c) => HeValue::from_cipher(ctx.scheme().negate(c)),
    }
}

/// Elementwise `negate` over a slice of values.
pub fn tensor_negate(ctx: &SchemeContext, a: &[HeValue]) -> Vec<HeValue> {
    a.par_iter().map(|x| scalar_negate(ctx, x)).collect()
}

/// Elementwise `negate` over an [`HeTensor`].
pub fn negate(ctx: &SchemeContext, a: &HeTensor) -> Result<HeTensor> {
    a.map(|x| Ok(scalar_negate(ctx, x)))
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
    fn negate_plain() {
        let ctx = ctx();
        let a = HeValue::from_plain(Plaintext::new(vec![1.0, -2.0], false));
        let c = scalar_negate(&ctx, &a);
        assert_eq!(c.as_plain().values(), &[-1.0, 2.0]);
    }

    #[test]
    fn negate_cipher_decrypts_correctly() {
        let ctx = ctx();
        let p = ctx.scheme().encode(&[3.0, -4.0], 1.0).unwrap();
        let a = HeValue::from_cipher(ctx.scheme().encrypt(&p));
        let c = scalar_negate(&ctx, &a);
        let decoded = ctx.scheme().decode(&ctx.scheme().decrypt(c.as_cipher()));
        assert_eq!(decoded, vec![-3.0, 4.0]);
    }

    #[test]
    fn double_negate_preserves_known_value() {
        let ctx = ctx();
        let zero = ctx.cached_ciphertext(0, 1).unwrap();
        let c = scalar_negate(&ctx, &HeValue::from_cipher(zero));
        assert_eq!(c.as_cipher().known_value(), Some(0.0));
    }
}
