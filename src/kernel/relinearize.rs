//! Scalar `relinearize`, the kernel invoked by the `Relinearize` graph node
//! the §4.7 pass inserts. A no-op on plaintexts and on already-degree-2
//! ciphertexts.

use rayon::prelude::*;

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::HeValue;

/// Relinearizes a single value in place (conceptually; returns the updated value).
pub fn scalar_relinearize(ctx: &SchemeContext, a: &HeValue) -> Result<HeValue> {
    match a {
        HeValue::Plain(_) => Ok(a.clone()),
        HeValue::Cipher(c) => {
            let mut out = c.clone();
            ctx.scheme().relinearize(&mut out)?;
            Ok(HeValue::from_cipher(out))
        }
    }
}

/// Elementwise `relinearize` over a slice of values.
pub fn tensor_relinearize(ctx: &SchemeContext, a: &[HeValue]) -> Result<Vec<HeValue>> {
    a.par_iter().map(|x| scalar_relinearize(ctx, x)).collect()
}

/// Elementwise `relinearize` over an [`HeTensor`].
pub fn relinearize(ctx: &SchemeContext, a: &HeTensor) -> Result<HeTensor> {
    a.map(|x| scalar_relinearize(ctx, x))
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
    fn relinearize_resets_degree_to_two() {
        let ctx = ctx();
        let p = ctx.scheme().encode(&[3.0], 1.0).unwrap();
        let c = ctx.scheme().encrypt(&p);
        let squared = ctx.scheme().square(&c).unwrap();
        assert_eq!(squared.degree(), 3);
        let relinearized = scalar_relinearize(&ctx, &HeValue::from_cipher(squared)).unwrap();
        assert_eq!(relinearized.as_cipher().degree(), 2);
    }

    #[test]
    fn relinearize_is_noop_on_plaintext() {
        use crate::value::Plaintext;
        let ctx = ctx();
        let p = HeValue::from_plain(Plaintext::new(vec![1.0], false));
        let out = scalar_relinearize(&ctx, &p).unwrap();
        assert_eq!(out, p);
    }
}
