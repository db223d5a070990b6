//! `rescale(tensor)`, §4.3.5. CKKS only; a no-op on BFV and on all-plaintext tensors.

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::tensor::HeTensor;
use crate::value::HeValue;

/// Drops every ciphertext slot's chain index by one level, provided the
/// tensor's minimum chain index across ciphertext slots is still above zero.
pub fn rescale(ctx: &SchemeContext, tensor: &HeTensor) -> Result<HeTensor> {
    let min_chain = tensor
        .get_elements()
        .iter()
        .filter_map(|v| match v {
            HeValue::Cipher(c) => Some(c.chain_index()),
            HeValue::Plain(_) => None,
        })
        .min();
    let min_chain = match min_chain {
        Some(m) => m,
        None => return Ok(tensor.clone()),
    };
    if min_chain == 0 {
        return Ok(tensor.clone());
    }

    tensor.map(|v| match v {
        HeValue::Plain(_) => Ok(v.clone()),
        HeValue::Cipher(c) => {
            let mut out = c.clone();
            ctx.scheme().rescale_to_next(&mut out)?;
            Ok(HeValue::from_cipher(out))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::ckks::CkksScheme;
    use crate::scheme::SchemeParameters;
    use crate::tensor::Datatype;
    use byteorder::{ByteOrder, LittleEndian};

    fn ctx() -> SchemeContext {
        let scheme = CkksScheme::new(SchemeParameters::ckks_default()).unwrap();
        SchemeContext::new(Box::new(scheme)).unwrap()
    }

    #[test]
    fn rescale_drops_chain_index_by_one() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![1], true, true).unwrap();
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_f64(&mut bytes[0..8], 2.0);
        t.write(&ctx, &bytes, 0, 8).unwrap();
        let before = t.get_element(0).unwrap().as_cipher().chain_index();

        let out = rescale(&ctx, &t).unwrap();
        let after = out.get_element(0).unwrap().as_cipher().chain_index();
        assert_eq!(after, before - 1);
    }

    #[test]
    fn rescale_is_noop_at_chain_zero() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![1], true, true).unwrap();
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_f64(&mut bytes[0..8], 2.0);
        t.write(&ctx, &bytes, 0, 8).unwrap();

        let mut cur = t;
        for _ in 0..10 {
            cur = rescale(&ctx, &cur).unwrap();
        }
        assert_eq!(cur.get_element(0).unwrap().as_cipher().chain_index(), 0);
        let again = rescale(&ctx, &cur).unwrap();
        assert_eq!(again.get_element(0).unwrap().as_cipher().chain_index(), 0);
    }

    #[test]
    fn rescale_is_noop_on_all_plaintext_tensor() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![1], true, false).unwrap();
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_f64(&mut bytes[0..8], 2.0);
        t.write(&ctx, &bytes, 0, 8).unwrap();
        let out = rescale(&ctx, &t).unwrap();
        assert!(out.get_element(0).unwrap().is_plain());
    }
}
