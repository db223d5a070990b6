//! `broadcast`, §4.3.6: purely structural, no crypto operations.

use crate::error::Result;
use crate::tensor::HeTensor;

/// Expands `tensor` to `out_shape` by replicating slots along `broadcast_axes`.
pub fn broadcast(tensor: &HeTensor, out_shape: &[usize], broadcast_axes: &[usize]) -> Result<HeTensor> {
    tensor.broadcast_to(out_shape, broadcast_axes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::bfv::BfvScheme;
    use crate::scheme::{SchemeContext, SchemeParameters};
    use crate::tensor::Datatype;
    use byteorder::{ByteOrder, LittleEndian};

    fn ctx() -> SchemeContext {
        let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
        SchemeContext::new(Box::new(scheme)).unwrap()
    }

    #[test]
    fn broadcast_row_across_new_leading_axis() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![2], false, false).unwrap();
        let mut bytes = vec![0u8; 16];
        LittleEndian::write_f64(&mut bytes[0..8], 1.0);
        LittleEndian::write_f64(&mut bytes[8..16], 2.0);
        t.write(&ctx, &bytes, 0, 16).unwrap();

        let out = broadcast(&t, &[3, 2], &[0]).unwrap();
        assert_eq!(out.element_count(), 6);
        for row in 0..3 {
            assert_eq!(out.get_element(row * 2).unwrap().as_plain().values(), &[1.0]);
            assert_eq!(out.get_element(row * 2 + 1).unwrap().as_plain().values(), &[2.0]);
        }
    }
}
