//! `HeTensor`, §4.2: batched owner of [`HeValue`]s with bulk encode/encrypt
//! ("write") and decrypt/decode ("read") I/O paths, plus packing transforms.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scheme::SchemeContext;
use crate::value::{HeValue, Plaintext};

/// Element datatype carried by a tensor, independent of its encryption state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datatype {
    F32,
    F64,
    I32,
    I64,
}

impl Datatype {
    /// Byte width of one element in this datatype's wire encoding.
    pub fn element_size(self) -> usize {
        match self {
            Datatype::F32 | Datatype::I32 => 4,
            Datatype::F64 | Datatype::I64 => 8,
        }
    }

    fn read(self, bytes: &[u8]) -> f64 {
        match self {
            Datatype::F32 => LittleEndian::read_f32(bytes) as f64,
            Datatype::F64 => LittleEndian::read_f64(bytes),
            Datatype::I32 => LittleEndian::read_i32(bytes) as f64,
            Datatype::I64 => LittleEndian::read_i64(bytes) as f64,
        }
    }

    fn write(self, v: f64, bytes: &mut [u8]) {
        match self {
            Datatype::F32 => LittleEndian::write_f32(bytes, v as f32),
            Datatype::F64 => LittleEndian::write_f64(bytes, v),
            Datatype::I32 => LittleEndian::write_i32(bytes, v.round() as i32),
            Datatype::I64 => LittleEndian::write_i64(bytes, v.round() as i64),
        }
    }
}

/// `known_value` is populated only when every lane of a freshly-written slot
/// is one of the cached constants (§1b).
fn constant_of(lanes: &[f64]) -> Option<f64> {
    const CANDIDATES: [f64; 3] = [0.0, 1.0, -1.0];
    CANDIDATES
        .into_iter()
        .find(|&k| !lanes.is_empty() && lanes.iter().all(|&v| v == k))
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let strides = row_major_strides(shape);
    let mut coord = vec![0usize; shape.len()];
    for (axis, &stride) in strides.iter().enumerate() {
        coord[axis] = flat / stride.max(1);
        flat %= stride.max(1);
    }
    coord
}

/// A logical tensor: element datatype, shape, a packing flag, and the
/// `HeValue` slots backing it. `elements.len() == shape.product() / batch_size`.
///
/// `batch_size` is tracked as its own field rather than derived from
/// `shape[0]`, because `pack()` collapses axis 0 to `1` in the *shape* while
/// the true SIMD lane count lives on in every slot's `HeValue`
/// (`original_source/src/he_tensor.cpp`'s `HETensor::batch_size` keeps the
/// same distinction between a tensor's packed shape and its batch count).
#[derive(Debug, Clone)]
pub struct HeTensor {
    dtype: Datatype,
    shape: Vec<usize>,
    packed: bool,
    batch_size: usize,
    initially_encrypted: bool,
    elements: Vec<HeValue>,
}

impl HeTensor {
    /// Builds a tensor of the given shape, zero-initialized, not yet written.
    pub fn new(
        dtype: Datatype,
        shape: Vec<usize>,
        packed: bool,
        initially_encrypted: bool,
    ) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::BadShape("shape must have at least one axis".into()));
        }
        let batch_size = Self::batch_size_for(&shape, packed);
        let logical_size: usize = shape.iter().product();
        if batch_size == 0 || logical_size % batch_size != 0 {
            return Err(Error::BadShape(format!(
                "logical size {logical_size} not divisible by batch size {batch_size}"
            )));
        }
        let element_count = logical_size / batch_size;
        let elements =
            vec![HeValue::from_plain(Plaintext::new(vec![0.0; batch_size], false)); element_count];
        Ok(Self {
            dtype,
            shape,
            packed,
            batch_size,
            initially_encrypted,
            elements,
        })
    }

    fn batch_size_for(shape: &[usize], packed: bool) -> usize {
        if packed {
            shape[0]
        } else {
            1
        }
    }

    /// Element datatype.
    pub fn dtype(&self) -> Datatype {
        self.dtype
    }

    /// Logical shape. Once packed, axis 0 reads `1` here — the true lane
    /// count is [`HeTensor::batch_size`].
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Whether axis 0 has been folded into the SIMD batch dimension.
    pub fn packed(&self) -> bool {
        self.packed
    }

    /// Number of SIMD lanes per slot.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of `HeValue` slots.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Borrows slot `i`.
    pub fn get_element(&self, i: usize) -> Result<&HeValue> {
        self.elements
            .get(i)
            .ok_or_else(|| Error::IoOutOfRange(format!("element index {i} out of range")))
    }

    /// Borrows every slot.
    pub fn get_elements(&self) -> &[HeValue] {
        &self.elements
    }

    /// Bulk-replaces every slot. `elements.len()` must match the existing slot count.
    pub fn set_elements(&mut self, elements: Vec<HeValue>) -> Result<()> {
        if elements.len() != self.elements.len() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} elements, got {}",
                self.elements.len(),
                elements.len()
            )));
        }
        self.elements = elements;
        Ok(())
    }

    /// Encodes (and, if this tensor stores ciphertexts, encrypts) `byte_count`
    /// bytes of `source` starting at `byte_offset`, per §4.2's interleaved
    /// strided layout.
    pub fn write(
        &mut self,
        ctx: &SchemeContext,
        source: &[u8],
        byte_offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        let element_size = self.dtype.element_size();
        if byte_offset % element_size != 0 || byte_count % element_size != 0 {
            return Err(Error::BadDatatype(
                "byte_offset/byte_count must be multiples of the element size".into(),
            ));
        }
        if source.len() < byte_offset + byte_count {
            return Err(Error::IoOutOfRange(
                "source buffer shorter than byte_offset + byte_count".into(),
            ));
        }
        let batch_size = self.batch_size();
        let total_elements = byte_count / element_size;
        if total_elements % batch_size != 0 {
            return Err(Error::BadShape(
                "byte_count does not divide evenly into batch_size lanes".into(),
            ));
        }
        let num_elements = total_elements / batch_size;
        let start_slot = (byte_offset / element_size) / batch_size;
        if start_slot + num_elements > self.elements.len() {
            return Err(Error::IoOutOfRange(format!(
                "write would exceed tensor of {} slots",
                self.elements.len()
            )));
        }

        for i in 0..num_elements {
            let mut lanes = Vec::with_capacity(batch_size);
            for j in 0..batch_size {
                let elem_index = i + j * num_elements;
                let off = byte_offset + element_size * elem_index;
                lanes.push(self.dtype.read(&source[off..off + element_size]));
            }
            let plain = ctx.scheme().encode(&lanes, ctx.scheme().params().scale)?;
            let value = if self.initially_encrypted {
                let mut cipher = ctx.scheme().encrypt(&plain);
                if let Some(k) = constant_of(&lanes) {
                    cipher.set_known_value(Some(k));
                }
                HeValue::from_cipher(cipher)
            } else {
                HeValue::from_plain(plain)
            };
            self.elements[start_slot + i] = value;
        }
        Ok(())
    }

    /// Inverse of [`HeTensor::write`]: decrypts/decodes `num_elements` slots
    /// starting at `byte_offset` and scatters them back into interleaved
    /// strided layout in `dest`.
    pub fn read(
        &self,
        ctx: &SchemeContext,
        dest: &mut [u8],
        byte_offset: usize,
        byte_count: usize,
    ) -> Result<()> {
        let element_size = self.dtype.element_size();
        if byte_offset % element_size != 0 || byte_count % element_size != 0 {
            return Err(Error::BadDatatype(
                "byte_offset/byte_count must be multiples of the element size".into(),
            ));
        }
        if dest.len() < byte_offset + byte_count {
            return Err(Error::IoOutOfRange(
                "dest buffer shorter than byte_offset + byte_count".into(),
            ));
        }
        let batch_size = self.batch_size();
        let total_elements = byte_count / element_size;
        if total_elements % batch_size != 0 {
            return Err(Error::BadShape(
                "byte_count does not divide evenly into batch_size lanes".into(),
            ));
        }
        let num_elements = total_elements / batch_size;
        let start_slot = (byte_offset / element_size) / batch_size;
        if start_slot + num_elements > self.elements.len() {
            return Err(Error::IoOutOfRange(format!(
                "read would exceed tensor of {} slots",
                self.elements.len()
            )));
        }

        for i in 0..num_elements {
            let lanes = match &self.elements[start_slot + i] {
                HeValue::Plain(p) => p.values().to_vec(),
                HeValue::Cipher(c) => ctx.scheme().decode(&ctx.scheme().decrypt(c)),
            };
            for j in 0..batch_size {
                let elem_index = i + j * num_elements;
                let off = byte_offset + element_size * elem_index;
                let v = lanes.get(j).copied().unwrap_or(0.0);
                self.dtype.write(v, &mut dest[off..off + element_size]);
            }
        }
        Ok(())
    }

    /// Collapses axis 0 into the SIMD batch dimension, producing a packed
    /// tensor of shape `[1, d1, ..., dk]`.
    pub fn pack(&self, ctx: &SchemeContext) -> Result<HeTensor> {
        if self.packed {
            return Err(Error::UnsupportedAxis("tensor is already packed".into()));
        }
        let b = self.shape[0];
        if b == 0 {
            return Err(Error::BadShape("axis 0 must be non-empty to pack".into()));
        }
        let inner: usize = self.shape[1..].iter().product::<usize>().max(1);
        if self.elements.len() != b * inner {
            return Err(Error::ShapeMismatch(
                "unpacked element count does not match shape".into(),
            ));
        }

        let mut packed_elements = Vec::with_capacity(inner);
        for i in 0..inner {
            let mut lanes = Vec::with_capacity(b);
            for j in 0..b {
                lanes.push(self.scalar_at(ctx, j * inner + i)?);
            }
            packed_elements.push(self.encode_slot(ctx, &lanes)?);
        }

        let mut out_shape = self.shape.clone();
        out_shape[0] = 1;
        Ok(HeTensor {
            dtype: self.dtype,
            shape: out_shape,
            packed: true,
            batch_size: b,
            initially_encrypted: self.initially_encrypted,
            elements: packed_elements,
        })
    }

    /// Reverses [`HeTensor::pack`], expanding the batch dimension back onto axis 0.
    pub fn unpack(&self, ctx: &SchemeContext) -> Result<HeTensor> {
        if !self.packed {
            return Err(Error::UnsupportedAxis("tensor is not packed".into()));
        }
        let b = self.batch_size();
        let inner = self.elements.len();
        let mut out_elements = Vec::with_capacity(b * inner);
        out_elements.resize_with(b * inner, || HeValue::from_plain(Plaintext::new(vec![0.0], false)));

        for i in 0..inner {
            let lanes = self.lanes_at(ctx, i)?;
            for j in 0..b {
                let scalar = lanes.get(j).copied().unwrap_or(0.0);
                out_elements[j * inner + i] = self.encode_slot(ctx, &[scalar])?;
            }
        }

        let mut out_shape = self.shape.clone();
        out_shape[0] = b;
        Ok(HeTensor {
            dtype: self.dtype,
            shape: out_shape,
            packed: false,
            batch_size: 1,
            initially_encrypted: self.initially_encrypted,
            elements: out_elements,
        })
    }

    fn lanes_at(&self, ctx: &SchemeContext, slot: usize) -> Result<Vec<f64>> {
        match &self.elements[slot] {
            HeValue::Plain(p) => Ok(p.values().to_vec()),
            HeValue::Cipher(c) => Ok(ctx.scheme().decode(&ctx.scheme().decrypt(c))),
        }
    }

    fn scalar_at(&self, ctx: &SchemeContext, slot: usize) -> Result<f64> {
        Ok(self.lanes_at(ctx, slot)?.first().copied().unwrap_or(0.0))
    }

    fn encode_slot(&self, ctx: &SchemeContext, lanes: &[f64]) -> Result<HeValue> {
        let plain = ctx.scheme().encode(lanes, ctx.scheme().params().scale)?;
        if self.initially_encrypted {
            let mut cipher = ctx.scheme().encrypt(&plain);
            if let Some(k) = constant_of(lanes) {
                cipher.set_known_value(Some(k));
            }
            Ok(HeValue::from_cipher(cipher))
        } else {
            Ok(HeValue::from_plain(plain))
        }
    }

    /// Elementwise binary op against `other`, requiring identical shapes.
    /// Output is flagged as ciphertext-backed if any produced slot is.
    pub fn zip_map<F>(&self, other: &HeTensor, f: F) -> Result<HeTensor>
    where
        F: Fn(&HeValue, &HeValue) -> Result<HeValue>,
    {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch(format!(
                "{:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        if self.elements.len() != other.elements.len() {
            return Err(Error::ShapeMismatch("mismatched element counts".into()));
        }
        let elements: Vec<HeValue> = self
            .elements
            .iter()
            .zip(other.elements.iter())
            .map(|(a, b)| f(a, b))
            .collect::<Result<_>>()?;
        let any_cipher = elements.iter().any(HeValue::is_cipher);
        Ok(HeTensor {
            dtype: self.dtype,
            shape: self.shape.clone(),
            packed: self.packed,
            batch_size: self.batch_size,
            initially_encrypted: any_cipher,
            elements,
        })
    }

    /// Elementwise unary op.
    pub fn map<F>(&self, f: F) -> Result<HeTensor>
    where
        F: Fn(&HeValue) -> Result<HeValue>,
    {
        let elements: Vec<HeValue> = self.elements.iter().map(f).collect::<Result<_>>()?;
        let any_cipher = elements.iter().any(HeValue::is_cipher);
        Ok(HeTensor {
            dtype: self.dtype,
            shape: self.shape.clone(),
            packed: self.packed,
            batch_size: self.batch_size,
            initially_encrypted: any_cipher,
            elements,
        })
    }

    /// Structural broadcast (§4.3.6): `broadcast_axes` names the axes of
    /// `out_shape`'s element-shape (i.e. excluding the packed batch axis)
    /// that don't exist in `self`'s shape.
    pub fn broadcast_to(&self, out_shape: &[usize], broadcast_axes: &[usize]) -> Result<HeTensor> {
        let elem_shape: Vec<usize> = if self.packed {
            self.shape[1..].to_vec()
        } else {
            self.shape.clone()
        };
        let out_elem_shape: Vec<usize> = if self.packed {
            out_shape[1..].to_vec()
        } else {
            out_shape.to_vec()
        };
        if elem_shape.len() + broadcast_axes.len() != out_elem_shape.len() {
            return Err(Error::ShapeMismatch(
                "broadcast_axes count inconsistent with input/output rank".into(),
            ));
        }
        let in_strides = row_major_strides(&elem_shape);
        let out_size: usize = out_elem_shape.iter().product();
        let mut out_elements = Vec::with_capacity(out_size);
        for flat in 0..out_size {
            let coord = unravel(flat, &out_elem_shape);
            let in_coord: Vec<usize> = coord
                .iter()
                .enumerate()
                .filter(|(axis, _)| !broadcast_axes.contains(axis))
                .map(|(_, &c)| c)
                .collect();
            if in_coord.len() != elem_shape.len() {
                return Err(Error::ShapeMismatch(
                    "broadcast projection produced the wrong rank".into(),
                ));
            }
            let in_flat: usize = in_coord.iter().zip(&in_strides).map(|(c, s)| c * s).sum();
            let value = self
                .elements
                .get(in_flat)
                .cloned()
                .ok_or_else(|| Error::IoOutOfRange("broadcast source index out of range".into()))?;
            out_elements.push(value);
        }
        Ok(HeTensor {
            dtype: self.dtype,
            shape: out_shape.to_vec(),
            packed: self.packed,
            batch_size: self.batch_size,
            initially_encrypted: self.initially_encrypted,
            elements: out_elements,
        })
    }
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
    fn write_then_read_round_trips_unpacked_plaintext() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![4], false, false).unwrap();
        let mut bytes = vec![0u8; 32];
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            LittleEndian::write_f64(&mut bytes[i * 8..i * 8 + 8], *v);
        }
        t.write(&ctx, &bytes, 0, 32).unwrap();
        assert_eq!(t.element_count(), 4);

        let mut out = vec![0u8; 32];
        t.read(&ctx, &mut out, 0, 32).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn write_populates_known_value_for_cached_constants() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![2], true, true).unwrap();
        let mut bytes = vec![0u8; 16];
        LittleEndian::write_f64(&mut bytes[0..8], 0.0);
        LittleEndian::write_f64(&mut bytes[8..16], 0.0);
        t.write(&ctx, &bytes, 0, 16).unwrap();
        assert_eq!(t.get_element(0).unwrap().as_cipher().known_value(), Some(0.0));
    }

    #[test]
    fn pack_then_unpack_preserves_values() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![2, 2], false, false).unwrap();
        let mut bytes = vec![0u8; 32];
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            LittleEndian::write_f64(&mut bytes[i * 8..i * 8 + 8], *v);
        }
        t.write(&ctx, &bytes, 0, 32).unwrap();

        let packed = t.pack(&ctx).unwrap();
        assert!(packed.packed());
        assert_eq!(packed.shape(), &[1, 2]);
        assert_eq!(packed.element_count(), 2);

        let unpacked = packed.unpack(&ctx).unwrap();
        assert_eq!(unpacked.shape(), &[2, 2]);
        let mut out = vec![0u8; 32];
        unpacked.read(&ctx, &mut out, 0, 32).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn write_rejects_misaligned_byte_offset() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![2], false, false).unwrap();
        let bytes = vec![0u8; 16];
        assert!(matches!(
            t.write(&ctx, &bytes, 3, 8),
            Err(Error::BadDatatype(_))
        ));
    }

    #[test]
    fn broadcast_replicates_scalar_across_new_axis() {
        let ctx = ctx();
        let mut t = HeTensor::new(Datatype::F64, vec![1], false, false).unwrap();
        let mut bytes = vec![0u8; 8];
        LittleEndian::write_f64(&mut bytes[0..8], 7.0);
        t.write(&ctx, &bytes, 0, 8).unwrap();

        let out = t.broadcast_to(&[3], &[0]).unwrap();
        assert_eq!(out.element_count(), 3);
        for i in 0..3 {
            assert_eq!(out.get_element(i).unwrap().as_plain().values(), &[7.0]);
        }
    }
}
