//! The tagged plaintext/ciphertext value (§1b/§4.1) every kernel operates on.

use serde::{Deserialize, Serialize};

/// A batched vector of real numbers, not yet (or no longer) encrypted.
///
/// `complex_packing` records whether this plaintext was encoded for CKKS's
/// complex-valued SIMD slots (two reals per slot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plaintext {
    values: Vec<f64>,
    complex_packing: bool,
}

impl Plaintext {
    /// Builds a plaintext from already-decoded real values.
    pub fn new(values: Vec<f64>, complex_packing: bool) -> Self {
        Self {
            values,
            complex_packing,
        }
    }

    /// The batch lanes carried by this plaintext.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of SIMD lanes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether this plaintext carries zero lanes.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether this plaintext was encoded with CKKS complex packing.
    pub fn complex_packing(&self) -> bool {
        self.complex_packing
    }

    /// True if every lane equals `constant`.
    pub fn is_constant(&self, constant: f64) -> bool {
        !self.values.is_empty() && self.values.iter().all(|&v| v == constant)
    }
}

/// An opaque encrypted polynomial plus the bookkeeping a CKKS evaluation
/// needs to keep noise and the modulus chain consistent.
///
/// `payload` stands in for the scheme library's native ciphertext bytes; see
/// `scheme` module docs for why this reference implementation keeps the
/// real values here instead of a lattice-encrypted blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    payload: Vec<f64>,
    chain_index: u32,
    scale: f64,
    complex_packing: bool,
    batch_size: usize,
    /// Ciphertext polynomial degree: 2 normally, 3 between a multiply and its relinearize.
    degree: u8,
    known_value: Option<f64>,
}

impl Ciphertext {
    /// Constructs a ciphertext with the given bookkeeping, at degree 2 (the
    /// post-relinearize/freshly-encrypted steady state).
    pub fn new(
        payload: Vec<f64>,
        chain_index: u32,
        scale: f64,
        complex_packing: bool,
        batch_size: usize,
    ) -> Self {
        Self {
            payload,
            chain_index,
            scale,
            complex_packing,
            batch_size,
            degree: 2,
            known_value: None,
        }
    }

    /// The raw per-lane payload. Exposed to scheme adapters and kernels only;
    /// nothing outside this crate can see "inside" a ciphertext.
    pub(crate) fn payload(&self) -> &[f64] {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Vec<f64> {
        &mut self.payload
    }

    /// Position in the modulus-switching chain. Monotonically non-increasing
    /// under rescale.
    pub fn chain_index(&self) -> u32 {
        self.chain_index
    }

    pub(crate) fn set_chain_index(&mut self, idx: u32) {
        self.chain_index = idx;
    }

    /// CKKS fixed-point scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// Whether this ciphertext's slots pack complex (CKKS) values.
    pub fn complex_packing(&self) -> bool {
        self.complex_packing
    }

    /// Number of SIMD batch lanes.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Current polynomial degree (2, or 3 pending relinearize).
    pub fn degree(&self) -> u8 {
        self.degree
    }

    pub(crate) fn set_degree(&mut self, degree: u8) {
        self.degree = degree;
    }

    /// If set, this ciphertext is known to encrypt a vector filled with this
    /// constant — kernels may fold on this without decrypting.
    pub fn known_value(&self) -> Option<f64> {
        self.known_value
    }

    pub(crate) fn set_known_value(&mut self, value: Option<f64>) {
        self.known_value = value;
    }

    /// Builds a fresh ciphertext sharing this one's bookkeeping (chain index,
    /// scale, packing, batch size) but a new payload and unset known-value.
    pub(crate) fn sibling(&self, payload: Vec<f64>) -> Self {
        Self::new(
            payload,
            self.chain_index,
            self.scale,
            self.complex_packing,
            self.batch_size,
        )
    }
}

/// A single batched homomorphic value: either a plaintext or a ciphertext,
/// never both at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeValue {
    /// A value that has not been (or is no longer) encrypted.
    Plain(Plaintext),
    /// A value under encryption.
    Cipher(Ciphertext),
}

impl HeValue {
    /// Wraps a plaintext.
    pub fn from_plain(p: Plaintext) -> Self {
        HeValue::Plain(p)
    }

    /// Wraps a ciphertext.
    pub fn from_cipher(c: Ciphertext) -> Self {
        HeValue::Cipher(c)
    }

    /// Whether this value currently holds a plaintext.
    pub fn is_plain(&self) -> bool {
        matches!(self, HeValue::Plain(_))
    }

    /// Whether this value currently holds a ciphertext.
    pub fn is_cipher(&self) -> bool {
        matches!(self, HeValue::Cipher(_))
    }

    /// Replaces this value's contents with a plaintext, releasing any
    /// previously-owned ciphertext storage.
    pub fn set_plain(&mut self, p: Plaintext) {
        *self = HeValue::Plain(p);
    }

    /// Replaces this value's contents with a ciphertext, releasing any
    /// previously-owned plaintext storage.
    pub fn set_cipher(&mut self, c: Ciphertext) {
        *self = HeValue::Cipher(c);
    }

    /// Batch size of the underlying plaintext or ciphertext.
    pub fn batch_size(&self) -> usize {
        match self {
            HeValue::Plain(p) => p.len(),
            HeValue::Cipher(c) => c.batch_size(),
        }
    }

    /// Whether the underlying value uses CKKS complex packing.
    pub fn complex_packing(&self) -> bool {
        match self {
            HeValue::Plain(p) => p.complex_packing(),
            HeValue::Cipher(c) => c.complex_packing(),
        }
    }

    /// Borrows the plaintext, panicking if this value is a ciphertext.
    pub fn as_plain(&self) -> &Plaintext {
        match self {
            HeValue::Plain(p) => p,
            HeValue::Cipher(_) => panic!("HeValue::as_plain called on a Cipher value"),
        }
    }

    /// Borrows the ciphertext, panicking if this value is a plaintext.
    pub fn as_cipher(&self) -> &Ciphertext {
        match self {
            HeValue::Cipher(c) => c,
            HeValue::Plain(_) => panic!("HeValue::as_cipher called on a Plain value"),
        }
    }
}
