//! The scheme adapter seam.
//!
//! `original_source`'s SEAL backend is an external collaborator the rest of
//! this crate only ever reaches through [`HeScheme`]. Swapping in a real
//! lattice-based library (SEAL, TFHE, ...) means implementing this trait;
//! nothing upstream of it (tensor, kernel, protocol) would change.
//!
//! The two adapters shipped here ([`bfv::BfvScheme`], [`ckks::CkksScheme`])
//! keep every bit of the *bookkeeping* contract (chain index, scale,
//! relinearize/rescale, BFV modular reduction, `known_value` folding) real,
//! but hold the actual per-lane values in the clear inside [`crate::value::Ciphertext`]
//! rather than behind lattice-based encryption — the primitive library itself
//! is explicitly out of scope (§1), and this keeps the rest of the stack
//! exercisable without a native FFI dependency.

pub mod bfv;
pub mod ckks;
pub mod params;

use std::collections::HashMap;

pub use params::{load_scheme_parameters, Scheme, SchemeParameters};

use crate::error::Result;
use crate::value::{Ciphertext, Plaintext};

/// The capability surface every scheme adapter implements.
pub trait HeScheme: Send + Sync {
    /// Which scheme this adapter implements.
    fn scheme_kind(&self) -> Scheme;

    /// The parameters this adapter was built from.
    fn params(&self) -> &SchemeParameters;

    /// Encodes real values into a plaintext at the given scale (ignored by BFV).
    fn encode(&self, values: &[f64], scale: f64) -> Result<Plaintext>;

    /// Decodes a plaintext back into real values.
    fn decode(&self, p: &Plaintext) -> Vec<f64>;

    /// Encrypts a plaintext, producing a fresh degree-2 ciphertext at the top
    /// of the modulus chain.
    fn encrypt(&self, p: &Plaintext) -> Ciphertext;

    /// Decrypts a ciphertext back to a plaintext.
    fn decrypt(&self, c: &Ciphertext) -> Plaintext;

    /// Ciphertext + ciphertext.
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// Ciphertext + plaintext.
    fn add_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext>;

    /// Ciphertext * ciphertext (degree rises to 3).
    fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// Ciphertext * plaintext (degree rises to 3).
    fn mul_plain(&self, a: &Ciphertext, b: &Plaintext) -> Result<Ciphertext>;

    /// Ciphertext squared (degree rises to 3).
    fn square(&self, a: &Ciphertext) -> Result<Ciphertext>;

    /// Unary negation.
    fn negate(&self, a: &Ciphertext) -> Ciphertext;

    /// Shrinks a ciphertext's polynomial degree back to 2. A no-op on BFV.
    fn relinearize(&self, c: &mut Ciphertext) -> Result<()>;

    /// Switches to the next modulus in the chain, dividing scale growth away.
    /// A no-op on BFV, and a no-op once `chain_index` reaches 0.
    fn rescale_to_next(&self, c: &mut Ciphertext) -> Result<()>;

    /// The chain index a freshly-encrypted ciphertext starts at.
    fn top_chain_index(&self) -> u32;

    /// Serializes this adapter's parameters for transmission to a peer.
    fn save_params(&self) -> Vec<u8>;

    /// An empty plaintext, for callers that need a destination to write into.
    fn empty_plaintext(&self) -> Plaintext;

    /// An empty ciphertext at the given batch size.
    fn empty_ciphertext(&self, batch_size: usize) -> Ciphertext;
}

/// Constants memoized once at context construction, per §3's `plaintext_cache`.
const CACHED_CONSTANTS: [i8; 3] = [0, 1, -1];

/// Holds a scheme adapter plus the read-only state every kernel worker may
/// share: the encoder/evaluator (folded into the adapter itself here) and a
/// small cache of encrypted 0/1/−1 constants used for constant folding.
///
/// Created once per process (or per connection, server-side); immutable
/// afterwards, so it's safe to share across the `rayon` worker pool kernels
/// use internally (§5).
pub struct SchemeContext {
    scheme: Box<dyn HeScheme>,
    plaintext_cache: HashMap<i8, Plaintext>,
    ciphertext_cache: HashMap<i8, Ciphertext>,
}

impl SchemeContext {
    /// Builds a context from the given scheme adapter, eagerly memoizing the
    /// encoded and encrypted forms of 0, 1, and −1.
    pub fn new(scheme: Box<dyn HeScheme>) -> Result<Self> {
        let mut plaintext_cache = HashMap::new();
        let mut ciphertext_cache = HashMap::new();
        let scale = scheme.params().scale;

        for &k in &CACHED_CONSTANTS {
            let plain = scheme.encode(&[k as f64], scale)?;
            let mut cipher = scheme.encrypt(&plain);
            cipher.set_known_value(Some(k as f64));
            plaintext_cache.insert(k, plain);
            ciphertext_cache.insert(k, cipher);
        }

        Ok(Self {
            scheme,
            plaintext_cache,
            ciphertext_cache,
        })
    }

    /// The underlying scheme adapter.
    pub fn scheme(&self) -> &dyn HeScheme {
        self.scheme.as_ref()
    }

    /// The cached plaintext encoding of `k`, if `k` is one of {0, 1, −1}.
    pub fn cached_plaintext(&self, k: i8) -> Option<&Plaintext> {
        self.plaintext_cache.get(&k)
    }

    /// The cached ciphertext encryption of `k`, if `k` is one of {0, 1, −1},
    /// resized to `batch_size` lanes (the cache is built at batch size 1).
    pub fn cached_ciphertext(&self, k: i8, batch_size: usize) -> Option<Ciphertext> {
        let template = self.ciphertext_cache.get(&k)?;
        let mut c = template.clone();
        if batch_size != c.batch_size() {
            let payload = vec![k as f64; batch_size];
            c = Ciphertext::new(
                payload,
                c.chain_index(),
                c.scale(),
                c.complex_packing(),
                batch_size,
            );
            c.set_known_value(Some(k as f64));
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfv::BfvScheme;

    #[test]
    fn context_memoizes_constants() {
        let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
        let ctx = SchemeContext::new(Box::new(scheme)).unwrap();
        assert!(ctx.cached_plaintext(0).is_some());
        assert!(ctx.cached_plaintext(1).is_some());
        assert!(ctx.cached_plaintext(-1).is_some());
        assert!(ctx.cached_plaintext(2).is_none());

        let zero = ctx.cached_ciphertext(0, 1).unwrap();
        assert_eq!(zero.known_value(), Some(0.0));
    }
}
