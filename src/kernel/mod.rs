//! Scalar and tensor-level arithmetic kernels over [`HeValue`](crate::value::HeValue).
//!
//! Every kernel comes in a scalar form (the authoritative contract, §4.3) and
//! a tensor-level form that fans the scalar form out over a [`HeTensor`]'s
//! slots in parallel via `rayon` (§5: output slots are written disjointly, so
//! this is safe by construction).

pub mod add;
pub mod broadcast;
pub mod dot;
pub mod multiply;
pub mod negate;
pub mod relinearize;
pub mod rescale;

use crate::error::Result;
use crate::scheme::SchemeContext;
use crate::value::Ciphertext;

/// Brings two ciphertexts to the same CKKS chain index by rescaling whichever
/// has the larger one, repeatedly, until they match (or one bottoms out at
/// chain index 0 while still mismatched, which is a genuine `ChainMismatch`).
///
/// A no-op on BFV, where every ciphertext's chain index is always 0.
pub(crate) fn reconcile_chain(
    ctx: &SchemeContext,
    a: &Ciphertext,
    b: &Ciphertext,
) -> Result<(Ciphertext, Ciphertext)> {
    let mut a = a.clone();
    let mut b = b.clone();

    // Chain index only ever decreases, so this always terminates.
    while a.chain_index() != b.chain_index() {
        if a.chain_index() > b.chain_index() {
            let before = a.chain_index();
            ctx.scheme().rescale_to_next(&mut a)?;
            if a.chain_index() == before {
                break;
            }
        } else {
            let before = b.chain_index();
            ctx.scheme().rescale_to_next(&mut b)?;
            if b.chain_index() == before {
                break;
            }
        }
    }

    if a.chain_index() != b.chain_index() {
        return Err(crate::error::Error::ChainMismatch {
            left: a.chain_index(),
            right: b.chain_index(),
        });
    }

    Ok((a, b))
}
