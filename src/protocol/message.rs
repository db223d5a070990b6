//! The `Message` schema (§6): one variant per state transition, encoded as
//! JSON (matching the rest of the crate's serde-first wire formats).

use serde::{Deserialize, Serialize};

/// A single protocol message. Exactly one payload per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Server → client: the scheme library's native parameter blob.
    EncryptionParameters {
        /// `HeScheme::save_params()` output.
        params: Vec<u8>,
    },
    /// Unused in the normative FSM; reserved for out-of-band key re-requests.
    PublicKeyRequest,
    /// Client → server: the client's public key.
    PublicKey {
        /// Opaque key bytes.
        key: Vec<u8>,
    },
    /// Server → client: acknowledges a received `PublicKey`.
    PublicKeyAck,
    /// Client → server: the client's relinearization/evaluation key set.
    EvalKey {
        /// Opaque key bytes.
        key: Vec<u8>,
    },
    /// Client → server: optional out-of-band query for the input shape.
    ParameterShapeRequest,
    /// Server → client: reply to `ParameterShapeRequest`.
    ParameterShape {
        /// The bound input tensor's shape.
        shape: Vec<u64>,
    },
    /// Server → client: number of ciphertexts the server expects in `Execute`.
    ParameterSize {
        /// Expected ciphertext count.
        n: u64,
    },
    /// Client → server: the batched, encrypted input.
    Execute {
        /// Serialized ciphertexts, one per SIMD-packed input chunk.
        ciphers: Vec<Vec<u8>>,
    },
    /// Server → client: the batched, encrypted output.
    Result {
        /// Serialized ciphertexts, one per SIMD-packed output chunk.
        ciphers: Vec<Vec<u8>>,
    },
    /// Optional nonlinear-offload round-trip; no normative FSM transition (§9).
    Relu {
        /// Serialized ciphertexts to apply ReLU to.
        ciphers: Vec<Vec<u8>>,
    },
    /// Optional nonlinear-offload round-trip; no normative FSM transition (§9).
    Max {
        /// Serialized ciphertexts to reduce with max.
        ciphers: Vec<Vec<u8>>,
    },
    /// Optional nonlinear-offload round-trip; no normative FSM transition (§9).
    Softmax {
        /// Serialized ciphertexts to apply softmax to.
        ciphers: Vec<Vec<u8>>,
    },
    /// Empty placeholder payload.
    None,
}

/// Encodes a message to its wire form.
pub fn encode_message(msg: &Message) -> crate::error::Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| crate::error::Error::Codec(e.to_string()))
}

/// Decodes a message from its wire form.
pub fn decode_message(bytes: &[u8]) -> crate::error::Result<Message> {
    serde_json::from_slice(bytes).map_err(|e| crate::error::Error::Codec(e.to_string()))
}
