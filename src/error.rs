//! The crate-wide error taxonomy and `Result` alias.

use crate::protocol::message::Message;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy for the HE evaluation engine and its protocol.
///
/// Every variant here is non-fatal at the type level: callers decide whether
/// to abort an `Execute`, close a connection, or exit the process.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Config or scheme-parameter validation failed.
    #[error("invalid scheme parameters: {0}")]
    SchemeParamError(String),

    /// A kernel encountered a datatype it doesn't support (e.g. bf16, bool).
    #[error("unsupported element type: {0}")]
    UnsupportedElementType(String),

    /// BFV encoding was asked to encode a non-integral float.
    #[error("BFV cannot encode non-integral value {0}")]
    BfvNonIntegral(f64),

    /// Tensor shapes are incompatible for the requested operation.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A tensor `write`/`read` call addressed bytes outside the tensor.
    #[error("I/O out of range: {0}")]
    IoOutOfRange(String),

    /// A tensor op was attempted along an axis packing doesn't support.
    #[error("unsupported axis: {0}")]
    UnsupportedAxis(String),

    /// Tensor `write` saw a misshapen byte range.
    #[error("bad shape: {0}")]
    BadShape(String),

    /// Tensor `write` saw bytes that don't decode as the tensor's datatype.
    #[error("bad datatype: {0}")]
    BadDatatype(String),

    /// CKKS binary op saw operands at different chain indices that could not be reconciled.
    #[error("chain index mismatch: left={left} right={right}")]
    ChainMismatch {
        /// chain index of the left operand
        left: u32,
        /// chain index of the right operand
        right: u32,
    },

    /// CKKS binary op saw operands at different scales.
    #[error("scale mismatch: left={left} right={right}")]
    ScaleMismatch {
        /// scale of the left operand
        left: f64,
        /// scale of the right operand
        right: f64,
    },

    /// An FSM received a message it doesn't accept in its current state.
    #[error("protocol error in state {state}: got {got:?}")]
    ProtocolError {
        /// the FSM state that rejected the message
        state: String,
        /// the message that was rejected
        got: Box<Message>,
    },

    /// An incoming frame declared a body length over `max_frame_bytes`.
    #[error("frame of {declared} bytes exceeds max_frame_bytes {max}")]
    FrameTooLarge {
        /// the length the frame header declared
        declared: u64,
        /// the configured ceiling
        max: u64,
    },

    /// A frame's body was shorter than its declared length.
    #[error("frame truncated: expected {expected} bytes, got {got}")]
    FrameTruncated {
        /// declared body length
        expected: u64,
        /// bytes actually read
        got: u64,
    },

    /// Transport-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Message framing/(de)serialization failure.
    #[error("message codec error: {0}")]
    Codec(String),

    /// Everything the scheme adapter itself surfaces (noise exhausted, missing key, etc).
    #[error("scheme error: {0}")]
    SchemeError(String),

    /// The dataflow graph contains a cycle and cannot be topologically walked.
    #[error("graph contains a cycle")]
    GraphCycle,
}
