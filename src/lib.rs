#![deny(missing_docs)]

//! A leveled homomorphic-encryption inference engine.
//!
//! The crate is layered bottom-up: a scheme adapter ([`scheme`]) backs a
//! tagged plaintext/ciphertext value ([`value`]), which a batched tensor
//! ([`tensor`]) owns in bulk. A small kernel library ([`kernel`]) implements
//! the arithmetic operator set over both, a concrete dataflow graph
//! ([`graph`]) describes a computation in terms of those operators, a
//! rewrite pass ([`pass`]) prepares a graph for execution, and an
//! [`executable::Executable`] walks the rewritten graph end to end. The
//! [`protocol`] module puts a client and a server on either side of that
//! executable over a length-prefixed TCP wire format.
//!
//! ```
//! use fhe_transformer::executable::Executable;
//! use fhe_transformer::graph::{Graph, Node, Operator};
//! use fhe_transformer::scheme::bfv::BfvScheme;
//! use fhe_transformer::scheme::{SchemeContext, SchemeParameters};
//! use fhe_transformer::tensor::{Datatype, HeTensor};
//! use byteorder::{ByteOrder, LittleEndian};
//! use std::collections::HashMap;
//!
//! let scheme = BfvScheme::new(SchemeParameters::bfv_default()).unwrap();
//! let ctx = SchemeContext::new(Box::new(scheme)).unwrap();
//!
//! let mut g = Graph::new();
//! let a = g.add_node(Node::new(Operator::Input { name: "a".into() }, vec![1], Datatype::F64));
//! let b = g.add_node(Node::new(Operator::Input { name: "b".into() }, vec![1], Datatype::F64));
//! let add = g.add_node(Node::new(Operator::Add, vec![1], Datatype::F64));
//! g.add_edge(a, add, 0);
//! g.add_edge(b, add, 1);
//! let out = g.add_node(Node::new(Operator::Output, vec![1], Datatype::F64));
//! g.add_edge(add, out, 0);
//!
//! let mut lhs = HeTensor::new(Datatype::F64, vec![1], false, true).unwrap();
//! let mut bytes = [0u8; 8];
//! LittleEndian::write_f64(&mut bytes, 2.0);
//! lhs.write(&ctx, &bytes, 0, 8).unwrap();
//! let mut rhs = HeTensor::new(Datatype::F64, vec![1], false, true).unwrap();
//! LittleEndian::write_f64(&mut bytes, 3.0);
//! rhs.write(&ctx, &bytes, 0, 8).unwrap();
//!
//! let mut inputs = HashMap::new();
//! inputs.insert("a".to_string(), lhs);
//! inputs.insert("b".to_string(), rhs);
//!
//! let exe = Executable::new(g);
//! let result = exe.run(&ctx, &inputs).unwrap();
//! let mut out = [0u8; 8];
//! result.read(&ctx, &mut out, 0, 8).unwrap();
//! assert_eq!(LittleEndian::read_f64(&out), 5.0);
//! ```

pub mod error;
pub mod executable;
pub mod graph;
pub mod kernel;
pub mod pass;
pub mod protocol;
pub mod scheme;
pub mod tensor;
pub mod value;

pub use error::{Error, Result};
pub use executable::Executable;
pub use graph::{Graph, Node, Operator};
pub use tensor::{Datatype, HeTensor};
pub use value::HeValue;
