//! Graph rewrite passes run before execution (§4.7).

pub mod insert_relinearize;

pub use insert_relinearize::insert_relinearize;
