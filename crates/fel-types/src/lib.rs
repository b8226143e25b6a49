//! FEL Types
//!
//! This crate defines the runtime value model shared by the FEL expression
//! engine (`fel-core`) and its command line front end (`fel-cli`). Keeping the
//! value type in its own crate lets embedders build contexts without pulling in
//! the parser or the compiler.

#![warn(missing_docs)]

mod value;
pub use value::Value;

// Re-export the arbitrary precision types so callers can build big-number
// values without adding the numeric crates themselves.
pub use bigdecimal::BigDecimal;
pub use num_bigint::BigInt;
