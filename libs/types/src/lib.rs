//! Types library for the streaming market-data core
//!
//! Provides the core type definitions shared by the market-stream service,
//! keeping instrument identity and decimal handling in one place.
//!
//! # Modules
//! - `instrument`: Currency codes and instrument (currency pair) identity
//! - `numeric`: Exact decimal parsing for wire values
//! - `side`: Book side (bid/ask)
//! - `errors`: Error taxonomy

// Public modules
pub mod errors;
pub mod instrument;
pub mod numeric;
pub mod side;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::instrument::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
}
