//! Shared domain types.

mod account;
mod identifiers;
mod message;

pub use account::*;
pub use identifiers::*;
pub use message::*;
