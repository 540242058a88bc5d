//! Shared domain types

mod audit;
mod kind;
mod name;
mod permission;

pub use audit::*;
pub use kind::*;
pub use name::*;
pub use permission::*;
