//! CLI command implementations

pub mod acl;
pub mod audit;
pub mod credential;
pub mod find;
pub mod keys;
pub mod rotate;
