//! Configuration loading and management

mod loader;
mod settings;

pub use settings::*;
