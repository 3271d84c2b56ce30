//! Shared primitives for the league client session core

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
