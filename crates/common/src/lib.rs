//! Types shared by the account dispenser crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
