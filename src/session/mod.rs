//! Publisher sessions exposed to embedding applications

pub mod customize;

pub use customize::{CustomizePubSession, PubSessionOption};
