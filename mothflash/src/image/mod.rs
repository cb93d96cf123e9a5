//! Firmware image handling.

pub mod firmware;

pub use firmware::{Firmware, check_size};
