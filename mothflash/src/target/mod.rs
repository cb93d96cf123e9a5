//! Device targets.

pub mod audiomoth;
