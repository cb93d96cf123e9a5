//! AudioMoth USB bootloader support.

pub mod protocol;
pub mod session;

pub use protocol::{Instruction, UploadMode};
pub use session::{Session, SessionConfig, UploadOptions, UploadReport};
