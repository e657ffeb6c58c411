//! rf-core: Shared types for the ReelForge offline toolkit
//!
//! Provides the buffer contract jobs read from and write into, and the
//! parameter descriptors processors publish to hosts.

mod buffer;
mod error;
mod params;

pub use buffer::*;
pub use error::*;
pub use params::*;
