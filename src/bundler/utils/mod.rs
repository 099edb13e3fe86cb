//! Filesystem and HTTP helpers shared by the packaging stages.

pub mod fs;
pub mod http;
