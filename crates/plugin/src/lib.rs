//! framejack Plugin - C ABI Layer
//!
//! This crate exposes the session entry points of [`framejack_core`] to
//! native hosts and compiles to a cdylib (.so/.dll). The matching C header
//! is written to `include/framejack.h` by the build script.

pub mod ffi;
mod logging;

pub use ffi::exports::FrameJackCallbacks;
pub use logging::LogHandler;
