//! framejack Host - Module Lookup and Bootstrap Scaffolding
//!
//! This crate handles:
//! - Checking whether a graphics library is already resident, without loading it
//! - Resolving exported entry points by name
//! - Creating the hidden window some swap chains require during bootstrap
//!
//! # Architecture
//!
//! Everything goes through the [`HostPlatform`] trait so the core crate can
//! be driven by a fake host in tests. [`NativeHost`] is the real
//! implementation for the current platform.

pub mod error;
pub mod native;
pub mod platform;

pub use error::HostError;
pub use native::NativeHost;
pub use platform::{resolve_fn, HostPlatform, HostWindow};
