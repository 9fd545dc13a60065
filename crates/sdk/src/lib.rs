//! framejack SDK - Graphics API Type Definitions
//!
//! This crate contains the data shared by every other framejack crate.
//! It has no dependencies and compiles quickly, allowing parallel compilation
//! of dependent crates.
//!
//! # Modules
//!
//! - [`api`] - The backend enumeration
//! - [`context`] - The normalized render context handed to callbacks
//! - [`layout`] - Per-backend method table slot layouts
//! - [`libraries`] - System library names used for backend detection
//! - [`d3d`] - Raw Direct3D/DXGI structs, interface IDs and vtable indices

pub mod api;
pub mod context;
pub mod d3d;
pub mod layout;
pub mod libraries;

pub use api::{Api, UnknownApi};
pub use context::RenderContext;
pub use layout::{HookSlot, Operation, Segment, SlotLayout};
