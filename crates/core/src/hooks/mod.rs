//! Hook system
//!
//! - [`PatchService`] is the seam backends install hooks through
//! - [`DetourPatcher`] implements it with inline detours
//! - [`HookPoint`] carries each detour's pass-through pointer

pub mod detour;
pub mod patch;
pub mod point;
pub mod trampoline;

pub use detour::{DetourKey, DetourPatcher};
pub use patch::{HookError, PatchService};
pub use point::HookPoint;
