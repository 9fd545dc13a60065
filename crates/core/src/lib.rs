//! framejack Core - Method Table Extraction and Hook Orchestration
//!
//! This crate contains everything between the host's session calls and
//! the patched graphics entry points:
//! - Backend adapters that copy real dispatch tables from throwaway objects
//! - The detours that turn present/resize/device events into [`Callbacks`]
//! - The [`Orchestrator`] that owns the single active backend
//! - [`DetourPatcher`], the in-process [`PatchService`]
//!
//! # Re-exports
//!
//! The SDK and host crates are re-exported for convenience:
//! - [`sdk`] - API enumeration, render context and slot layouts
//! - [`host`] - Module lookup, symbol resolution and bootstrap windows

use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub use framejack_host as host;
pub use framejack_sdk as sdk;

pub mod backends;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod table;

#[cfg(test)]
mod testing;

pub use callbacks::{CallbackSet, Callbacks};
pub use config::{BootstrapConfig, ConfigError, ConfigResult, CoreConfig};
pub use error::BootstrapError;
pub use hooks::{DetourPatcher, HookError, PatchService};
pub use orchestrator::{BootstrapState, Orchestrator};
pub use sdk::{Api, RenderContext};
pub use table::MethodTable;

static DEFAULT: LazyLock<Orchestrator> = LazyLock::new(|| {
    Orchestrator::new(
        Arc::new(host::NativeHost::new()),
        Arc::new(DetourPatcher::new()),
        CoreConfig::load_or_default(),
    )
});

/// The process-wide orchestrator behind the free functions
///
/// Uses the native host, the in-process detour patcher and the config file
/// found at [`config::core_config_path`].
pub fn default_orchestrator() -> &'static Orchestrator {
    &DEFAULT
}

/// Start intercepting `api` (or the first loaded backend for `Api::Auto`)
pub fn initialize(api: Api) -> bool {
    DEFAULT.initialize(api)
}

/// Remove all hooks and end the session
pub fn shutdown() {
    DEFAULT.shutdown();
}

/// Replace the registered callbacks
///
/// Prefer calling this before [`initialize`]; a replacement while hooks
/// are live is atomic but callbacks already running finish on the old set.
pub fn set_callbacks(callbacks: Callbacks) {
    DEFAULT.set_callbacks(callbacks);
}

/// The active backend, or `Api::Auto` when there is no session
pub fn active_api() -> Api {
    DEFAULT.active_api()
}

pub fn bootstrap_state() -> Option<BootstrapState> {
    DEFAULT.bootstrap_state()
}

pub fn wait_for_bootstrap(timeout: Duration) -> Option<BootstrapState> {
    DEFAULT.wait_for_bootstrap(timeout)
}
