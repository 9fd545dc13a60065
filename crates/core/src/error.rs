//! Bootstrap error types

use framejack_host::HostError;

use crate::hooks::HookError;

/// Why a bootstrap attempt failed
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Module lookup, symbol resolution or window creation failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// A creation call returned a failing HRESULT
    #[error("{call} failed: HRESULT {hr:#010x}")]
    Call { call: &'static str, hr: i32 },

    /// A creation call succeeded but produced no object
    #[error("{0} returned null")]
    NullObject(&'static str),

    /// A Vulkan call failed
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: ash::vk::Result,
    },

    /// No adapter or physical device to create a throwaway device on
    #[error("No graphics adapter available")]
    NoAdapter,

    /// Extraction did not fill every segment of the layout
    #[error("Method table for {api} incomplete: {captured} of {expected} entries")]
    IncompleteTable {
        api: framejack_sdk::Api,
        captured: usize,
        expected: usize,
    },

    /// The backend has no detour for an operation its layout hooks
    #[error("No detour for {0}")]
    MissingDetour(&'static str),

    /// Installing or activating a hook failed
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Shutdown arrived before hooks were installed
    #[error("Bootstrap stopped by shutdown")]
    Stopped,
}

pub(crate) fn check_hr(call: &'static str, hr: framejack_sdk::d3d::HRESULT) -> Result<(), BootstrapError> {
    if framejack_sdk::d3d::failed(hr) {
        Err(BootstrapError::Call { call, hr })
    } else {
        Ok(())
    }
}
