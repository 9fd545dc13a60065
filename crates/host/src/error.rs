//! Error types for host platform operations

/// Error type for module lookup, symbol resolution and window creation
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Library is not resident in the current process
    #[error("Module not loaded: {0}")]
    ModuleNotLoaded(String),

    /// Library is loaded but does not export the symbol
    #[error("Symbol not found: {module}!{symbol}")]
    SymbolNotFound { module: String, symbol: String },

    /// Module or symbol name cannot be passed to the platform loader
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Hidden bootstrap window could not be created
    #[error("Window creation failed: {0}")]
    WindowCreation(String),

    /// Operation has no implementation on this platform
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),
}
