//! Graphics API enumeration

use std::fmt;
use std::str::FromStr;

/// Native graphics API a backend targets
///
/// `Auto` only appears as a request: it is resolved to a concrete API once
/// per session and is never reported as the active backend.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Api {
    #[default]
    Auto = 0,
    D3D9 = 1,
    D3D10 = 2,
    D3D11 = 3,
    D3D12 = 4,
    OpenGL = 5,
    Vulkan = 6,
}

impl Api {
    /// Auto-detection preference order
    pub const DETECTION_ORDER: [Api; 6] = [
        Api::D3D12,
        Api::D3D11,
        Api::D3D10,
        Api::D3D9,
        Api::OpenGL,
        Api::Vulkan,
    ];

    /// Display name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Api::Auto => "Auto",
            Api::D3D9 => "D3D9",
            Api::D3D10 => "D3D10",
            Api::D3D11 => "D3D11",
            Api::D3D12 => "D3D12",
            Api::OpenGL => "OpenGL",
            Api::Vulkan => "Vulkan",
        }
    }

    pub const fn is_auto(&self) -> bool {
        matches!(self, Api::Auto)
    }

    /// Convert from the raw C ABI value
    pub const fn from_raw(raw: u32) -> Option<Api> {
        Some(match raw {
            0 => Api::Auto,
            1 => Api::D3D9,
            2 => Api::D3D10,
            3 => Api::D3D11,
            4 => Api::D3D12,
            5 => Api::OpenGL,
            6 => Api::Vulkan,
            _ => return None,
        })
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown API name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownApi(pub String);

impl fmt::Display for UnknownApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown graphics API: {}", self.0)
    }
}

impl std::error::Error for UnknownApi {}

impl FromStr for Api {
    type Err = UnknownApi;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Api::Auto),
            "d3d9" | "dx9" => Ok(Api::D3D9),
            "d3d10" | "dx10" => Ok(Api::D3D10),
            "d3d11" | "dx11" => Ok(Api::D3D11),
            "d3d12" | "dx12" => Ok(Api::D3D12),
            "opengl" | "gl" => Ok(Api::OpenGL),
            "vulkan" | "vk" => Ok(Api::Vulkan),
            _ => Err(UnknownApi(s.to_string())),
        }
    }
}
