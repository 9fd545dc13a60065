//! Native host implementation for the current platform

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod win32;

#[cfg(unix)]
pub use self::unix::NativeHost;
#[cfg(windows)]
pub use self::win32::NativeHost;
