//! Logging setup for the shared library
//!
//! One fmt subscriber is installed the first time any export runs. Each
//! formatted line goes to the host's log handler when one is registered,
//! otherwise to stdout. The level filter is evaluated per event, so the
//! debug toggle takes effect immediately.

use std::ffi::{c_char, CString};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Host log sink: receives one NUL-terminated line per call
pub type LogHandler = unsafe extern "C" fn(message: *const c_char);

static HANDLER: RwLock<Option<LogHandler>> = RwLock::new(None);
static DEBUG: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

/// Install the subscriber once
pub fn init() {
    INIT.call_once(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Sink)
            .with_filter(filter_fn(|meta| *meta.level() <= max_level()));

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            // The host already installed a global subscriber; keep theirs
            return;
        }

        if framejack_core::default_orchestrator().config().debug {
            set_debug(true);
        }
    });
}

pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
    tracing::info!("Debug logging {}", if enabled { "enabled" } else { "disabled" });
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

pub fn set_handler(handler: Option<LogHandler>) {
    *HANDLER.write() = handler;
}

fn max_level() -> Level {
    if is_debug() {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Routes formatted lines to the host handler or stdout
struct Sink;

impl<'a> MakeWriter<'a> for Sink {
    type Writer = LineBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        LineBuffer(Vec::with_capacity(128))
    }
}

/// Collects one formatted event and emits it on drop
struct LineBuffer(Vec<u8>);

impl Write for LineBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            emit(&self.0);
        }
    }
}

fn emit(line: &[u8]) {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    match *HANDLER.read() {
        Some(handler) => {
            let message = to_c_string(line);
            // SAFETY: the host registered this handler for exactly this call
            unsafe { handler(message.as_ptr()) }
        }
        None => {
            let mut out = io::stdout().lock();
            let _ = out.write_all(line);
            let _ = out.write_all(b"\n");
        }
    }
}

/// Copy `line` into a C string, replacing interior NULs
fn to_c_string(line: &[u8]) -> CString {
    let bytes: Vec<u8> = line
        .iter()
        .map(|b| if *b == 0 { b'?' } else { *b })
        .collect();
    CString::new(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::ffi::CStr;

    static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    unsafe extern "C" fn capture(message: *const c_char) {
        LINES.lock().push(CStr::from_ptr(message).to_string_lossy().into_owned());
    }

    #[test]
    fn test_handler_receives_one_line_per_event() {
        set_handler(Some(capture));
        {
            let mut writer = Sink.make_writer();
            writer.write_all(b"WARN framejack_core: first part").unwrap();
            writer.write_all(b" second part\n").unwrap();
        }
        set_handler(None);

        let lines = LINES.lock();
        assert!(lines.iter().any(|line| line == "WARN framejack_core: first part second part"));
        assert!(lines.iter().all(|line| !line.ends_with('\n')));
    }

    #[test]
    fn test_interior_nul_is_replaced() {
        assert_eq!(to_c_string(b"a\0b").as_bytes(), b"a?b");
    }

    #[test]
    fn test_debug_toggle_raises_level() {
        let before = is_debug();
        DEBUG.store(false, Ordering::Relaxed);
        assert_eq!(max_level(), Level::WARN);
        DEBUG.store(true, Ordering::Relaxed);
        assert_eq!(max_level(), Level::DEBUG);
        DEBUG.store(before, Ordering::Relaxed);
    }
}
