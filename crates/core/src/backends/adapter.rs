//! Backend adapter: scheduling, retry and hook lifecycle
//!
//! `install` only checks that the backend's library is resident and then
//! hands the bootstrap to a background thread. The thread waits out the
//! grace period, retries extraction up to the configured budget and, once a
//! complete table exists, installs and activates every hook of the layout.
//!
//! `uninstall` may race the thread at any point. Both sides take the status
//! lock before touching hooks, and the thread re-checks the stopped flag
//! under that lock, so hooks are never installed after `uninstall` returns.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use framejack_host::HostPlatform;
use framejack_sdk::Api;
use parking_lot::{Condvar, Mutex};

use super::Backend;
use crate::config::BootstrapConfig;
use crate::context::SessionContext;
use crate::error::BootstrapError;
use crate::hooks::PatchService;
use crate::table::MethodTable;

/// Observable bootstrap outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Waiting for the grace period or retrying
    Pending,
    /// Hooks are installed and active
    Ready,
    /// Every attempt failed; interception will never happen this session
    Abandoned,
    /// Shut down before hooks were installed
    Stopped,
}

impl BootstrapState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BootstrapState::Pending)
    }
}

struct Status {
    state: BootstrapState,
    stopped: bool,
    table: Option<MethodTable>,
    /// Names of the hooks this adapter installed, in install order
    installed: Vec<&'static str>,
}

struct Shared {
    backend: Box<dyn Backend>,
    host: Arc<dyn HostPlatform>,
    patcher: Arc<dyn PatchService>,
    session: Arc<SessionContext>,
    policy: BootstrapConfig,
    status: Mutex<Status>,
    changed: Condvar,
}

/// One backend's install/uninstall lifecycle
pub struct Adapter {
    shared: Arc<Shared>,
    /// Dropped to wake the worker out of a wait
    stop: Mutex<Option<Sender<()>>>,
}

impl Adapter {
    pub fn new(
        backend: Box<dyn Backend>,
        host: Arc<dyn HostPlatform>,
        patcher: Arc<dyn PatchService>,
        session: Arc<SessionContext>,
        policy: BootstrapConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                host,
                patcher,
                session,
                policy,
                status: Mutex::new(Status {
                    state: BootstrapState::Pending,
                    stopped: false,
                    table: None,
                    installed: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
            stop: Mutex::new(None),
        }
    }

    pub fn api(&self) -> Api {
        self.shared.backend.api()
    }

    /// Check the precondition and schedule the bootstrap
    ///
    /// Returns false, with no side effects, when the backend's library is
    /// not loaded. A true result says nothing about whether the bootstrap
    /// will succeed.
    pub fn install(&self) -> bool {
        let api = self.api();
        let module = self.shared.backend.required_module();
        if !self.shared.host.is_module_loaded(module) {
            tracing::info!("{} not loaded, {} backend does not apply", module, api);
            return false;
        }

        let mut stop = self.stop.lock();
        if stop.is_some() || self.shared.status.lock().stopped {
            tracing::warn!("{} adapter already installed", api);
            return false;
        }

        let (sender, receiver) = bounded(1);
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("framejack-bootstrap-{}", api.as_str().to_ascii_lowercase()))
            .spawn(move || shared.run(receiver));

        match spawned {
            Ok(_) => {
                *stop = Some(sender);
                tracing::debug!("{} bootstrap scheduled", api);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn {} bootstrap thread: {}", api, e);
                false
            }
        }
    }

    /// Remove installed hooks and release captured state
    ///
    /// Safe before, during and after bootstrap, and safe to repeat.
    pub fn uninstall(&self) {
        drop(self.stop.lock().take());

        let mut status = self.shared.status.lock();
        if status.stopped {
            return;
        }
        status.stopped = true;

        let removed = status.installed.len();
        self.shared.remove_hooks(&mut status.installed);
        status.table = None;
        if status.state == BootstrapState::Pending {
            status.state = BootstrapState::Stopped;
        }
        self.shared.changed.notify_all();
        drop(status);

        self.shared
            .backend
            .release_captured(self.shared.session.state());
        tracing::info!("{} adapter uninstalled ({} hooks removed)", self.api(), removed);
    }

    pub fn state(&self) -> BootstrapState {
        self.shared.status.lock().state
    }

    /// Number of entries in the extracted table, if one is held
    pub fn table_len(&self) -> Option<usize> {
        self.shared.status.lock().table.as_ref().map(MethodTable::len)
    }

    /// Block until the bootstrap reaches a terminal state or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> BootstrapState {
        let mut status = self.shared.status.lock();
        self.shared
            .changed
            .wait_while_for(&mut status, |status| !status.state.is_terminal(), timeout);
        status.state
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.uninstall();
    }
}

impl Shared {
    fn run(&self, stop: Receiver<()>) {
        let api = self.backend.api();
        if wait_or_stop(&stop, self.policy.grace_period()) {
            tracing::debug!("{} bootstrap stopped during grace period", api);
            return;
        }

        let attempts = self.policy.attempts();
        for attempt in 1..=attempts {
            match self.attempt() {
                Ok(()) => {
                    tracing::info!("{} hooks active after {} attempt(s)", api, attempt);
                    return;
                }
                Err(BootstrapError::Stopped) => {
                    tracing::debug!("{} bootstrap stopped before hooks were installed", api);
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!("{} bootstrap attempt {}/{} failed: {}", api, attempt, attempts, e);
                    if wait_or_stop(&stop, self.policy.retry_interval()) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("{} bootstrap abandoned after {} attempt(s): {}", api, attempts, e);
                    self.finish(BootstrapState::Abandoned);
                }
            }
        }
    }

    fn attempt(&self) -> Result<(), BootstrapError> {
        if self.status.lock().stopped {
            return Err(BootstrapError::Stopped);
        }

        let table = self.backend.extract(self.host.as_ref())?;
        tracing::debug!("{} method table extracted: {} entries", self.backend.api(), table.len());

        let mut status = self.status.lock();
        if status.stopped {
            return Err(BootstrapError::Stopped);
        }

        if let Err(e) = self.install_hooks(&table, &mut status.installed) {
            self.remove_hooks(&mut status.installed);
            return Err(e);
        }

        status.table = Some(table);
        status.state = BootstrapState::Ready;
        self.changed.notify_all();
        Ok(())
    }

    /// Install every hook of the layout, then activate them together
    fn install_hooks(
        &self,
        table: &MethodTable,
        installed: &mut Vec<&'static str>,
    ) -> Result<(), BootstrapError> {
        let layout = self.backend.layout();
        for slot in layout.hooks {
            let detour = self
                .backend
                .detour(slot.op)
                .ok_or(BootstrapError::MissingDetour(slot.name))?;
            let target = table
                .get(slot.offset)
                .ok_or(BootstrapError::IncompleteTable {
                    api: layout.api,
                    captured: table.len(),
                    expected: layout.len(),
                })?;

            // SAFETY: the target was copied from a live dispatch table for
            // this slot and the detour is declared with the slot's signature
            let original = unsafe {
                self.patcher
                    .install_hook(slot.name, target, detour.replacement)?
            };
            detour.point.set(original);
            installed.push(slot.name);
            tracing::debug!("Installed {} at {:p} (slot {})", slot.name, target, slot.offset);
        }

        for name in installed.iter() {
            self.patcher.activate(name)?;
        }
        Ok(())
    }

    /// Remove hooks in reverse install order
    ///
    /// Hook points keep their pass-through pointer for calls still in flight.
    fn remove_hooks(&self, installed: &mut Vec<&'static str>) {
        while let Some(name) = installed.pop() {
            if let Err(e) = self.patcher.remove_hook(name) {
                tracing::error!("Failed to remove {}: {}", name, e);
            }
        }
    }

    fn finish(&self, state: BootstrapState) {
        let mut status = self.status.lock();
        if status.state == BootstrapState::Pending {
            status.state = state;
        }
        self.changed.notify_all();
    }
}

/// Sleep for `delay`; true if shutdown was requested meanwhile
fn wait_or_stop(stop: &Receiver<()>, delay: Duration) -> bool {
    !matches!(stop.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
}
