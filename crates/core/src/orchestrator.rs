//! Session control
//!
//! The [`Orchestrator`] owns at most one session: one backend adapter plus
//! its [`SessionContext`]. Every failure is logged and reported as `false`
//! or a silent no-op, never as an error crossing into the host.

use std::sync::Arc;
use std::time::Duration;

use framejack_host::HostPlatform;
use framejack_sdk::{libraries, Api};
use parking_lot::Mutex;

use crate::backends::{self, Adapter};
use crate::callbacks::{CallbackSlot, Callbacks};
use crate::config::CoreConfig;
use crate::context::{self, SessionContext};
use crate::hooks::PatchService;

pub use crate::backends::BootstrapState;

struct Session {
    api: Api,
    adapter: Arc<Adapter>,
    context: Arc<SessionContext>,
}

/// Selects, owns and tears down the active backend
pub struct Orchestrator {
    host: Arc<dyn HostPlatform>,
    patcher: Arc<dyn PatchService>,
    config: CoreConfig,
    callbacks: Arc<CallbackSlot>,
    session: Mutex<Option<Session>>,
}

impl Orchestrator {
    pub fn new(host: Arc<dyn HostPlatform>, patcher: Arc<dyn PatchService>, config: CoreConfig) -> Self {
        Self {
            host,
            patcher,
            config,
            callbacks: Arc::new(CallbackSlot::new()),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Start a session for `api`, detecting the backend if `Auto`
    ///
    /// Returns the backend's precondition result: true means the bootstrap
    /// was scheduled, not that hooks are live.
    #[tracing::instrument(skip(self))]
    pub fn initialize(&self, api: Api) -> bool {
        let mut session = self.session.lock();
        if let Some(current) = session.as_ref() {
            tracing::warn!("Already initialized with {}; shut down first", current.api);
            return false;
        }

        let Some(api) = self.resolve(api) else {
            tracing::warn!("No supported graphics library is loaded");
            return false;
        };
        let Some(backend) = backends::for_api(api) else {
            return false;
        };

        let context = SessionContext::new(api, self.callbacks.clone());
        if let Err(e) = context::activate(context.clone()) {
            tracing::warn!("Cannot start {} session: {}", api, e);
            return false;
        }

        let adapter = Arc::new(Adapter::new(
            backend,
            self.host.clone(),
            self.patcher.clone(),
            context.clone(),
            self.config.bootstrap.clone(),
        ));
        if !adapter.install() {
            context::deactivate(&context);
            return false;
        }

        tracing::info!("Initialized {} session", api);
        *session = Some(Session { api, adapter, context });
        true
    }

    /// Tear down the active session; a no-op without one
    #[tracing::instrument(skip(self))]
    pub fn shutdown(&self) {
        let mut session = self.session.lock();
        let Some(current) = session.take() else {
            tracing::debug!("Shutdown without an active session");
            return;
        };

        current.adapter.uninstall();
        context::deactivate(&current.context);
        tracing::info!("{} session shut down", current.api);
    }

    /// Replace the callback set seen by every session
    pub fn set_callbacks(&self, callbacks: Callbacks) {
        self.callbacks.replace(callbacks);
    }

    /// The active backend, or `Auto` with no session
    pub fn active_api(&self) -> Api {
        self.session
            .lock()
            .as_ref()
            .map_or(Api::Auto, |session| session.api)
    }

    pub fn bootstrap_state(&self) -> Option<BootstrapState> {
        self.session.lock().as_ref().map(|session| session.adapter.state())
    }

    /// Block until the active bootstrap settles or `timeout` passes
    pub fn wait_for_bootstrap(&self, timeout: Duration) -> Option<BootstrapState> {
        let adapter = self.session.lock().as_ref().map(|session| session.adapter.clone())?;
        Some(adapter.wait(timeout))
    }

    fn resolve(&self, api: Api) -> Option<Api> {
        if !api.is_auto() {
            return Some(api);
        }

        let detected = Api::DETECTION_ORDER.into_iter().find(|candidate| {
            libraries::primary(*candidate).is_some_and(|module| self.host.is_module_loaded(module))
        });
        if let Some(api) = detected {
            tracing::info!("Auto-detected {} backend", api);
        }
        detected
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
