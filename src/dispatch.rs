//! Event dispatch between the host runtime and the proxy
//!
//! The proxy registers exactly two handlers, one for `install` and one for
//! `fetch`. Handlers return boxed futures that the host awaits, which is how
//! an install stays "in progress" until the manifest is cached.
//!
//! `LocalRuntime` is an in-process host: it owns the lifecycle state and only
//! delivers fetch events once the proxy is active.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::proxy::{InstallReport, OfflineProxy};
use crate::request::{AssetRequest, StoredResponse};

/// Handler run when the host installs the proxy
pub type InstallHandler =
    Box<dyn Fn() -> BoxFuture<'static, ProxyResult<InstallReport>> + Send + Sync>;

/// Handler run for each outgoing request of the controlled page
pub type InterceptHandler =
    Box<dyn Fn(AssetRequest) -> BoxFuture<'static, ProxyResult<StoredResponse>> + Send + Sync>;

/// Registration surface a host exposes to the proxy
pub trait EventDispatch {
    /// Registers the `install` handler, replacing any previous one
    fn on_install(&mut self, handler: InstallHandler);

    /// Registers the `fetch` handler, replacing any previous one
    fn on_intercept(&mut self, handler: InterceptHandler);
}

/// Lifecycle state of a proxy registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Registered, install not yet started
    Registered,
    /// Install handler is running
    Installing,
    /// Install handler failed; only a new host-driven install can follow
    InstallFailed,
    /// Installed and receiving fetch events
    Active,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyState::Registered => "registered",
            ProxyState::Installing => "installing",
            ProxyState::InstallFailed => "install failed",
            ProxyState::Active => "active",
        };
        f.write_str(name)
    }
}

/// Wires the proxy's install and intercept operations into a dispatcher
pub fn register<D: EventDispatch>(proxy: Arc<OfflineProxy>, dispatch: &mut D) {
    let installer = Arc::clone(&proxy);
    dispatch.on_install(Box::new(move || {
        let proxy = Arc::clone(&installer);
        async move { proxy.install().await }.boxed()
    }));

    dispatch.on_intercept(Box::new(move |request: AssetRequest| {
        let proxy = Arc::clone(&proxy);
        async move { proxy.intercept(&request).await }.boxed()
    }));
}

/// In-process host runtime owning the proxy lifecycle
pub struct LocalRuntime {
    state: watch::Sender<ProxyState>,
    install: Option<InstallHandler>,
    intercept: Option<InterceptHandler>,
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRuntime {
    /// Creates a runtime with no handlers in the `Registered` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProxyState::Registered);
        Self {
            state,
            install: None,
            intercept: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ProxyState> {
        self.state.subscribe()
    }

    /// Runs the install handler and settles the lifecycle state
    ///
    /// The state stays `Installing` until the handler's future completes,
    /// then moves to `Active` or `InstallFailed`. Without an install handler
    /// the runtime activates directly.
    ///
    /// # Returns
    /// * `Ok(Some(InstallReport))` when the handler succeeded
    /// * `Ok(None)` when no install handler is registered
    /// * `Err(ProxyError)` with the handler's failure
    pub async fn run_install(&self) -> ProxyResult<Option<InstallReport>> {
        let Some(handler) = &self.install else {
            debug!("No install handler registered, activating");
            self.state.send_replace(ProxyState::Active);
            return Ok(None);
        };

        self.state.send_replace(ProxyState::Installing);
        match handler().await {
            Ok(report) => {
                self.state.send_replace(ProxyState::Active);
                info!("Proxy active");
                Ok(Some(report))
            }
            Err(e) => {
                self.state.send_replace(ProxyState::InstallFailed);
                warn!("Proxy not activated: {}", e);
                Err(e)
            }
        }
    }

    /// Activates a registration whose install completed in an earlier run
    pub fn activate_existing(&self) {
        self.state.send_replace(ProxyState::Active);
        debug!("Resumed existing registration");
    }

    /// Delivers one outgoing request to the intercept handler
    ///
    /// # Returns
    /// * The handler's result while `Active`
    /// * `Err(ProxyError::NotActive)` in any other state
    /// * `Err(ProxyError::NoHandler)` when no intercept handler is registered
    pub async fn dispatch_fetch(&self, request: AssetRequest) -> ProxyResult<StoredResponse> {
        let state = self.state();
        if state != ProxyState::Active {
            return Err(ProxyError::NotActive(state));
        }
        let handler = self.intercept.as_ref().ok_or(ProxyError::NoHandler("fetch"))?;
        handler(request).await
    }
}

impl EventDispatch for LocalRuntime {
    fn on_install(&mut self, handler: InstallHandler) {
        self.install = Some(handler);
    }

    fn on_intercept(&mut self, handler: InterceptHandler) {
        self.intercept = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FetchError;

    fn ok_install() -> InstallHandler {
        Box::new(|| {
            async {
                Ok::<_, ProxyError>(InstallReport {
                    cache_name: "test".to_string(),
                    cached: Vec::new(),
                })
            }
            .boxed()
        })
    }

    fn failing_install() -> InstallHandler {
        Box::new(|| {
            async {
                Err::<InstallReport, _>(ProxyError::InstallFailed {
                    asset: "icon-512.png".to_string(),
                    reason: "HTTP 500".to_string(),
                })
            }
            .boxed()
        })
    }

    fn echo_intercept() -> InterceptHandler {
        Box::new(|request: AssetRequest| {
            async move {
                Ok::<_, ProxyError>(StoredResponse::new(request.url.as_str(), 200, "echo"))
            }
            .boxed()
        })
    }

    fn request() -> AssetRequest {
        AssetRequest::get(reqwest::Url::parse("http://localhost:8080/index.html").unwrap())
    }

    #[test]
    fn test_new_runtime_is_registered() {
        assert_eq!(LocalRuntime::new().state(), ProxyState::Registered);
    }

    #[tokio::test]
    async fn test_successful_install_activates() {
        let mut runtime = LocalRuntime::new();
        runtime.on_install(ok_install());

        let report = runtime.run_install().await.unwrap();

        assert!(report.is_some());
        assert_eq!(runtime.state(), ProxyState::Active);
    }

    #[tokio::test]
    async fn test_failed_install_is_terminal_for_fetch() {
        let mut runtime = LocalRuntime::new();
        runtime.on_install(failing_install());
        runtime.on_intercept(echo_intercept());

        let err = runtime.run_install().await.unwrap_err();
        assert!(err.is_install_failure());
        assert_eq!(runtime.state(), ProxyState::InstallFailed);

        let err = runtime.dispatch_fetch(request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::NotActive(ProxyState::InstallFailed)));
    }

    #[tokio::test]
    async fn test_fetch_before_install_is_rejected() {
        let mut runtime = LocalRuntime::new();
        runtime.on_intercept(echo_intercept());

        let err = runtime.dispatch_fetch(request()).await.unwrap_err();

        assert!(matches!(err, ProxyError::NotActive(ProxyState::Registered)));
    }

    #[tokio::test]
    async fn test_install_without_handler_activates() {
        let runtime = LocalRuntime::new();
        assert!(runtime.run_install().await.unwrap().is_none());
        assert_eq!(runtime.state(), ProxyState::Active);
    }

    #[tokio::test]
    async fn test_fetch_without_handler_reports_missing_handler() {
        let runtime = LocalRuntime::new();
        runtime.activate_existing();

        let err = runtime.dispatch_fetch(request()).await.unwrap_err();

        assert!(matches!(err, ProxyError::NoHandler("fetch")));
    }

    #[tokio::test]
    async fn test_active_runtime_delivers_fetch() {
        let mut runtime = LocalRuntime::new();
        runtime.on_intercept(echo_intercept());
        runtime.activate_existing();

        let response = runtime.dispatch_fetch(request()).await.unwrap();

        assert_eq!(response.body, b"echo");
    }

    #[tokio::test]
    async fn test_intercept_error_passes_through_dispatch() {
        let mut runtime = LocalRuntime::new();
        runtime.on_intercept(Box::new(|_: AssetRequest| {
            async {
                let err = FetchError::Unreachable("offline".to_string());
                Err::<StoredResponse, _>(ProxyError::from(err))
            }
            .boxed()
        }));
        runtime.activate_existing();

        let err = runtime.dispatch_fetch(request()).await.unwrap_err();

        assert!(err.is_network_failure());
    }

    #[tokio::test]
    async fn test_subscribers_see_state_changes() {
        let mut runtime = LocalRuntime::new();
        runtime.on_install(ok_install());
        let mut rx = runtime.subscribe();

        runtime.run_install().await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ProxyState::Active);
    }
}
