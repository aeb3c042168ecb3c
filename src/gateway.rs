//! Gateway orchestrator — wires configuration into a running listener
//!
//! Builds the domain set, validators, strategy registry, route table and
//! upgrade proxy once at construction. Everything built here is read-only
//! afterwards and shared by all connections without locking.

use crate::auth::{
    CredentialValidator, HttpIdentityStore, IdentityCheck, StaticIdentityStore,
    StrategyRegistry, TokenValidator,
};
use crate::config::{GatewayConfig, HandlerKind};
use crate::domains::DomainSet;
use crate::entrypoint::{self, ListenerState};
use crate::error::{GatewayError, Result};
use crate::proxy::{ProxyStats, TargetEndpoint, UpgradeProxy};
use crate::router::{HealthHandler, PrincipalHandler, Route, RouteTable};
use crate::{GatewayState, HealthStatus};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::watch;

/// State and counters read by health reports
pub(crate) struct RuntimeStatus {
    state: RwLock<GatewayState>,
    start_time: Instant,
    stats: Arc<ProxyStats>,
}

impl RuntimeStatus {
    fn state(&self) -> GatewayState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, new_state: GatewayState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = %*state, to = %new_state, "State transition");
        *state = new_state;
    }

    fn snapshot(&self) -> HealthStatus {
        HealthStatus {
            state: self.state(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            active_sessions: self.stats.active(),
            total_sessions: self.stats.total(),
        }
    }
}

/// The main Gateway — coordinates all components
pub struct Gateway {
    config: GatewayConfig,
    domains: DomainSet,
    registry: Arc<StrategyRegistry>,
    listener_state: Arc<ListenerState>,
    status: Arc<RuntimeStatus>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Gateway {
    /// Create a gateway from configuration plus any application routes.
    ///
    /// Routes declared in the configuration are added with the built-in
    /// handlers. Every problem found here is `InvalidConfig`.
    pub fn new(config: GatewayConfig, routes: Vec<Route>) -> Result<Self> {
        config.validate()?;

        let domains = config.domain_set()?;
        let delegate = identity_delegate(&config)?;
        let credentials = Arc::new(CredentialValidator::uniform(delegate));
        let tokens = Arc::new(
            TokenValidator::new(&config.auth.secret)?.require_expiry(config.auth.require_expiry),
        );
        let registry = Arc::new(StrategyRegistry::standard(credentials, tokens, &domains)?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let target = config.backend.target(&domains)?;
        let proxy = UpgradeProxy::new(target, config.backend.handshake_timeout(), shutdown_rx);

        let status = Arc::new(RuntimeStatus {
            state: RwLock::new(GatewayState::Created),
            start_time: Instant::now(),
            stats: proxy.stats().clone(),
        });

        let mut all_routes = configured_routes(&config, &status);
        all_routes.extend(routes);
        let route_table = RouteTable::new(all_routes, &registry)?;

        tracing::info!(
            base = domains.base(),
            api = domains.api(),
            target = %proxy.target(),
            strategies = registry.len(),
            routes = route_table.len(),
            "Gateway configured"
        );
        for (method, path, strategy) in route_table.describe() {
            tracing::debug!(method = %method, path = %path, strategy = strategy.as_deref().unwrap_or("-"), "Route");
        }

        Ok(Self {
            config,
            domains,
            registry,
            listener_state: Arc::new(ListenerState {
                routes: route_table,
                proxy,
            }),
            status,
            shutdown_tx,
            handle: Mutex::new(None),
            local_addr: RwLock::new(None),
        })
    }

    /// Start the gateway — binds the listener and begins accepting connections
    pub async fn start(&self) -> Result<()> {
        if self.state() != GatewayState::Created {
            return Err(GatewayError::Other(format!(
                "gateway cannot start from state '{}'",
                self.state()
            )));
        }
        self.status.set_state(GatewayState::Starting);

        let addr = self.config.listen_addr()?;
        let started = entrypoint::start_listener(
            addr,
            self.config.server.tls.as_ref(),
            self.listener_state.clone(),
            self.shutdown_tx.subscribe(),
        )
        .await;

        let (local_addr, handle) = match started {
            Ok(started) => started,
            Err(e) => {
                self.status.set_state(GatewayState::Stopped);
                return Err(e);
            }
        };

        *self
            .local_addr
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(local_addr);
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        self.status.set_state(GatewayState::Running);
        tracing::info!(address = %local_addr, "Gateway is running");
        Ok(())
    }

    /// Initiate graceful shutdown: stop accepting and end live sessions
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return; // Already shutting down
        }

        self.status.set_state(GatewayState::Stopping);
        tracing::info!(
            active_sessions = self.status.stats.active(),
            "Gateway shutting down"
        );

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.status.set_state(GatewayState::Stopped);
        tracing::info!("Gateway stopped");
    }

    /// Wait for a shutdown signal (Ctrl+C)
    pub async fn wait_for_shutdown(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        self.shutdown().await;
    }

    /// Get the current gateway state
    pub fn state(&self) -> GatewayState {
        self.status.state()
    }

    /// Get a health status snapshot
    pub fn health(&self) -> HealthStatus {
        self.status.snapshot()
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn domains(&self) -> &DomainSet {
        &self.domains
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Backend target of the upgrade proxy
    pub fn target(&self) -> &TargetEndpoint {
        self.listener_state.proxy.target()
    }

    /// Check if the gateway is running
    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Identity delegate: the HTTP store when configured, else static accounts
fn identity_delegate(config: &GatewayConfig) -> Result<Arc<dyn IdentityCheck>> {
    if let Some(identity) = &config.identity {
        tracing::info!(url = %identity.url, "Using HTTP identity store");
        return Ok(Arc::new(HttpIdentityStore::new(
            &identity.url,
            identity.timeout(),
        )?));
    }

    let store = config.static_accounts()?.into_iter().fold(
        StaticIdentityStore::new(),
        |store, (class, name, account)| store.with_account(class, name, account.password.clone()),
    );
    tracing::info!(accounts = store.len(), "Using static identity store");
    Ok(Arc::new(store))
}

/// Routes declared in the configuration, bound to built-in handlers
fn configured_routes(config: &GatewayConfig, status: &Arc<RuntimeStatus>) -> Vec<Route> {
    let mut names: Vec<&String> = config.routes.keys().collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let rc = &config.routes[name];
            // Methods were checked by GatewayConfig::validate
            let method = http::Method::from_bytes(rc.method.as_bytes()).ok()?;
            let handler: Arc<dyn crate::router::Handler> = match rc.handler {
                HandlerKind::Principal => Arc::new(PrincipalHandler),
                HandlerKind::Health => {
                    let status = status.clone();
                    Arc::new(HealthHandler::new(move || status.snapshot()))
                }
            };
            let route = Route::new(method, rc.path.clone(), handler);
            Some(match &rc.strategy {
                Some(strategy) => route.with_strategy(strategy.clone()),
                None => route,
            })
        })
        .collect()
}
