//! Courier server lifecycle: backend selection, serving and graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::AppError;
use crate::store::{gcloud::GcloudStore, local::LocalStore, Store};

/// How long in-flight requests get to finish once shutdown begins.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: Config,
    /// Absent in maintenance mode.
    pub store: Option<Arc<dyn Store>>,
    pub health: Health,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Config, store: Option<Arc<dyn Store>>) -> Self {
        Self {
            config,
            store,
            health: Health::default(),
            started: Instant::now(),
        }
    }

    pub fn store(&self) -> Result<&Arc<dyn Store>, AppError> {
        self.store
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no storage backend available")))
    }

    pub fn uptime(&self) -> String {
        format!("{:?}", self.started.elapsed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initializing,
    Starting,
    Ready,
    Stopping,
}

/// Service state behind a single lock.
#[derive(Debug)]
pub struct Health(RwLock<ServiceState>);

impl Default for Health {
    fn default() -> Self {
        Self(RwLock::new(ServiceState::Initializing))
    }
}

impl Health {
    pub fn state(&self) -> ServiceState {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: ServiceState) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.state(), ServiceState::Starting | ServiceState::Ready)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }
}

pub struct Server {
    state: Arc<AppState>,
    stop: CancellationToken,
    url: RwLock<Option<String>>,
    task: tokio::sync::Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    closed: AtomicBool,
}

impl Server {
    /// Create a server from configuration, opening the configured storage backend.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let store: Option<Arc<dyn Store>> = if config.maintenance {
            tracing::warn!("starting in maintenance mode, no storage backend opened");
            None
        } else if config.local_storage.enabled {
            let store = LocalStore::open(&config.local_storage)
                .context("could not open local storage")?;
            Some(Arc::new(store))
        } else if config.gcp_secret_manager.enabled {
            let store = GcloudStore::open(&config.gcp_secret_manager)
                .await
                .context("could not open secret manager storage")?;
            Some(Arc::new(store))
        } else {
            anyhow::bail!("no storage backend configured");
        };

        Ok(Self::from_parts(config, store))
    }

    /// Create a server around an existing store, skipping backend configuration.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        Self::from_parts(config, Some(store))
    }

    fn from_parts(config: Config, store: Option<Arc<dyn Store>>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, store)),
            stop: CancellationToken::new(),
            url: RwLock::new(None),
            task: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// The `http://host:port` the server is listening on, once started.
    pub fn url(&self) -> Option<String> {
        self.url.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bind the listener and start serving in the background.
    pub async fn start(&self) -> anyhow::Result<SocketAddr> {
        self.state.health.set(ServiceState::Starting);

        let listener = tokio::net::TcpListener::bind(&self.state.config.bind_addr)
            .await
            .with_context(|| format!("could not bind {}", self.state.config.bind_addr))?;
        let addr = listener.local_addr()?;
        *self.url.write().unwrap_or_else(|e| e.into_inner()) = Some(format!("http://{}", addr));

        let app = crate::api::router(self.state.clone());
        let token = self.stop.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        *self.task.lock().await = Some(handle);

        self.state.health.set(ServiceState::Ready);
        tracing::info!(
            listen = %addr,
            version = %crate::version::version(),
            maintenance = self.state.config.maintenance,
            "courier server started"
        );
        Ok(addr)
    }

    /// Start the server and block until Ctrl-C or a programmatic shutdown.
    pub async fn serve(&self) -> anyhow::Result<()> {
        self.start().await?;

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("could not listen for shutdown signal")?;
                self.shutdown().await
            }
            _ = self.stop.cancelled() => Ok(()),
        }
    }

    /// Stop accepting requests, drain in-flight ones and close the store.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!("gracefully shutting down courier server");
        self.state.health.set(ServiceState::Stopping);
        self.stop.cancel();

        let mut result = Ok(());
        if let Some(mut handle) = self.task.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => result = Err(anyhow::Error::new(e).context("server error")),
                Ok(Err(e)) => result = Err(anyhow::Error::new(e).context("server task failed")),
                Err(_) => {
                    handle.abort();
                    result = Err(anyhow::anyhow!(
                        "requests did not drain within {:?}",
                        SHUTDOWN_TIMEOUT
                    ));
                }
            }
        }

        if let Some(store) = &self.state.store {
            if !self.closed.swap(true, Ordering::SeqCst) {
                if let Err(e) = store.close().await {
                    tracing::error!(error = %e, "could not close store");
                    if result.is_ok() {
                        result = Err(anyhow::Error::new(e).context("could not close store"));
                    }
                }
            }
        }

        tracing::debug!("shut down courier server");
        result
    }
}
