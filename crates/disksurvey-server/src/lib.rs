//! HTTP surface of the disk survey: a few embedded assets, a rescan
//! trigger, and the JSON roster, all backed by the manager handle.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use disksurvey_monitor::{ListDisksError, ManagerConfig, ManagerHandle};
use tokio::sync::oneshot;
use tracing::{error, info};

const INDEX_HTML: &str = include_str!("../assets/index.html");
const APP_JS: &str = include_str!("../assets/app.js");
const APP_CSS: &str = include_str!("../assets/app.css");

/// Daemon configuration; every knob also has a `DISKSURVEY_*` environment
/// alias so deployments don't need a command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "disksurveyd", about = "Survey SG block devices and their health")]
pub struct DaemonConfig {
    /// HTTP listen address.
    #[arg(long, env = "DISKSURVEY_LISTEN", default_value = "0.0.0.0:5001")]
    pub listen: SocketAddr,

    /// Snapshot file, written via temp-file-and-rename.
    #[arg(long, env = "DISKSURVEY_STATE_FILE", default_value = "./disksurvey.dat")]
    pub state_file: PathBuf,

    /// Directory scanned for sg device nodes.
    #[arg(long, env = "DISKSURVEY_DEVICE_DIR", default_value = "/dev")]
    pub device_dir: PathBuf,

    /// Seconds between ping rounds.
    #[arg(long, env = "DISKSURVEY_TUR_INTERVAL_SECS", default_value_t = 1)]
    pub tur_interval_secs: u64,

    /// Seconds between latency-bucket rolls (and periodic snapshots).
    #[arg(long, env = "DISKSURVEY_TICK_INTERVAL_SECS", default_value_t = 300)]
    pub tick_interval_secs: u64,

    /// Seconds between periodic device rescans.
    #[arg(long, env = "DISKSURVEY_RESCAN_INTERVAL_SECS", default_value_t = 3600)]
    pub rescan_interval_secs: u64,

    /// Minimum seconds between SMART health checks per disk.
    #[arg(long, env = "DISKSURVEY_MONITOR_INTERVAL_SECS", default_value_t = 3600)]
    pub monitor_interval_secs: u64,

    /// Capacity of the /api/disks JSON buffer.
    #[arg(long, env = "DISKSURVEY_JSON_BUF_SIZE", default_value_t = 8192)]
    pub json_buf_size: usize,
}

impl DaemonConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            state_file: self.state_file.clone(),
            tur_interval: Duration::from_secs(self.tur_interval_secs),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            rescan_interval: Duration::from_secs(self.rescan_interval_secs),
            monitor_interval_secs: self.monitor_interval_secs,
            json_buf_size: self.json_buf_size,
            ..ManagerConfig::default()
        }
    }
}

#[derive(Clone)]
struct AppState {
    manager: ManagerHandle,
}

/// Build the router. Separated from [`start_server`] so tests can drive it
/// without a listener.
pub fn app(manager: ManagerHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/app.js", get(app_js))
        .route("/app.css", get(app_css))
        .route("/rescan", get(rescan))
        .route("/api/disks", get(api_disks))
        .fallback(not_found)
        .with_state(AppState { manager })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

async fn app_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], APP_CSS)
}

async fn rescan(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.trigger_rescan();
    ([(header::CONTENT_TYPE, "text/plain")], "rescanned\n")
}

async fn api_disks(State(state): State<AppState>) -> Response {
    match state.manager.list_disks_json().await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(ListDisksError::BufferExhausted(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Insufficient buffer space",
        )
            .into_response(),
        Err(ListDisksError::Closed) => {
            (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// A running HTTP listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and drain in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// Bind and serve. Failure to bind is fatal to the daemon; everything after
/// that is logged and survived.
pub async fn start_server(
    listen: SocketAddr,
    manager: ManagerHandle,
) -> io::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let router = app(manager);
    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = serve.await {
            error!(error = %err, "http server failed");
        }
    });

    info!(addr = %local_addr, "http surface listening");
    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}
