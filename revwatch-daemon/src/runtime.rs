use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{TcpListener, UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use revwatch_core::{config, paths, Config};
use revwatch_sync::{pipeline, Reconciliation};

use crate::error::{io_err, DaemonError};
use crate::jobs::{enqueue_reconcile, ReconcileJob, RunSummary};
use crate::paths::socket_path;
use crate::protocol::{ControlRequest, ControlResponse};

/// One reconciliation, run on the blocking pool.
type ReconcileFn = Arc<dyn Fn() -> Reconciliation + Send + Sync>;

/// Counters and the most recent run, reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub runs: u64,
    pub failures: u64,
    pub last: Option<RunSummary>,
}

impl RunStats {
    fn record(&mut self, summary: &RunSummary) {
        self.runs += 1;
        if !summary.ok {
            self.failures += 1;
        }
        self.last = Some(summary.clone());
    }
}

/// Handles shared by socket clients.
#[derive(Clone)]
struct DaemonState {
    home: PathBuf,
    config: Arc<Config>,
    stats: Arc<RwLock<RunStats>>,
    jobs: mpsc::Sender<ReconcileJob>,
    shutdown: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = Arc::new(config::load_at(&home)?);
    ensure_runtime_dirs(&home)?;

    tracing::info!(
        upstream = %config.upstream,
        interval_secs = config.interval_secs,
        http = %config.http.bind,
        "starting revwatch daemon",
    );

    let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let state = DaemonState {
        home: home.clone(),
        config: config.clone(),
        stats: Arc::new(RwLock::new(RunStats::default())),
        jobs: job_tx.clone(),
        shutdown: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let stats = state.stats.clone();
        let reconcile: ReconcileFn = {
            let home = home.clone();
            let config = config.clone();
            Arc::new(move || pipeline::run_at(&home, &config))
        };
        tokio::spawn(async move {
            let result = processor_task(reconcile, stats, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let jobs = job_tx.clone();
        let period = Duration::from_secs(config.interval_secs);
        tokio::spawn(async move {
            let result = scheduler_task(jobs, period, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let jobs = job_tx.clone();
        let http = config.http.clone();
        tokio::spawn(async move {
            let result = http_server_task(http.bind, http.path, jobs, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    drop(job_tx);

    let (processor, scheduler, socket, http, signal) = tokio::join!(
        processor_handle,
        scheduler_handle,
        socket_handle,
        http_handle,
        signal_handle
    );

    handle_join("processor", processor)?;
    handle_join("scheduler", scheduler)?;
    handle_join("socket_server", socket)?;
    handle_join("http_server", http)?;
    handle_join("signal_handler", signal)?;
    Ok(())
}

/// The only task that reconciles: triggers queue here, so sequence numbers
/// are assigned by one writer per process.
async fn processor_task(
    reconcile: ReconcileFn,
    stats: Arc<RwLock<RunStats>>,
    mut jobs: mpsc::Receiver<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let reconcile = reconcile.clone();
                let run = tokio::task::spawn_blocking(move || reconcile())
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("reconcile task join error: {err}")))?;

                let summary = RunSummary::from_reconciliation(
                    job.source,
                    &run,
                    unix_seconds_now(),
                    started.elapsed(),
                );
                stats.write().await.record(&summary);

                if summary.ok {
                    tracing::info!(
                        source = %summary.source,
                        outcome = %summary.outcome,
                        number = summary.number,
                        duration_ms = summary.duration_ms,
                        "reconcile completed",
                    );
                } else {
                    tracing::error!(
                        source = %summary.source,
                        stage = summary.stage.as_deref().unwrap_or("unknown"),
                        error = summary.error.as_deref().unwrap_or(""),
                        "reconcile failed",
                    );
                }

                let _ = job.respond_to.send(summary);
            }
        }
    }

    Ok(())
}

/// Enqueue a reconcile every `period`, starting immediately.
async fn scheduler_task(
    jobs: mpsc::Sender<ReconcileJob>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(err) = enqueue_reconcile(&jobs, "scheduler").await {
                    tracing::warn!(error = %err, "scheduler stopping");
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn http_server_task(
    bind: String,
    path: String,
    jobs: mpsc::Sender<ReconcileJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| io_err(&bind, e))?;
    tracing::info!(addr = %bind, path = %path, "http trigger listening");

    axum::serve(listener, crate::http::router(&path, jobs))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(&bind, e))
}

async fn socket_server_task(
    state: DaemonState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, state: DaemonState) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match ControlRequest::parse(&line) {
            Ok(request) => request,
            Err(message) => {
                write_response(&mut writer, &ControlResponse::error(message)).await?;
                continue;
            }
        };

        let response = match request {
            ControlRequest::Status => ControlResponse::ok(build_status_payload(&state).await),
            ControlRequest::Reconcile => match enqueue_reconcile(&state.jobs, "socket").await {
                Ok(summary) => ControlResponse::ok(json!(summary)),
                Err(err) => ControlResponse::error(err.to_string()),
            },
            ControlRequest::Stop => {
                let _ = state.shutdown.send(());
                ControlResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request == ControlRequest::Stop {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(state: &DaemonState) -> Value {
    let stats = state.stats.read().await.clone();
    let config = &state.config;

    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "last_run_at_unix": stats.last.as_ref().map_or(0, |last| last.finished_at_unix),
        "last_outcome": stats.last.as_ref().map(|last| last.outcome.clone()),
        "runs": stats.runs,
        "failures": stats.failures,
        "latest": stats.last.as_ref().and_then(|last| {
            last.number.map(|number| json!({ "sha": last.sha, "number": number }))
        }),
        "upstream": config.upstream.to_string(),
        "interval_secs": config.interval_secs,
        "http_bind": config.http.bind,
        "http_path": config.http.path,
        "socket": socket_path(&state.home).display().to_string(),
        "store": paths::store_path(&state.home, &config.upstream).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

/// The socket lives directly under `~/.revwatch/`.
fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = paths::revwatch_root(home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use revwatch_core::CommitSha;
    use revwatch_store::{MemoryRevisionStore, RevisionStore};
    use revwatch_sync::{reconcile, FetchError, RevisionSource};
    use tempfile::TempDir;

    struct FixedHead(Option<String>);

    impl RevisionSource for FixedHead {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn fetch_latest(&self) -> Result<CommitSha, FetchError> {
            match &self.0 {
                Some(sha) => Ok(CommitSha::parse(sha.clone())?),
                None => Err(FetchError::Transport {
                    url: "fixed".to_string(),
                    message: "offline".to_string(),
                }),
            }
        }
    }

    fn fake_reconcile(head: Option<String>, store: Arc<MemoryRevisionStore>) -> ReconcileFn {
        let source = Arc::new(FixedHead(head));
        Arc::new(move || reconcile(source.as_ref(), store.as_ref()))
    }

    fn spawn_processor(
        reconcile: ReconcileFn,
    ) -> (
        mpsc::Sender<ReconcileJob>,
        Arc<RwLock<RunStats>>,
        broadcast::Sender<()>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (shutdown, _) = broadcast::channel(1);
        let stats = Arc::new(RwLock::new(RunStats::default()));
        let task_stats = stats.clone();
        let task_shutdown = shutdown.subscribe();
        tokio::spawn(async move { processor_task(reconcile, task_stats, rx, task_shutdown).await });
        (tx, stats, shutdown)
    }

    fn test_state(home: &Path, jobs: mpsc::Sender<ReconcileJob>, stats: Arc<RwLock<RunStats>>) -> DaemonState {
        DaemonState {
            home: home.to_path_buf(),
            config: Arc::new(Config::default()),
            stats,
            jobs,
            shutdown: broadcast::channel(1).0,
            started_at_unix: 1_000_000,
        }
    }

    #[tokio::test]
    async fn concurrent_triggers_create_one_record() {
        let store = Arc::new(MemoryRevisionStore::new());
        let (jobs, stats, _shutdown) = spawn_processor(fake_reconcile(Some("a".repeat(40)), store.clone()));

        let triggers = ["scheduler", "http", "socket", "http", "scheduler"];
        let mut handles = Vec::new();
        for source in triggers {
            let jobs = jobs.clone();
            handles.push(tokio::spawn(async move { enqueue_reconcile(&jobs, source).await }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("join").expect("summary").outcome);
        }

        assert_eq!(outcomes.iter().filter(|o| *o == "created").count(), 1);
        assert_eq!(outcomes.iter().filter(|o| *o == "unchanged").count(), 4);
        assert_eq!(store.len(), 1);
        assert_eq!(stats.read().await.runs, 5);
    }

    #[tokio::test]
    async fn failed_run_is_counted_and_reported() {
        let store = Arc::new(MemoryRevisionStore::new());
        let (jobs, stats, _shutdown) = spawn_processor(fake_reconcile(None, store.clone()));

        let summary = enqueue_reconcile(&jobs, "socket").await.expect("summary");
        assert!(!summary.ok);
        assert_eq!(summary.stage.as_deref(), Some("fetch"));
        assert!(summary.report_text().starts_with("Got error fetching from GitHub"));
        assert!(store.latest().unwrap().is_none());

        let stats = stats.read().await;
        assert_eq!((stats.runs, stats.failures), (1, 1));
    }

    #[tokio::test]
    async fn status_payload_before_any_run() {
        let home = TempDir::new().expect("home");
        let (jobs, _rx) = mpsc::channel(1);
        let state = test_state(home.path(), jobs, Arc::new(RwLock::new(RunStats::default())));

        let payload = build_status_payload(&state).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_run_at_unix"], json!(0u64));
        assert_eq!(payload["last_outcome"], Value::Null);
        assert_eq!(payload["upstream"], json!("w3c/web-platform-tests@master"));
        assert_eq!(payload["interval_secs"], json!(300));
        assert!(payload.get("label").is_none());
    }

    #[test]
    fn runtime_dirs_are_just_the_socket_directory() {
        let home = TempDir::new().expect("home");
        ensure_runtime_dirs(home.path()).expect("dirs");

        let root = revwatch_core::paths::revwatch_root(home.path());
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).expect("read root").count(), 0);
    }

    #[tokio::test]
    async fn socket_client_reconcile_then_status_then_stop() {
        let home = TempDir::new().expect("home");
        let store = Arc::new(MemoryRevisionStore::new());
        let (jobs, stats, _shutdown) = spawn_processor(fake_reconcile(Some("b".repeat(40)), store.clone()));
        let state = test_state(home.path(), jobs, stats);
        let mut stop_rx = state.shutdown.subscribe();

        let (client, server) = UnixStream::pair().expect("pair");
        tokio::spawn(handle_socket_client(server, state));

        let (reader, mut writer) = client.into_split();
        let mut lines = BufReader::new(reader).lines();
        for cmd in ["reconcile", "status", "bogus"] {
            let line = format!("{{\"cmd\":\"{cmd}\"}}\n");
            writer.write_all(line.as_bytes()).await.expect("write");
        }

        let reconcile: ControlResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(reconcile.ok);
        let summary: RunSummary = serde_json::from_value(reconcile.data.unwrap()).unwrap();
        assert_eq!(summary.outcome, "created");
        assert_eq!(summary.number, Some(0));
        assert_eq!(summary.source, "socket");

        let status: ControlResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let data = status.data.unwrap();
        assert_eq!(data["runs"], json!(1));
        assert_eq!(data["last_outcome"], json!("created"));
        assert_eq!(data["latest"]["number"], json!(0));

        let bogus: ControlResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(!bogus.ok);
        assert_eq!(bogus.error.as_deref(), Some("unknown command 'bogus'"));

        writer.write_all(b"{\"cmd\":\"stop\"}\n").await.expect("write stop");
        let stop: ControlResponse =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(stop.ok);
        stop_rx.recv().await.expect("shutdown signal");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_fires_immediately_then_every_period() {
        let (tx, mut rx) = mpsc::channel::<ReconcileJob>(4);
        let (shutdown, _) = broadcast::channel(1);
        let scheduler = tokio::spawn(scheduler_task(
            tx,
            Duration::from_secs(300),
            shutdown.subscribe(),
        ));

        let mut seen = 0;
        for _ in 0..3 {
            let job = rx.recv().await.expect("job");
            assert_eq!(job.source, "scheduler");
            seen += 1;
            let store = MemoryRevisionStore::new();
            let run = reconcile(&FixedHead(Some("c".repeat(40))), &store);
            let _ = job
                .respond_to
                .send(RunSummary::from_reconciliation("scheduler", &run, 0, Duration::ZERO));
        }
        assert_eq!(seen, 3);

        shutdown.send(()).expect("shutdown");
        scheduler.await.expect("join").expect("scheduler result");
    }
}
