use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};

use queuewatch_core::{registry, MonitorId};
use queuewatch_engine::{PollEngine, SharedRegistry, TracingSink};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Everything a socket handler needs to serve a request.
#[derive(Clone)]
struct DaemonContext {
    home: PathBuf,
    registry: SharedRegistry,
    engine: Arc<Mutex<PollEngine>>,
    shutdown_tx: broadcast::Sender<()>,
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

/// Run the daemon runtime: restore timers, serve the control socket, and
/// shut everything down on ctrl-c or a `stop` request.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let registry: SharedRegistry =
        Arc::new(tokio::sync::RwLock::new(registry::load_at(&home)?));
    let mut engine = PollEngine::new(home.clone(), registry.clone(), Arc::new(TracingSink))?;
    engine.restore().await?;
    let engine = Arc::new(Mutex::new(engine));

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let context = DaemonContext {
        home: home.clone(),
        registry,
        engine: engine.clone(),
        shutdown_tx: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
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

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    engine.lock().await.stop_all().await;

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    context: DaemonContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
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

async fn handle_socket_client(
    stream: UnixStream,
    context: DaemonContext,
) -> Result<(), DaemonError> {
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

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = dispatch(request, &context).await;
        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

/// Route one request to its handler and shape the response.
async fn dispatch(request: DaemonRequest, context: &DaemonContext) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(context).await),
        "start-monitor" => match request.monitor {
            Some(monitor) => {
                let id = MonitorId::from(monitor);
                let mut engine = context.engine.lock().await;
                match engine.start_monitor(&id).await {
                    Ok(()) => DaemonResponse::ok(json!({ "started": id.0 })),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            None => DaemonResponse::error("start-monitor requires a monitor id"),
        },
        "stop-monitor" => match request.monitor {
            Some(monitor) => {
                let id = MonitorId::from(monitor);
                let mut engine = context.engine.lock().await;
                match engine.stop_monitor(&id).await {
                    Ok(()) => DaemonResponse::ok(json!({ "stopped": id.0 })),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            None => DaemonResponse::error("stop-monitor requires a monitor id"),
        },
        "reload" => {
            let id = request.monitor.map(MonitorId::from);
            let mut engine = context.engine.lock().await;
            match engine.reload(id.as_ref()).await {
                Ok(()) => DaemonResponse::ok(json!({ "reloaded": true })),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "stop" => {
            let _ = context.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

async fn build_status_payload(context: &DaemonContext) -> Value {
    let monitors: Vec<Value> = {
        let reg = context.registry.read().await;
        reg.iter()
            .map(|m| {
                let last_change = m.last_difference.as_ref().map(|d| {
                    json!({
                        "previous": d.slug_change.previous,
                        "current": d.slug_change.current,
                        "url": d.url,
                        "detected_at": d.detected_at.to_rfc3339(),
                    })
                });
                json!({
                    "id": m.id.0,
                    "name": m.name,
                    "endpoint_url": m.endpoint_url,
                    "filter_key": m.filter_key,
                    "interval_seconds": m.interval_seconds,
                    "running": m.is_running,
                    "last_change": last_change,
                })
            })
            .collect()
    };

    let active_timers = context.engine.lock().await.active_timers();

    json!({
        "running": true,
        "started_at_unix": context.started_at_unix,
        "active_timers": active_timers,
        "monitors": monitors,
        "socket": socket_path(&context.home).display().to_string(),
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

fn set_socket_permissions(socket: &Path) -> Result<(), DaemonError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(socket, fs::Permissions::from_mode(0o600))
            .map_err(|e| io_err(socket, e))?;
    }
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
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
