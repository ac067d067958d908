//! Control socket: server (during `mdq run`) and client (every other command).
//!
//! Protocol: one JSON [`ControlRequest`] per line, answered by one JSON
//! [`ControlReply`] line on the same connection.

use anyhow::{Context, Result};
use mdq_core::{Engine, JobId, JobState, QueueError, TagHints};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Submit {
        source: String,
        destination: PathBuf,
        #[serde(default)]
        hints: TagHints,
    },
    Pause { id: JobId },
    Resume { id: JobId },
    Cancel { id: JobId },
    CancelAll,
    Retry { id: JobId },
    Remove { id: JobId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Submitted { id: JobId },
    State { id: JobId, state: JobState },
    States { jobs: Vec<(JobId, JobState)> },
    Error { message: String },
}

impl ControlReply {
    fn from_error(e: QueueError) -> Self {
        ControlReply::Error {
            message: e.to_string(),
        }
    }
}

/// `~/.local/state/mdq/control.sock`
pub fn default_socket_path() -> Result<PathBuf> {
    Ok(mdq_core::config::state_dir()?.join("control.sock"))
}

/// Apply one request to the running engine.
pub async fn dispatch(engine: &Engine, request: ControlRequest) -> ControlReply {
    let state = |id: JobId, r: Result<JobState, QueueError>| match r {
        Ok(state) => ControlReply::State { id, state },
        Err(e) => ControlReply::from_error(e),
    };
    match request {
        ControlRequest::Submit {
            source,
            destination,
            hints,
        } => match engine.submit(source, destination, hints) {
            Ok(id) => ControlReply::Submitted { id },
            Err(e) => ControlReply::from_error(e),
        },
        ControlRequest::Pause { id } => state(id, engine.pause(id).await),
        ControlRequest::Resume { id } => state(id, engine.resume(id).await),
        ControlRequest::Cancel { id } => state(id, engine.cancel(id).await),
        ControlRequest::Retry { id } => state(id, engine.retry(id)),
        ControlRequest::Remove { id } => state(id, engine.remove(id).map(|job| job.state)),
        ControlRequest::CancelAll => match engine.cancel_all().await {
            Ok(jobs) => ControlReply::States { jobs },
            Err(e) => ControlReply::from_error(e),
        },
    }
}

/// Bind `path` and serve requests against `engine` until the task is aborted.
/// A stale socket file left by a crashed run is replaced.
pub fn spawn_control_listener(
    engine: Engine,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale control socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("remove {}", path.display())),
    }
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(engine, stream).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(engine: Engine, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ControlRequest>(line) {
            Ok(request) => {
                tracing::debug!(?request, "control request");
                dispatch(&engine, request).await
            }
            Err(e) => ControlReply::Error {
                message: format!("malformed request: {}", e),
            },
        };
        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Send one request to a running `mdq run`. Returns `None` when no run is
/// listening (socket missing or stale), so the caller can act on the
/// database instead.
pub async fn send(path: &Path, request: &ControlRequest) -> Result<Option<ControlReply>> {
    let stream = match UnixStream::connect(path).await {
        Ok(s) => s,
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            return Ok(None)
        }
        Err(e) => return Err(e).with_context(|| format!("connect {}", path.display())),
    };
    let (read, mut write) = stream.into_split();
    let mut msg = serde_json::to_string(request)?;
    msg.push('\n');
    write.write_all(msg.as_bytes()).await?;
    let line = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .context("control socket closed without a reply")?;
    let reply = serde_json::from_str(&line).context("malformed control reply")?;
    Ok(Some(reply))
}

/// Whether a run is listening on `path`.
pub async fn is_live(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdq_core::fetch::FileTransport;
    use mdq_core::EngineConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(root: &Path) -> Engine {
        let config = EngineConfig::with_dirs(root.join("staging"), root.join("library"));
        Engine::builder(config)
            .transport(Arc::new(FileTransport))
            .build()
            .unwrap()
    }

    #[test]
    fn request_wire_format() {
        let json = serde_json::to_string(&ControlRequest::Pause { id: 4 }).unwrap();
        assert_eq!(json, r#"{"op":"pause","id":4}"#);
        let parsed: ControlRequest =
            serde_json::from_str(r#"{"op":"submit","source":"a","destination":"b.mp3"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            ControlRequest::Submit {
                source: "a".into(),
                destination: PathBuf::from("b.mp3"),
                hints: TagHints::default(),
            }
        );
        let reply = serde_json::to_string(&ControlReply::State {
            id: 4,
            state: JobState::Paused,
        })
        .unwrap();
        assert_eq!(reply, r#"{"reply":"state","id":4,"state":"paused"}"#);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispatch_reports_errors_as_replies() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path());
        let reply = dispatch(&engine, ControlRequest::Resume { id: 9 }).await;
        assert_eq!(
            reply,
            ControlReply::Error {
                message: QueueError::NotFound(9).to_string()
            }
        );
        let reply = dispatch(
            &engine,
            ControlRequest::Submit {
                source: String::new(),
                destination: PathBuf::from("x.mp3"),
                hints: TagHints::default(),
            },
        )
        .await;
        assert!(matches!(reply, ControlReply::Error { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_round_trip_submits_and_controls_jobs() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("a.bin");
        std::fs::write(&source, b"payload").unwrap();
        let engine = engine(root.path());
        let path = root.path().join("control.sock");
        let server = spawn_control_listener(engine.clone(), &path).unwrap();
        assert!(is_live(&path).await);

        let reply = send(
            &path,
            &ControlRequest::Submit {
                source: source.to_string_lossy().into_owned(),
                destination: PathBuf::from("a.bin"),
                hints: TagHints::default(),
            },
        )
        .await
        .unwrap()
        .unwrap();
        let ControlReply::Submitted { id } = reply else {
            panic!("expected a submitted reply");
        };
        tokio::time::timeout(Duration::from_secs(10), engine.wait_idle())
            .await
            .unwrap();

        let reply = send(&path, &ControlRequest::Cancel { id }).await.unwrap();
        assert_eq!(
            reply,
            Some(ControlReply::State {
                id,
                state: JobState::Completed
            })
        );
        let reply = send(&path, &ControlRequest::Remove { id }).await.unwrap();
        assert_eq!(
            reply,
            Some(ControlReply::State {
                id,
                state: JobState::Completed
            })
        );
        assert!(engine.get(id).is_err());

        server.abort();
        let _ = server.await;
    }

    #[tokio::test]
    async fn send_without_listener_returns_none() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("control.sock");
        assert_eq!(
            send(&path, &ControlRequest::CancelAll).await.unwrap(),
            None
        );
        // Stale socket file with nobody listening.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(!is_live(&path).await);
        assert_eq!(
            send(&path, &ControlRequest::CancelAll).await.unwrap(),
            None
        );
    }
}
