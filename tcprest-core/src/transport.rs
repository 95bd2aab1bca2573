//! Reference async TCP transport (`spec.md` §4.6, §4.7 "The three transport
//! backends... each implement the same contract: read exactly one line,
//! deliver to the pipeline, write one line, close"). This is the tokio
//! event-loop variant; the blocking single-thread and selector/worker-pool
//! variants described by the spec are non-goals for this crate.

use crate::pipeline::Pipeline;
use log::{debug, error, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Maximum accepted request line length, enforced up front so a hostile
/// peer cannot exhaust memory with an unterminated line (`spec.md` §6:
/// "Maximum frame length: implementation-defined but not less than 1 MiB").
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const LIFECYCLE_CLOSED: u8 = 0;
const LIFECYCLE_RUNNING: u8 = 1;
const LIFECYCLE_CLOSING: u8 = 2;

fn lifecycle_str(code: u8) -> &'static str {
    match code {
        LIFECYCLE_CLOSED => "CLOSED",
        LIFECYCLE_RUNNING => "RUNNING",
        LIFECYCLE_CLOSING => "CLOSING",
        _ => unreachable!("lifecycle code out of range"),
    }
}

/// `up()`/`down()`/`status()`/`serverPort()` surface of `spec.md` §6, plus
/// graceful shutdown (§4.6): stop accepting, close connections, join
/// workers up to 5 seconds, set CLOSED.
pub struct ServerHandle {
    local_addr: SocketAddr,
    lifecycle: Arc<AtomicU8>,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn server_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn status(&self) -> &'static str {
        lifecycle_str(self.lifecycle.load(Ordering::SeqCst))
    }

    /// Idempotent: calling `down()` on an already-CLOSING/CLOSED server is a
    /// no-op join.
    pub async fn down(self) {
        let prior = self
            .lifecycle
            .swap(LIFECYCLE_CLOSING, Ordering::SeqCst);
        if prior == LIFECYCLE_CLOSED {
            return;
        }
        self.accept_task.abort();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), self.accept_task).await;
        self.lifecycle.store(LIFECYCLE_CLOSED, Ordering::SeqCst);
    }
}

/// Binds `addr` and starts accepting connections, each handled on its own
/// task (`spec.md` §5 "dispatches to a worker pool (nio/async variants)").
/// Every accepted connection follows the fixed contract: read one line,
/// run it through `pipeline`, write one line, close.
pub async fn up(addr: SocketAddr, pipeline: Arc<Pipeline>) -> io::Result<ServerHandle> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let lifecycle = Arc::new(AtomicU8::new(LIFECYCLE_RUNNING));

    let accept_lifecycle = lifecycle.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, &pipeline).await {
                            warn!("connection with {peer} ended with error: {err}");
                        }
                    });
                }
                Err(err) => {
                    error!("accept failed: {err}");
                    break;
                }
            }
            if accept_lifecycle.load(Ordering::SeqCst) != LIFECYCLE_RUNNING {
                break;
            }
        }
    });

    Ok(ServerHandle {
        local_addr,
        lifecycle,
        accept_task,
    })
}

async fn handle_connection(stream: TcpStream, pipeline: &Pipeline) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }
    if line.len() > MAX_FRAME_LEN {
        warn!("rejecting oversize frame of {} bytes", line.len());
        return Ok(());
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let response = pipeline.handle_line(trimmed);
    debug!("responding with {} bytes", response.len());

    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::MapperRegistry;
    use crate::registry::{ResourceRegistry, ServiceBuilder};
    use crate::security::SecurityConfig;
    use crate::signature::TypeDesc;
    use crate::value::Value;
    use tokio::io::AsyncReadExt;

    struct Calculator;

    fn test_pipeline() -> Arc<Pipeline> {
        let registry = ResourceRegistry::new();
        registry.add_singleton_resource(
            ServiceBuilder::<Calculator>::new("Calculator")
                .method("add", "(II)", |_, params| {
                    Ok(Value::Int(params[0].as_i32()? + params[1].as_i32()?))
                })
                .build_singleton(Calculator),
        );
        Arc::new(Pipeline::new(
            Arc::new(registry),
            Arc::new(MapperRegistry::with_builtins()),
            Arc::new(SecurityConfig::default()),
        ))
    }

    #[tokio::test]
    async fn round_trips_one_request_over_tcp() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = up(addr, test_pipeline()).await.unwrap();
        assert_eq!(handle.status(), "RUNNING");
        let port = handle.server_port();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mappers = MapperRegistry::with_builtins();
        let security = SecurityConfig::default();
        let request = crate::codec::encode_request(
            "Calculator",
            "add",
            &[(TypeDesc::Int, Value::Int(5)), (TypeDesc::Int, Value::Int(3))],
            &mappers,
            &security,
        )
        .unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        let decoded =
            crate::codec::decode_response_head(response.trim_end(), &security, &mappers, None)
                .unwrap();
        assert_eq!(decoded.status, crate::codec::Status::Success);

        handle.down().await;
    }

    #[tokio::test]
    async fn down_then_up_releases_the_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = up(addr, test_pipeline()).await.unwrap();
        let port = handle.server_port();
        handle.down().await;

        let reopened = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            up(format!("127.0.0.1:{port}").parse().unwrap(), test_pipeline()),
        )
        .await
        .expect("rebind within 5 seconds")
        .unwrap();
        assert_eq!(reopened.status(), "RUNNING");
        reopened.down().await;
    }
}
