//! Per-connection read/dispatch/write loop (§4.3).
//!
//! One task per accepted connection. Owns framing (including the 8 KiB
//! overlong-line policy) and graceful shutdown; the protocol parsing and
//! store dispatch themselves are delegated to [`crate::protocol`] and
//! [`crate::store`].

use std::net::SocketAddr;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::metrics::ServerMetrics;
use crate::protocol::{parse_request, Command, Response};
use crate::store::{IndexOutcome, IndexStore};
use std::sync::Arc;

/// Maximum accepted line length. Comfortably accommodates a package name
/// plus thousands of short dependency names; anything longer is framing
/// abuse, not a legitimate request.
const MAX_LINE_LEN: usize = 8 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

async fn dispatch(store: &IndexStore, command: Command) -> Response {
    let outcome = match command {
        Command::Index { name, deps } => store.index(&name, &deps).await,
        Command::Remove { name } => store.remove(&name).await,
        Command::Query { name } => store.query(&name).await,
    };
    match outcome {
        IndexOutcome::Ok => Response::Ok,
        IndexOutcome::Fail => Response::Fail,
    }
}

async fn handle_line(store: &IndexStore, line: &[u8]) -> Response {
    let line = match std::str::from_utf8(line) {
        Ok(s) => s,
        Err(_) => {
            trace!("request line is not valid UTF-8");
            return Response::Error;
        }
    };
    match parse_request(line) {
        Ok(command) => dispatch(store, command).await,
        Err(err) => {
            trace!("parse error: {err}");
            Response::Error
        }
    }
}

/// Drive one accepted TCP connection until EOF, an unrecoverable I/O error,
/// or a shutdown signal.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: IndexStore,
    metrics: Arc<ServerMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    metrics.record_connection();

    let mut buf: Vec<u8> = Vec::new();
    let mut discarding = false;
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    'conn: loop {
        let n = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("peer {peer}: shutting down, closing connection");
                break 'conn;
            }
            res = stream.read(&mut chunk) => {
                match res {
                    Ok(0) => {
                        debug!("peer {peer}: EOF");
                        break 'conn;
                    }
                    Ok(n) => n,
                    Err(err) => {
                        debug!("peer {peer}: read error: {err}");
                        break 'conn;
                    }
                }
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            if discarding {
                match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        buf.drain(..=pos);
                        discarding = false;
                        if !write_response(&mut stream, Response::Error, &metrics).await {
                            break 'conn;
                        }
                    }
                    None => {
                        buf.clear();
                        break;
                    }
                }
            } else if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let response = if pos > MAX_LINE_LEN {
                    buf.drain(..=pos);
                    Response::Error
                } else {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    handle_line(&store, &line[..line.len() - 1]).await
                };
                if !write_response(&mut stream, response, &metrics).await {
                    break 'conn;
                }
            } else if buf.len() > MAX_LINE_LEN {
                discarding = true;
                buf.clear();
            } else {
                break;
            }
        }
    }

    metrics.record_disconnection();
}

/// Writes and flushes a response line. Returns `false` if the write failed,
/// telling the caller to tear down the connection.
async fn write_response(stream: &mut TcpStream, response: Response, metrics: &ServerMetrics) -> bool {
    metrics.record_request(response);
    match stream.write_all(response.as_line().as_bytes()).await {
        Ok(()) => match stream.flush().await {
            Ok(()) => true,
            Err(err) => {
                debug!("write flush error: {err}");
                false
            }
        },
        Err(err) => {
            debug!("write error: {err}");
            false
        }
    }
}
