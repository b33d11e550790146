//! Blocking TCP server for the data-node RPC surface
//!
//! One accept loop, one worker thread per connection, each connection
//! carrying a stream of length-prefixed frames. The accept loop polls a
//! shutdown flag between accepts so the daemon can stop taking new
//! requests without tearing down in-flight ones.

use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use zerocopy::IntoBytes;

use super::messages::*;
use super::service::DataNodeService;
use super::{parse_header, read_frame, write_frame, RpcError, RpcId, RpcResult};
use super::{RPC_DELETE_BLOCK, RPC_GET_BLOCK_INFO, RPC_HEARTBEAT, RPC_READ_BLOCK, RPC_WRITE_BLOCK};

/// How often the accept loop checks the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// RPC server over a bound TCP listener
pub struct RpcServer {
    listener: TcpListener,
    service: Arc<DataNodeService>,
    running: Arc<AtomicBool>,
}

impl RpcServer {
    /// Bind the listen address; the listener is non-blocking so the accept
    /// loop can observe shutdown
    pub fn bind(
        addr: &str,
        service: Arc<DataNodeService>,
        running: Arc<AtomicBool>,
    ) -> RpcResult<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "rpc server listening");
        Ok(Self {
            listener,
            service,
            running,
        })
    }

    pub fn local_addr(&self) -> RpcResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown flag clears
    ///
    /// Connection threads are detached; they terminate when their peer
    /// disconnects. In-flight requests run to completion.
    pub fn run(&self) -> RpcResult<()> {
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "accepted connection");
                    let service = Arc::clone(&self.service);
                    std::thread::Builder::new()
                        .name(format!("rpc-{}", peer))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, &service) {
                                tracing::warn!(peer = %peer, error = %e, "connection failed");
                            }
                        })?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    return Err(e.into());
                }
            }
        }
        tracing::info!("rpc server stopped accepting connections");
        Ok(())
    }
}

/// Serve one connection: a sequence of request frames, one response each
fn handle_connection(stream: TcpStream, service: &DataNodeService) -> RpcResult<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    while let Some(payload) = read_frame(&mut reader)? {
        let response = dispatch(service, &payload)?;
        write_frame(&mut writer, &response)?;
    }
    Ok(())
}

/// Decode a request payload, run the handler, encode the response payload
fn dispatch(service: &DataNodeService, payload: &[u8]) -> RpcResult<Vec<u8>> {
    if payload.len() < 2 {
        return Err(RpcError::Malformed("missing rpc id".to_string()));
    }
    let rpc_id = RpcId::from_le_bytes([payload[0], payload[1]]);
    let rest = &payload[2..];

    match rpc_id {
        RPC_READ_BLOCK => {
            let (header, _) = parse_header::<ReadBlockRequestHeader>(rest)?;
            let (resp, data) = service.handle_read_block(&header);
            Ok(encode_response(resp.as_bytes(), &data))
        }
        RPC_WRITE_BLOCK => {
            let (header, data) = parse_header::<WriteBlockRequestHeader>(rest)?;
            if data.len() != header.data_len as usize {
                return Err(RpcError::Malformed(format!(
                    "write data length mismatch: header says {}, got {}",
                    header.data_len,
                    data.len()
                )));
            }
            let (resp, body) = service.handle_write_block(&header, data);
            Ok(encode_response(resp.as_bytes(), &body))
        }
        RPC_DELETE_BLOCK => {
            let (header, _) = parse_header::<DeleteBlockRequestHeader>(rest)?;
            let (resp, body) = service.handle_delete_block(&header);
            Ok(encode_response(resp.as_bytes(), &body))
        }
        RPC_GET_BLOCK_INFO => {
            let (header, _) = parse_header::<GetBlockInfoRequestHeader>(rest)?;
            let (resp, body) = service.handle_get_block_info(&header);
            Ok(encode_response(resp.as_bytes(), &body))
        }
        RPC_HEARTBEAT => {
            let (header, data) = parse_header::<HeartbeatRequestHeader>(rest)?;
            if data.len() != header.node_id_len as usize {
                return Err(RpcError::Malformed("node id length mismatch".to_string()));
            }
            let node_id = std::str::from_utf8(data)
                .map_err(|_| RpcError::Malformed("node id is not utf-8".to_string()))?;
            let (resp, body) = service.handle_heartbeat(node_id);
            Ok(encode_response(resp.as_bytes(), &body))
        }
        other => Err(RpcError::UnknownRpc(other)),
    }
}

fn encode_response(header: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.len() + data.len());
    out.extend_from_slice(header);
    out.extend_from_slice(data);
    out
}

/// Build a request payload: rpc id, header, data section
pub fn encode_request(rpc_id: RpcId, header: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + header.len() + data.len());
    out.extend_from_slice(&rpc_id.to_le_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(data);
    out
}
