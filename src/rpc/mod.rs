//! RPC layer for the data node
//!
//! Requests and responses are framed over a TCP stream: a little-endian
//! `u32` payload length, then the payload. A request payload starts with a
//! `u16` rpc id followed by a fixed-size header and a variable data
//! section; a response payload is the call's response header followed by
//! its data section. Headers are `#[repr(C)]` zerocopy types, so no
//! serialization code is hand-written per call.
//!
//! The transport reports success even when the operation failed; semantic
//! failure travels in the response header (`status` plus an error string in
//! the data section) so clients can tell transport errors from application
//! errors.

pub mod client;
pub mod messages;
pub mod server;
pub mod service;

pub use client::RpcClient;
pub use server::RpcServer;
pub use service::DataNodeService;

use std::io::{ErrorKind, Read, Write};

/// RPC ID type for identifying operations
pub type RpcId = u16;

pub const RPC_READ_BLOCK: RpcId = 10;
pub const RPC_WRITE_BLOCK: RpcId = 11;
pub const RPC_DELETE_BLOCK: RpcId = 12;
pub const RPC_GET_BLOCK_INFO: RpcId = 13;
pub const RPC_HEARTBEAT: RpcId = 14;

/// Upper bound on a single frame
///
/// Large enough for a full block plus headers, and for heartbeat inventory
/// reports from a well-filled node.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Status codes carried in response headers
pub mod status {
    pub const OK: i32 = 0;
    pub const NOT_FOUND: i32 = 1;
    pub const INVALID_ARGUMENT: i32 = 2;
    pub const IO_ERROR: i32 = 3;
}

/// RPC errors (transport and framing; semantic errors travel in responses)
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unknown rpc id: {0}")]
    UnknownRpc(RpcId),

    #[error("Remote error (status {status}): {message}")]
    Remote { status: i32, message: String },
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Marker for wire-safe header types
pub trait Serializable:
    zerocopy::FromBytes
    + zerocopy::IntoBytes
    + zerocopy::KnownLayout
    + zerocopy::Immutable
    + std::fmt::Debug
{
}

impl<T> Serializable for T where
    T: zerocopy::FromBytes
        + zerocopy::IntoBytes
        + zerocopy::KnownLayout
        + zerocopy::Immutable
        + std::fmt::Debug
{
}

/// Split a header off the front of a payload
pub fn parse_header<T: Serializable>(payload: &[u8]) -> RpcResult<(T, &[u8])> {
    T::read_from_prefix(payload)
        .map_err(|_| RpcError::Malformed(format!("payload too short for {}", std::any::type_name::<T>())))
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> RpcResult<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame
///
/// Returns `None` on a clean end of stream (peer closed between frames).
pub fn read_frame<R: Read>(reader: &mut R) -> RpcResult<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}
