//! Blocking RPC client for the data node
//!
//! Used by the master's replication path and by integration tests. One
//! client per connection; requests are issued sequentially over the
//! stream. Semantic failures surface as [`RpcError::Remote`].

use std::net::{TcpStream, ToSocketAddrs};

use zerocopy::IntoBytes;

use super::messages::*;
use super::server::encode_request;
use super::{parse_header, read_frame, write_frame, RpcError, RpcId, RpcResult};
use super::{RPC_DELETE_BLOCK, RPC_GET_BLOCK_INFO, RPC_HEARTBEAT, RPC_READ_BLOCK, RPC_WRITE_BLOCK};

/// Block metadata as reported by `GetBlockInfo`
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub exists: bool,
    pub size: u64,
    pub access_count: u64,
    pub created_at: String,
    pub content_digest: String,
}

/// Blocking data-node client
pub struct RpcClient {
    stream: TcpStream,
}

impl RpcClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> RpcResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    fn call(&mut self, rpc_id: RpcId, header: &[u8], data: &[u8]) -> RpcResult<Vec<u8>> {
        let payload = encode_request(rpc_id, header, data);
        write_frame(&mut self.stream, &payload)?;
        read_frame(&mut self.stream)?
            .ok_or_else(|| RpcError::Malformed("server closed the connection".to_string()))
    }

    /// Read up to `length` bytes at `offset`; `length == 0` reads to the end
    pub fn read_block(&mut self, block_id: u64, offset: u64, length: u64) -> RpcResult<Vec<u8>> {
        let header = ReadBlockRequestHeader::new(block_id, offset, length);
        let response = self.call(RPC_READ_BLOCK, header.as_bytes(), &[])?;
        let (resp, body) = parse_header::<ReadBlockResponseHeader>(&response)?;

        if !resp.is_success() {
            return Err(remote_error(resp.status, body));
        }
        Ok(body.to_vec())
    }

    /// Write `data` at `offset`; `sync` requests a durable write
    pub fn write_block(
        &mut self,
        block_id: u64,
        offset: u64,
        data: &[u8],
        sync: bool,
    ) -> RpcResult<()> {
        let header = WriteBlockRequestHeader::new(block_id, offset, data.len() as u64, sync);
        let response = self.call(RPC_WRITE_BLOCK, header.as_bytes(), data)?;
        let (resp, body) = parse_header::<StatusResponseHeader>(&response)?;

        if !resp.is_success() {
            return Err(remote_error(resp.status, body));
        }
        Ok(())
    }

    pub fn delete_block(&mut self, block_id: u64) -> RpcResult<()> {
        let header = DeleteBlockRequestHeader::new(block_id);
        let response = self.call(RPC_DELETE_BLOCK, header.as_bytes(), &[])?;
        let (resp, body) = parse_header::<StatusResponseHeader>(&response)?;

        if !resp.is_success() {
            return Err(remote_error(resp.status, body));
        }
        Ok(())
    }

    pub fn get_block_info(&mut self, block_id: u64) -> RpcResult<BlockInfo> {
        let header = GetBlockInfoRequestHeader::new(block_id);
        let response = self.call(RPC_GET_BLOCK_INFO, header.as_bytes(), &[])?;
        let (resp, body) = parse_header::<GetBlockInfoResponseHeader>(&response)?;

        let created_at_len = resp.created_at_len as usize;
        let digest_len = resp.digest_len as usize;
        if body.len() != created_at_len + digest_len {
            return Err(RpcError::Malformed(
                "block info data section length mismatch".to_string(),
            ));
        }
        let created_at = String::from_utf8(body[..created_at_len].to_vec())
            .map_err(|_| RpcError::Malformed("timestamp is not utf-8".to_string()))?;
        let content_digest = String::from_utf8(body[created_at_len..].to_vec())
            .map_err(|_| RpcError::Malformed("digest is not utf-8".to_string()))?;

        Ok(BlockInfo {
            exists: resp.exists(),
            size: resp.size,
            access_count: resp.access_count,
            created_at,
            content_digest,
        })
    }

    /// Report liveness; returns the server's block inventory
    pub fn heartbeat(&mut self, node_id: &str) -> RpcResult<Vec<u64>> {
        let header = HeartbeatRequestHeader::new(node_id.len() as u64);
        let response = self.call(RPC_HEARTBEAT, header.as_bytes(), node_id.as_bytes())?;
        let (resp, body) = parse_header::<HeartbeatResponseHeader>(&response)?;

        if resp.status != super::status::OK {
            return Err(remote_error(resp.status, body));
        }
        let ids = decode_block_ids(body);
        if ids.len() as u64 != resp.block_count {
            return Err(RpcError::Malformed(
                "heartbeat inventory length mismatch".to_string(),
            ));
        }
        Ok(ids)
    }
}

fn remote_error(status: i32, body: &[u8]) -> RpcError {
    RpcError::Remote {
        status,
        message: String::from_utf8_lossy(body).into_owned(),
    }
}
