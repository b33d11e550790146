//! Wire messages for data-node RPCs
//!
//! Every message is a fixed `#[repr(C)]` header plus a variable data
//! section; lengths of the variable parts ride in the header. Headers must
//! stay free of implicit padding so the zerocopy derives hold, so padding
//! is always spelled out.

use super::status;

// ============================================================================
// ReadBlock
// ============================================================================

/// ReadBlock request: no data section
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct ReadBlockRequestHeader {
    pub block_id: u64,

    /// Starting byte offset within the block
    pub offset: u64,

    /// Bytes to read; 0 means "to the end of the block"
    pub length: u64,
}

impl ReadBlockRequestHeader {
    pub fn new(block_id: u64, offset: u64, length: u64) -> Self {
        Self {
            block_id,
            offset,
            length,
        }
    }
}

/// ReadBlock response: data section holds the block bytes on success or the
/// error text on failure
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct ReadBlockResponseHeader {
    /// Number of data bytes actually read
    pub bytes_read: u64,

    /// 0 = success (see [`status`](super::status))
    pub status: i32,

    /// Length of the error text in the data section (failure only)
    pub error_len: u32,
}

impl ReadBlockResponseHeader {
    pub fn success(bytes_read: u64) -> Self {
        Self {
            bytes_read,
            status: status::OK,
            error_len: 0,
        }
    }

    pub fn error(status: i32, error_len: u32) -> Self {
        Self {
            bytes_read: 0,
            status,
            error_len,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == status::OK
    }
}

// ============================================================================
// WriteBlock
// ============================================================================

/// WriteBlock request: data section holds the bytes to write
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct WriteBlockRequestHeader {
    pub block_id: u64,

    /// Starting byte offset within the block
    pub offset: u64,

    /// Length of the data section
    pub data_len: u64,

    /// Non-zero requests a durable write (fsync)
    pub sync: u8,

    _padding: [u8; 7],
}

impl WriteBlockRequestHeader {
    pub fn new(block_id: u64, offset: u64, data_len: u64, sync: bool) -> Self {
        Self {
            block_id,
            offset,
            data_len,
            sync: sync as u8,
            _padding: [0; 7],
        }
    }

    pub fn sync(&self) -> bool {
        self.sync != 0
    }
}

/// Generic status response for WriteBlock and DeleteBlock: data section
/// holds the error text on failure
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct StatusResponseHeader {
    /// 0 = success (see [`status`](super::status))
    pub status: i32,

    /// Length of the error text in the data section (failure only)
    pub error_len: u32,
}

impl StatusResponseHeader {
    pub fn success() -> Self {
        Self {
            status: status::OK,
            error_len: 0,
        }
    }

    pub fn error(status: i32, error_len: u32) -> Self {
        Self { status, error_len }
    }

    pub fn is_success(&self) -> bool {
        self.status == status::OK
    }
}

// ============================================================================
// DeleteBlock
// ============================================================================

/// DeleteBlock request: no data section
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct DeleteBlockRequestHeader {
    pub block_id: u64,
}

impl DeleteBlockRequestHeader {
    pub fn new(block_id: u64) -> Self {
        Self { block_id }
    }
}

// ============================================================================
// GetBlockInfo
// ============================================================================

/// GetBlockInfo request: no data section
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct GetBlockInfoRequestHeader {
    pub block_id: u64,
}

impl GetBlockInfoRequestHeader {
    pub fn new(block_id: u64) -> Self {
        Self { block_id }
    }
}

/// GetBlockInfo response: data section holds the creation timestamp
/// followed by the content digest, lengths as declared here
///
/// An unknown block answers `exists = 0` with empty metadata rather than an
/// error status; existence is the question being asked.
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct GetBlockInfoResponseHeader {
    /// Logical block size in bytes
    pub size: u64,

    /// Reads since the record was created
    pub access_count: u64,

    /// 1 if the block is known to this node
    pub exists: u8,

    _padding: [u8; 7],

    /// Length of the timestamp in the data section
    pub created_at_len: u32,

    /// Length of the digest in the data section
    pub digest_len: u32,
}

impl GetBlockInfoResponseHeader {
    pub fn found(size: u64, access_count: u64, created_at_len: u32, digest_len: u32) -> Self {
        Self {
            size,
            access_count,
            exists: 1,
            _padding: [0; 7],
            created_at_len,
            digest_len,
        }
    }

    pub fn missing() -> Self {
        Self {
            size: 0,
            access_count: 0,
            exists: 0,
            _padding: [0; 7],
            created_at_len: 0,
            digest_len: 0,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists != 0
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Heartbeat request: data section holds the reporting node's id string
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct HeartbeatRequestHeader {
    /// Length of the node id in the data section
    pub node_id_len: u64,
}

impl HeartbeatRequestHeader {
    pub fn new(node_id_len: u64) -> Self {
        Self { node_id_len }
    }
}

/// Heartbeat response: data section holds `block_count` little-endian
/// `u64` block ids, the node's current inventory
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
)]
pub struct HeartbeatResponseHeader {
    pub block_count: u64,

    /// 0 = success
    pub status: i32,

    _padding: [u8; 4],
}

impl HeartbeatResponseHeader {
    pub fn success(block_count: u64) -> Self {
        Self {
            block_count,
            status: status::OK,
            _padding: [0; 4],
        }
    }
}

/// Encode a block inventory as the heartbeat data section
pub fn encode_block_ids(ids: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// Decode the heartbeat data section back into block ids
pub fn decode_block_ids(data: &[u8]) -> Vec<u64> {
    data.chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            u64::from_le_bytes(buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    #[test]
    fn test_header_sizes_have_no_hidden_padding() {
        assert_eq!(std::mem::size_of::<ReadBlockRequestHeader>(), 24);
        assert_eq!(std::mem::size_of::<ReadBlockResponseHeader>(), 16);
        assert_eq!(std::mem::size_of::<WriteBlockRequestHeader>(), 32);
        assert_eq!(std::mem::size_of::<StatusResponseHeader>(), 8);
        assert_eq!(std::mem::size_of::<DeleteBlockRequestHeader>(), 8);
        assert_eq!(std::mem::size_of::<GetBlockInfoRequestHeader>(), 8);
        assert_eq!(std::mem::size_of::<GetBlockInfoResponseHeader>(), 32);
        assert_eq!(std::mem::size_of::<HeartbeatRequestHeader>(), 8);
        assert_eq!(std::mem::size_of::<HeartbeatResponseHeader>(), 16);
    }

    #[test]
    fn test_write_header_wire_round_trip() {
        let header = WriteBlockRequestHeader::new(42, 128, 5, true);
        let bytes = header.as_bytes().to_vec();
        let (parsed, rest) = crate::rpc::parse_header::<WriteBlockRequestHeader>(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.block_id, 42);
        assert_eq!(parsed.offset, 128);
        assert_eq!(parsed.data_len, 5);
        assert!(parsed.sync());
    }

    #[test]
    fn test_block_id_encoding_round_trip() {
        let ids = vec![1u64, 7, u64::MAX];
        assert_eq!(decode_block_ids(&encode_block_ids(&ids)), ids);
        assert!(decode_block_ids(&[]).is_empty());
    }
}
