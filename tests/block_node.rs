//! End-to-end tests for a data node: RPC surface, write-back caching,
//! startup recovery, and the background flusher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use blockfs::cache::PolicyKind;
use blockfs::metadata::types::content_digest;
use blockfs::metadata::BlockManager;
use blockfs::rpc::{DataNodeService, RpcClient, RpcError, RpcServer};

struct TestNode {
    service: Arc<DataNodeService>,
    addr: std::net::SocketAddr,
    running: Arc<AtomicBool>,
    server_thread: Option<JoinHandle<()>>,
}

impl TestNode {
    fn start(dir: &TempDir, cache_enabled: bool, capacity: u64, policy: PolicyKind) -> Self {
        let manager = BlockManager::new(dir.path(), cache_enabled, capacity, policy).unwrap();
        let service = Arc::new(DataNodeService::new("datanode-test".to_string(), manager));
        let running = Arc::new(AtomicBool::new(true));

        let server =
            RpcServer::bind("127.0.0.1:0", Arc::clone(&service), Arc::clone(&running)).unwrap();
        let addr = server.local_addr().unwrap();
        let server_thread = std::thread::spawn(move || {
            server.run().unwrap();
        });

        Self {
            service,
            addr,
            running,
            server_thread: Some(server_thread),
        }
    }

    fn client(&self) -> RpcClient {
        RpcClient::connect(self.addr).unwrap()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.server_thread.take() {
            handle.join().unwrap();
        }
    }
}

#[test]
fn test_rpc_write_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 10, PolicyKind::Lru);
    let mut client = node.client();

    client
        .write_block(1, 0, b"Hello, BlockStore!", true)
        .unwrap();
    assert_eq!(client.read_block(1, 0, 0).unwrap(), b"Hello, BlockStore!");

    // The first write of a block lands on disk immediately.
    assert_eq!(
        std::fs::read(dir.path().join("blk_1.img")).unwrap(),
        b"Hello, BlockStore!"
    );
}

#[test]
fn test_rpc_partial_overwrite_extends_block() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 10, PolicyKind::Lru);
    let mut client = node.client();

    client.write_block(1, 0, b"AAAAAAAAAA", false).unwrap();
    client.write_block(1, 3, b"BBB", false).unwrap();
    assert_eq!(client.read_block(1, 0, 0).unwrap(), b"AAABBBAAAA");

    client.write_block(1, 12, b"DDD", false).unwrap();
    let content = client.read_block(1, 0, 0).unwrap();
    assert_eq!(content.len(), 15);
    assert_eq!(&content[..10], b"AAABBBAAAA");
    assert_eq!(&content[10..12], b"\0\0");
    assert_eq!(&content[12..], b"DDD");

    // Ranged reads against the merged image.
    assert_eq!(client.read_block(1, 3, 3).unwrap(), b"BBB");
    assert_eq!(client.read_block(1, 20, 0).unwrap(), b"");
}

#[test]
fn test_rpc_errors() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, false, 0, PolicyKind::Lru);
    let mut client = node.client();

    // Missing block: not-found status with the id in the message.
    match client.read_block(404, 0, 0) {
        Err(RpcError::Remote { status, message }) => {
            assert_eq!(status, blockfs::rpc::status::NOT_FOUND);
            assert!(message.contains("404"));
        }
        other => panic!("expected remote error, got {:?}", other.map(|v| v.len())),
    }

    // Over-size write: invalid-argument status.
    let oversize = vec![0u8; 64];
    match client.write_block(1, blockfs::constants::BLOCK_SIZE as u64, &oversize, false) {
        Err(RpcError::Remote { status, .. }) => {
            assert_eq!(status, blockfs::rpc::status::INVALID_ARGUMENT);
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    match client.delete_block(404) {
        Err(RpcError::Remote { status, .. }) => {
            assert_eq!(status, blockfs::rpc::status::NOT_FOUND);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn test_rpc_block_info_and_delete() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 10, PolicyKind::Lru);
    let mut client = node.client();

    let info = client.get_block_info(9).unwrap();
    assert!(!info.exists);

    client.write_block(9, 0, b"xyz", true).unwrap();
    client.read_block(9, 0, 0).unwrap();
    client.read_block(9, 0, 0).unwrap();

    let info = client.get_block_info(9).unwrap();
    assert!(info.exists);
    assert_eq!(info.size, 3);
    assert_eq!(info.access_count, 2);
    assert_eq!(info.content_digest, content_digest(b"xyz"));
    assert!(info.created_at.ends_with('Z'));

    client.delete_block(9).unwrap();
    assert!(!client.get_block_info(9).unwrap().exists);
    assert!(!dir.path().join("blk_9.img").exists());
}

#[test]
fn test_rpc_heartbeat_inventory() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, false, 0, PolicyKind::Lru);
    let mut client = node.client();

    assert!(client.heartbeat("datanode-test").unwrap().is_empty());

    client.write_block(3, 0, b"a", false).unwrap();
    client.write_block(5, 0, b"b", false).unwrap();

    let mut inventory = client.heartbeat("datanode-test").unwrap();
    inventory.sort_unstable();
    assert_eq!(inventory, vec![3, 5]);
}

#[test]
fn test_write_back_defers_until_flush() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 4, PolicyKind::Lru);
    let mut client = node.client();

    client.write_block(1, 0, b"v1", true).unwrap();
    assert_eq!(std::fs::read(dir.path().join("blk_1.img")).unwrap(), b"v1");

    // The update is write-back: cache serves v2, disk still holds v1.
    client.write_block(1, 0, b"v2", false).unwrap();
    assert_eq!(std::fs::read(dir.path().join("blk_1.img")).unwrap(), b"v1");
    assert_eq!(client.read_block(1, 0, 0).unwrap(), b"v2");
    assert_eq!(node.service.dirty_page_count(), 1);

    assert_eq!(node.service.flush_dirty_pages(), 1);
    assert_eq!(std::fs::read(dir.path().join("blk_1.img")).unwrap(), b"v2");
    assert_eq!(node.service.dirty_page_count(), 0);
}

#[test]
fn test_startup_recovery_from_disk() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("blk_7.img"), b"xyz").unwrap();

    let node = TestNode::start(&dir, true, 10, PolicyKind::Lru);
    let mut client = node.client();

    assert_eq!(client.read_block(7, 0, 0).unwrap(), b"xyz");

    let info = client.get_block_info(7).unwrap();
    assert!(info.exists);
    assert_eq!(info.size, 3);
    assert_eq!(info.content_digest, content_digest(b"xyz"));
    assert_eq!(client.heartbeat("datanode-test").unwrap(), vec![7]);
}

#[test]
fn test_restart_after_dirty_shutdown_serves_latest_data() {
    let dir = TempDir::new().unwrap();
    {
        let node = TestNode::start(&dir, true, 10, PolicyKind::Lfu);
        let mut client = node.client();
        client.write_block(1, 0, b"first", false).unwrap();
        client.write_block(1, 0, b"final", false).unwrap();
        // Dropping the node flushes dirty pages through the manager chain.
        drop(client);
        node.service.manager().flush_all();
    }

    let node = TestNode::start(&dir, false, 0, PolicyKind::Lru);
    let mut client = node.client();
    assert_eq!(client.read_block(1, 0, 0).unwrap(), b"final");
}

#[test]
fn test_background_flusher_clears_dirty_set() {
    use blockfs::server::BackgroundFlusher;

    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 10, PolicyKind::Lru);
    let mut client = node.client();

    let flusher = BackgroundFlusher::start(
        Arc::clone(&node.service),
        Duration::from_millis(100),
        0.4,
    )
    .unwrap();

    // Three dirty pages stay below ceil(10 * 0.4) = 4: no flush.
    for id in 1..=3u64 {
        client.write_block(id, 0, b"v1", false).unwrap();
        client.write_block(id, 0, b"v2", false).unwrap();
    }
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(node.service.dirty_page_count(), 3);

    // The fourth dirty page crosses the threshold; the flusher clears the
    // dirty set within a period or two.
    client.write_block(4, 0, b"v1", false).unwrap();
    client.write_block(4, 0, b"v2", false).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while node.service.dirty_page_count() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(node.service.dirty_page_count(), 0);

    // Every block's latest version reached disk.
    for id in 1..=4u64 {
        assert_eq!(
            std::fs::read(dir.path().join(format!("blk_{}.img", id))).unwrap(),
            b"v2"
        );
    }

    flusher.shutdown();
}

#[test]
fn test_concurrent_clients_on_distinct_blocks() {
    let dir = TempDir::new().unwrap();
    let node = TestNode::start(&dir, true, 64, PolicyKind::Lru);

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let addr = node.addr;
        handles.push(std::thread::spawn(move || {
            let mut client = RpcClient::connect(addr).unwrap();
            for i in 0..16u64 {
                let id = worker * 100 + i;
                let body = format!("payload-{}", id).into_bytes();
                client.write_block(id, 0, &body, false).unwrap();
                assert_eq!(client.read_block(id, 0, 0).unwrap(), body);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let inventory = node.service.manager().list_blocks();
    assert_eq!(inventory.len(), 64);
}
