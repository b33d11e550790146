//! Background dirty-page flusher
//!
//! A single long-lived thread samples the dirty page count every interval
//! and, once it reaches the configured share of cache capacity, asks the
//! service to flush all dirty pages. This bounds the shutdown flush and
//! smooths eviction write-back storms while keeping most of the
//! write-coalescing benefit of the write-back cache.
//!
//! Only started when the cache is enabled. Termination is cooperative: the
//! thread checks its shutdown flag every interval and is joined on
//! [`BackgroundFlusher::shutdown`] or drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::rpc::DataNodeService;

/// Handle to the flusher thread
pub struct BackgroundFlusher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundFlusher {
    /// Start the flusher over a service with an enabled cache
    ///
    /// `threshold_ratio` is the dirty share of capacity that triggers a
    /// flush; the page threshold is `ceil(capacity * ratio)`, at least 1.
    pub fn start(
        service: Arc<DataNodeService>,
        interval: Duration,
        threshold_ratio: f64,
    ) -> std::io::Result<Self> {
        let capacity = service.cache_capacity();
        let threshold = ((capacity as f64 * threshold_ratio).ceil() as u64).max(1);

        tracing::info!(
            capacity,
            threshold,
            interval_ms = interval.as_millis() as u64,
            "background flusher started"
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("flusher".to_string())
            .spawn(move || run(service, flag, interval, threshold))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop the flusher and wait for its thread to exit
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("background flusher thread panicked");
            }
        }
    }
}

impl Drop for BackgroundFlusher {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(
    service: Arc<DataNodeService>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    threshold: u64,
) {
    loop {
        std::thread::sleep(interval);
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let dirty = service.dirty_page_count();
        if dirty >= threshold {
            tracing::info!(dirty, threshold, "dirty page threshold reached, flushing");
            let flushed = service.flush_dirty_pages();
            tracing::info!(flushed, "background flusher wrote dirty pages to disk");
        }
    }
    tracing::debug!("background flusher stopped");
}
