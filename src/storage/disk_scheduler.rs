//! Disk Scheduler - serializes page I/O on a background worker.
//!
//! The [`DiskScheduler`] owns the [`DiskManager`] and a bounded request
//! queue. Callers build a [`DiskRequest`], attach a one-shot completion
//! channel from [`DiskScheduler::create_completion`], and block on the
//! receiving half until the worker has executed the request.
//!
//! Requests drain in FIFO order on a single thread, so writes and reads
//! against the same page execute in the order they were scheduled.

use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use tracing::error;

use crate::common::PageId;
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// Capacity of the request queue. `schedule` only blocks once this many
/// requests are in flight.
const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Sending half of a one-shot completion channel.
pub type Completion = Sender<DiskReply>;

/// Receiving half of a one-shot completion channel; the caller blocks on
/// this until the worker has executed the request.
pub type CompletionWaiter = Receiver<DiskReply>;

/// A single read or write of one page.
pub struct DiskRequest {
    /// True for a write, false for a read.
    pub is_write: bool,
    /// The page buffer. Written to disk for a write; filled from disk for
    /// a read. Ownership travels to the worker and comes back in the
    /// [`DiskReply`].
    pub data: Box<Page>,
    /// Target page.
    pub page_id: PageId,
    /// Fired exactly once when the request has been executed.
    pub ack: Completion,
}

/// Outcome of a [`DiskRequest`], delivered through its completion channel.
///
/// The completion fires even when the underlying file operation failed
/// (`ok == false`); the failure itself is logged by the worker.
pub struct DiskReply {
    pub ok: bool,
    pub data: Box<Page>,
}

/// Schedules page I/O onto a single background worker thread.
///
/// The worker is spawned in `new` and joined on drop; a `None` pushed onto
/// the queue is the shutdown sentinel.
pub struct DiskScheduler {
    queue: Sender<Option<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawn the worker thread and hand it the disk manager.
    pub fn new(disk_manager: DiskManager) -> Self {
        let (queue, requests) = flume::bounded(REQUEST_QUEUE_CAPACITY);

        let worker = thread::Builder::new()
            .name("disk-scheduler".into())
            .spawn(move || Self::run_worker(disk_manager, requests))
            .expect("failed to spawn disk scheduler worker");

        Self {
            queue,
            worker: Some(worker),
        }
    }

    /// Push a request onto the queue.
    ///
    /// Non-blocking as long as the queue has capacity.
    pub fn schedule(&self, request: DiskRequest) {
        self.queue
            .send(Some(request))
            .expect("disk scheduler worker is gone");
    }

    /// Create a one-shot completion channel for a request.
    pub fn create_completion() -> (Completion, CompletionWaiter) {
        flume::bounded(1)
    }

    fn run_worker(mut disk_manager: DiskManager, requests: Receiver<Option<DiskRequest>>) {
        while let Ok(Some(mut request)) = requests.recv() {
            let result = if request.is_write {
                disk_manager.write_page(request.page_id, &request.data)
            } else {
                disk_manager.read_page(request.page_id, &mut request.data)
            };

            if let Err(e) = &result {
                let op = if request.is_write { "write" } else { "read" };
                error!("disk {op} of page {} failed: {e}", request.page_id);
            }

            // Fire the completion even on failure so the caller unblocks.
            let _ = request.ack.send(DiskReply {
                ok: result.is_ok(),
                data: request.data,
            });
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.queue.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
