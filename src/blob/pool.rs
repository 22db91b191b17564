//! Blob pool with bounded capacity and deadline-aware acquisition.
//!
//! The pool owns up to `max_blobs` reusable backing buffers. [`BlobPool::acquire`]
//! hands one out immediately or fails with `PoolExhausted`;
//! [`BlobPool::acquire_within`] waits for a lease to come back, giving up after
//! the supplied deadline. The waiting variant is the backpressure valve applied
//! to serialization: when the pool is drained, producers slow down instead of
//! allocating without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::Notify;

use super::BinaryBlob;
use crate::error::{Result, WirebusError};

pub(crate) struct PoolShared {
    free: Mutex<Vec<BytesMut>>,
    /// Buffers created so far; never exceeds `max_blobs`.
    created: AtomicUsize,
    max_blobs: usize,
    blob_capacity: usize,
    returned: Notify,
}

impl PoolShared {
    pub(crate) fn put_back(&self, mut buf: BytesMut) {
        buf.clear();
        self.free.lock().expect("blob pool poisoned").push(buf);
        self.returned.notify_one();
    }
}

/// A pool of reusable [`BinaryBlob`] backing buffers.
///
/// Cloning the pool is cheap; all clones share the same buffers.
#[derive(Clone)]
pub struct BlobPool {
    shared: Arc<PoolShared>,
}

impl BlobPool {
    /// Create a pool of at most `max_blobs` buffers, each starting at
    /// `blob_capacity` bytes. Buffers grow on demand and keep their grown
    /// capacity when returned.
    pub fn new(max_blobs: usize, blob_capacity: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(max_blobs)),
                created: AtomicUsize::new(0),
                max_blobs,
                blob_capacity,
                returned: Notify::new(),
            }),
        }
    }

    /// Lease a blob without waiting.
    ///
    /// Returns `PoolExhausted` when every buffer is out on lease.
    pub fn acquire(&self) -> Result<BinaryBlob> {
        let shared = &self.shared;
        if let Some(buf) = shared.free.lock().expect("blob pool poisoned").pop() {
            return Ok(BinaryBlob::pooled(buf, shared.clone()));
        }

        // Lazily create buffers up to the cap.
        let mut created = shared.created.load(Ordering::Acquire);
        while created < shared.max_blobs {
            match shared.created.compare_exchange(
                created,
                created + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let buf = BytesMut::with_capacity(shared.blob_capacity);
                    return Ok(BinaryBlob::pooled(buf, shared.clone()));
                }
                Err(actual) => created = actual,
            }
        }

        Err(WirebusError::PoolExhausted)
    }

    /// Lease a blob, waiting up to `deadline` for one to be returned.
    ///
    /// Returns `AcquireTimeout` when the deadline lapses first.
    pub async fn acquire_within(&self, deadline: Duration) -> Result<BinaryBlob> {
        let wait = async {
            loop {
                match self.acquire() {
                    Ok(blob) => return blob,
                    Err(_) => self.shared.returned.notified().await,
                }
            }
        };

        tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| WirebusError::AcquireTimeout)
    }

    /// Number of blobs that could be leased right now.
    pub fn available(&self) -> usize {
        let free = self.shared.free.lock().expect("blob pool poisoned").len();
        let uncreated = self.shared.max_blobs - self.shared.created.load(Ordering::Acquire);
        free + uncreated
    }

    /// Number of blobs currently out on lease.
    pub fn leased(&self) -> usize {
        let free = self.shared.free.lock().expect("blob pool poisoned").len();
        self.shared.created.load(Ordering::Acquire) - free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_acquire_and_release() {
        let pool = BlobPool::new(2, 64);
        assert_eq!(pool.available(), 2);

        let blob = pool.acquire().unwrap();
        assert_eq!(pool.leased(), 1);

        drop(blob);
        assert_eq!(pool.leased(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let pool = BlobPool::new(1, 16);
        let _held = pool.acquire().unwrap();

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, WirebusError::PoolExhausted));
    }

    #[test]
    fn test_returned_buffer_is_cleared() {
        let pool = BlobPool::new(1, 16);
        {
            let mut blob = pool.acquire().unwrap();
            blob.add_u32(0xFFFF_FFFF);
        }
        let blob = pool.acquire().unwrap();
        assert!(blob.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_within_times_out() {
        let pool = BlobPool::new(1, 16);
        let _held = pool.acquire().unwrap();

        let start = Instant::now();
        let err = pool
            .acquire_within(Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, WirebusError::AcquireTimeout));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_acquire_within_succeeds_after_release() {
        let pool = BlobPool::new(1, 16);
        let held = pool.acquire().unwrap();

        let waiter = pool.clone();
        let task = tokio::spawn(async move { waiter.acquire_within(Duration::from_secs(1)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        let blob = task.await.unwrap().unwrap();
        assert!(blob.is_empty());
    }
}
