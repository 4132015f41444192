/// Size-tiered pool of reusable upload buffers
///
/// Each file section is buffered fully before it is written to the blob
/// store. Buffers come from this pool and go back to it when the
/// `PooledBuffer` guard drops, so peak memory depends on concurrent
/// requests, not on how many sections one upload carries.
use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex};

/// Default tier sizes: 64 KiB, 1 MiB, 16 MiB
pub const DEFAULT_TIERS: [usize; 3] = [64 * 1024, 1024 * 1024, 16 * 1024 * 1024];

struct Tier {
    size: usize,
    free: Mutex<Vec<BytesMut>>,
}

struct PoolInner {
    tiers: Vec<Tier>,
    max_per_tier: usize,
}

/// Shared buffer pool, cheap to clone
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with the given tier sizes (ascending) and retained buffers per tier
    pub fn new(tier_sizes: &[usize], max_per_tier: usize) -> Self {
        let mut sizes = tier_sizes.to_vec();
        sizes.sort_unstable();
        sizes.dedup();

        let tiers = sizes
            .into_iter()
            .map(|size| Tier {
                size,
                free: Mutex::new(Vec::new()),
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                tiers,
                max_per_tier,
            }),
        }
    }

    pub fn with_default_tiers(max_per_tier: usize) -> Self {
        Self::new(&DEFAULT_TIERS, max_per_tier)
    }

    /// Take a buffer able to hold at least `size_hint` bytes without growing
    /// (hints above the largest tier get the largest tier and grow from there)
    ///
    /// A parked buffer from the hinted tier or any larger one is reused
    /// before a fresh one is allocated, so buffers that grew while filling
    /// are picked up again by later small-hint requests.
    pub fn acquire(&self, size_hint: usize) -> PooledBuffer {
        let tiers = &self.inner.tiers;
        let start = tiers
            .iter()
            .position(|t| t.size >= size_hint)
            .unwrap_or_else(|| tiers.len().saturating_sub(1));

        let parked = tiers
            .iter()
            .skip(start)
            .find_map(|tier| lock(&tier.free).pop());

        let buf = parked.unwrap_or_else(|| match tiers.get(start) {
            Some(tier) => BytesMut::with_capacity(tier.size.max(size_hint)),
            None => BytesMut::with_capacity(size_hint),
        });

        PooledBuffer {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    /// Buffers currently parked in the pool, across all tiers
    pub fn available(&self) -> usize {
        self.inner.tiers.iter().map(|t| lock(&t.free).len()).sum()
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let capacity = buf.capacity();

        // Park in the largest tier the buffer still fills; drop buffers that
        // are below the smallest tier or grew far past the largest one.
        let Some(tier) = self.inner.tiers.iter().rev().find(|t| t.size <= capacity) else {
            return;
        };
        let largest = self.inner.tiers.last().map_or(0, |t| t.size);
        if capacity > largest.saturating_mul(4) {
            return;
        }

        let mut free = lock(&tier.free);
        if free.len() < self.inner.max_per_tier {
            free.push(buf);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A buffer on loan from a `BufferPool`; returned on drop
pub struct PooledBuffer {
    buf: Option<BytesMut>,
    pool: BufferPool,
}

impl PooledBuffer {
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf_mut().extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the filled bytes out as a shared `Bytes` for writing
    ///
    /// Pass the same value back to `reclaim` once the writer is done so the
    /// allocation can return to the pool.
    pub fn share(&mut self) -> Bytes {
        self.buf.take().unwrap_or_default().freeze()
    }

    /// Take back bytes produced by `share`; kept only when no other
    /// reference to them remains
    pub fn reclaim(&mut self, bytes: Bytes) {
        if let Ok(buf) = bytes.try_into_mut() {
            self.buf = Some(buf);
        }
    }

    fn buf_mut(&mut self) -> &mut BytesMut {
        self.buf.get_or_insert_with(BytesMut::new)
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
