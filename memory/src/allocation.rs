use std::{ptr::NonNull, sync::Arc};

use relevant::Relevant;

use crate::{
    allocator::Allocator,
    backref::BackRef,
    device::Device,
    memory::Properties,
    pool::{MemoryPool, PoolShared},
    util::{align_range, to_usize},
};

/// Claim of the memory range returned by released `Allocation` to its allocator.
/// Allocator must `dispose` the block once the range is reclaimed.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Block<D: Device> {
    pool: BackRef<PoolShared<D>>,
    offset: u64,
    size: u64,
    tag: usize,
    #[derivative(Debug = "ignore")]
    relevant: Relevant,
}

impl<D> Block<D>
where
    D: Device,
{
    /// Get offset of the claimed range.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get size of the claimed range.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get tag the allocator created the allocation with.
    pub fn tag(&self) -> usize {
        self.tag
    }

    /// Check if the claimed range belongs to `pool`.
    pub fn is_from(&self, pool: &MemoryPool<D>) -> bool {
        self.pool.points_to(pool.shared())
    }

    /// Dispose of the block after the range is reclaimed.
    pub fn dispose(self) {
        self.relevant.dispose();
    }
}

/// View of `offset .. offset + size` range of a `MemoryPool`.
///
/// Allocation doesn't own memory. It returns its claim to the allocator
/// it was obtained from exactly once, either by `release` or when dropped.
/// If the allocator is already gone the claim is silently dropped,
/// the pool frees the memory object itself.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Allocation<D: Device> {
    allocator: BackRef<dyn Allocator<D>>,
    pool: BackRef<PoolShared<D>>,
    offset: u64,
    size: u64,
    tag: usize,
}

impl<D> Default for Allocation<D>
where
    D: Device,
{
    fn default() -> Self {
        Allocation {
            allocator: BackRef::empty(),
            pool: BackRef::empty(),
            offset: 0,
            size: 0,
            tag: 0,
        }
    }
}

impl<D> Allocation<D>
where
    D: Device,
{
    pub(crate) fn new(
        allocator: BackRef<dyn Allocator<D>>,
        pool: BackRef<PoolShared<D>>,
        offset: u64,
        size: u64,
        tag: usize,
    ) -> Self {
        Allocation {
            allocator,
            pool,
            offset,
            size,
            tag,
        }
    }

    /// Check if allocation holds a claim.
    pub fn is_bound(&self) -> bool {
        debug_assert_eq!(
            self.allocator.is_bound(),
            self.pool.is_bound(),
            "Allocation must reference both allocator and pool or neither"
        );
        self.allocator.is_bound()
    }

    /// Check if allocation holds no claim.
    pub fn is_empty(&self) -> bool {
        !self.is_bound()
    }

    /// Get allocator this allocation returns to, if it is still alive.
    pub fn allocator(&self) -> Option<Arc<dyn Allocator<D>>> {
        self.allocator.upgrade()
    }

    /// Get raw memory object.
    pub fn memory(&self) -> D::Memory {
        self.pool().raw()
    }

    /// Get memory type index.
    pub fn memory_type(&self) -> u32 {
        self.pool().memory_type()
    }

    /// Get offset of the range in the memory object.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get size of the range.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get memory properties.
    pub fn properties(&self) -> Properties {
        self.pool().properties()
    }

    /// Get host address of the range beginning.
    /// Access beyond `size` bytes from it is not allowed.
    ///
    /// # Panics
    ///
    /// Panics if memory is not host visible.
    pub fn mapped_address(&self) -> NonNull<u8> {
        let ptr = self.pool().mapped();
        unsafe {
            // Offset lies within the mapped pool.
            NonNull::new_unchecked(ptr.as_ptr().add(to_usize(self.offset)))
        }
    }

    /// Publish host writes to this range.
    /// No-op for `HOST_COHERENT` memory.
    pub fn flush(&self) {
        let pool = self.pool();
        pool.flush_range(self.sync_range(&pool));
    }

    /// Make device writes to this range visible to the host.
    /// No-op for `HOST_COHERENT` memory.
    pub fn invalidate(&self) {
        let pool = self.pool();
        pool.invalidate_range(self.sync_range(&pool));
    }

    /// Copy `bytes` to the beginning of the range, flushing if memory is not `HOST_COHERENT`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` are longer than the range.
    pub fn overwrite(&self, bytes: &[u8]) {
        assert!(
            bytes.len() as u64 <= self.size,
            "Can't write {} bytes to allocation of {} bytes",
            bytes.len(),
            self.size
        );
        let pool = self.pool();
        pool.write_at(self.offset, bytes);
        pool.flush_range(self.sync_range(&pool));
    }

    /// Copy bytes from the beginning of the range to `dst`, invalidating first if memory is not `HOST_COHERENT`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is longer than the range.
    pub fn read(&self, dst: &mut [u8]) {
        assert!(
            dst.len() as u64 <= self.size,
            "Can't read {} bytes from allocation of {} bytes",
            dst.len(),
            self.size
        );
        let pool = self.pool();
        // Mapping alone doesn't make device writes visible.
        pool.mapped();
        pool.invalidate_range(self.sync_range(&pool));
        pool.read_at(self.offset, dst);
    }

    /// Return the claim to the allocator, leaving this allocation empty.
    /// Does nothing if the allocation is empty.
    pub fn release(&mut self) {
        let allocator = self.allocator.take();
        let pool = self.pool.take();
        debug_assert_eq!(allocator.is_bound(), pool.is_bound());

        if !allocator.is_bound() {
            return;
        }

        let block = Block {
            pool,
            offset: std::mem::replace(&mut self.offset, 0),
            size: std::mem::replace(&mut self.size, 0),
            tag: std::mem::replace(&mut self.tag, 0),
            relevant: Relevant,
        };

        match allocator.upgrade() {
            Some(allocator) => allocator.free(block),
            None => {
                log::trace!("Allocator is gone, dropping claim {:?}", block);
                block.dispose();
            }
        }
    }

    fn pool(&self) -> Arc<PoolShared<D>> {
        self.pool.get("memory pool")
    }

    /// Native flush ranges must be atom aligned unless they end at the memory object end.
    fn sync_range(&self, pool: &PoolShared<D>) -> std::ops::Range<u64> {
        align_range(
            self.offset..self.offset + self.size,
            pool.non_coherent_atom_size(),
            pool.size(),
        )
    }
}

impl<D> Drop for Allocation<D>
where
    D: Device,
{
    fn drop(&mut self) {
        self.release();
    }
}
