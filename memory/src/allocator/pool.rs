use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    allocation::{Allocation, Block},
    allocator::{AllocationRequest, Allocator},
    device::Device,
    error::AllocationError,
    pool::MemoryPool,
    utilization::AllocatorUtilization,
};

#[derive(Debug)]
struct State {
    lent: bool,
    utilization: AllocatorUtilization,
}

/// Allocator that lends its whole `MemoryPool` as single allocation at a time.
///
/// Allocations always start at offset 0 and cover requested size.
/// Dropping the allocator frees the pool, leaving outstanding allocations orphaned.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub struct PoolAllocator<D: Device> {
    #[derivative(Debug = "ignore")]
    this: Weak<Self>,
    pool: MemoryPool<D>,
    state: Mutex<State>,
}

impl<D> PoolAllocator<D>
where
    D: Device,
{
    /// Create allocator lending `pool`.
    pub fn new(pool: MemoryPool<D>) -> Arc<Self> {
        let utilization = AllocatorUtilization {
            effective: pool.size(),
            ..AllocatorUtilization::default()
        };

        Arc::new_cyclic(|this| PoolAllocator {
            this: this.clone(),
            pool,
            state: Mutex::new(State {
                lent: false,
                utilization,
            }),
        })
    }

    /// Get pool lent by this allocator.
    pub fn pool(&self) -> &MemoryPool<D> {
        &self.pool
    }

    /// Check if the pool is currently lent.
    pub fn is_lent(&self) -> bool {
        self.state.lock().lent
    }
}

impl<D> Allocator<D> for PoolAllocator<D>
where
    D: Device,
{
    fn allocate(&self, request: &AllocationRequest<D>) -> Result<Allocation<D>, AllocationError> {
        request.validate();

        if !request.accepts_device(self.pool.device()) || !request.accepts(self.pool.memory_type()) {
            return Err(AllocationError::MemoryTypeUnavailable);
        }

        // Offset 0 satisfies any alignment.
        if request.size > self.pool.size() {
            return Err(AllocationError::RequestTooLarge);
        }

        let mut state = self.state.lock();
        if state.lent {
            log::debug!("Pool {:?} is already lent", self.pool.memory());
            return Err(AllocationError::OutOfMemory);
        }

        state.lent = true;
        state.utilization.allocated(request.size);
        log::trace!("Lend pool {:?} for {} bytes", self.pool.memory(), request.size);

        let allocator: Weak<dyn Allocator<D>> = self.this.clone();
        Ok(self.pool.allocate_view(allocator, 0, request.size))
    }

    fn free(&self, block: Block<D>) {
        if !block.is_from(&self.pool) {
            log::error!("{:?} doesn't belong to {:?}", block, self.pool);
            block.dispose();
            return;
        }

        let mut state = self.state.lock();
        debug_assert!(state.lent, "Pool returned while not lent");
        state.lent = false;
        state.utilization.freed(block.size());
        log::trace!("Pool {:?} returned", self.pool.memory());
        block.dispose();
    }

    fn utilization(&self) -> AllocatorUtilization {
        self.state.lock().utilization
    }
}
