use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;
use smallvec::SmallVec;

use crate::{
    allocation::{Allocation, Block},
    allocator::{AllocationRequest, Allocator},
    device::{Device, PhysicalDevice},
    error::AllocationError,
    memory::{MemoryProperties, Properties},
    pool::MemoryPool,
    util::align_size,
    utilization::AllocatorUtilization,
};

/// Config for `DedicatedAllocator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DedicatedConfig {
    /// Properties memory types must have to be managed by the allocator.
    pub required: Properties,

    /// Maximum number of memory objects allocated at once.
    pub max_allocations: u32,
}

impl Default for DedicatedConfig {
    fn default() -> Self {
        DedicatedConfig {
            required: Properties::empty(),
            // Lowest limit implementations are allowed to report.
            max_allocations: 4096,
        }
    }
}

#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
struct State<D: Device> {
    pools: Slab<MemoryPool<D>>,
    utilization: AllocatorUtilization,
}

/// Memory allocator that uses memory object per allocation requested.
///
/// This allocator suites best huge allocations.
/// Memory type for each allocation is the first managed type accepted by the request
/// whose heap can hold it and which isn't exhausted.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub struct DedicatedAllocator<D: Device> {
    #[derivative(Debug = "ignore")]
    this: Weak<Self>,
    #[derivative(Debug = "ignore")]
    device: Arc<D>,
    memory_properties: MemoryProperties,
    memory_types: Vec<u32>,
    config: DedicatedConfig,
    state: Mutex<State<D>>,
}

impl<D> DedicatedAllocator<D>
where
    D: Device,
{
    /// Create allocator managing memory types of `physical_device` that have `config.required` properties.
    pub fn new(
        device: Arc<D>,
        physical_device: &impl PhysicalDevice,
        config: DedicatedConfig,
    ) -> Arc<Self> {
        let memory_properties = physical_device.memory_properties().clone();
        let memory_types = memory_properties
            .types_with(config.required)
            .filter(|&index| index < 32)
            .collect::<Vec<_>>();

        log::trace!(
            "Dedicated allocator for memory types {:?} with {:?}",
            memory_types,
            config
        );

        Arc::new_cyclic(|this| DedicatedAllocator {
            this: this.clone(),
            device,
            memory_properties,
            memory_types,
            config,
            state: Mutex::new(State {
                pools: Slab::new(),
                utilization: AllocatorUtilization::default(),
            }),
        })
    }

    /// Get indices of managed memory types.
    pub fn memory_types(&self) -> &[u32] {
        &self.memory_types
    }

    /// Get allocator config.
    pub fn config(&self) -> &DedicatedConfig {
        &self.config
    }

    /// Get device memory is allocated from.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Size of memory object for `size` bytes of memory type `index`.
    fn object_size(&self, index: u32, size: u64) -> u64 {
        // Zero sized memory objects are not allowed.
        let size = size.max(1);
        match self.memory_properties.memory_type(index) {
            Some(mt) if mt.properties.non_coherent_visible() => {
                align_size(size, self.memory_properties.non_coherent_atom_size)
            }
            _ => size,
        }
    }
}

impl<D> Allocator<D> for DedicatedAllocator<D>
where
    D: Device,
{
    fn allocate(&self, request: &AllocationRequest<D>) -> Result<Allocation<D>, AllocationError> {
        request.validate();

        if !request.accepts_device(&self.device) {
            return Err(AllocationError::MemoryTypeUnavailable);
        }

        let fitting = {
            let candidates = self
                .memory_types
                .iter()
                .cloned()
                .filter(|&index| request.accepts(index))
                .collect::<SmallVec<[_; 32]>>();

            if candidates.is_empty() {
                return Err(AllocationError::MemoryTypeUnavailable);
            }

            candidates
                .into_iter()
                .map(|index| (index, self.object_size(index, request.size)))
                .filter(|&(index, size)| {
                    self.memory_properties
                        .heap_size(index)
                        .map_or(false, |heap_size| size <= heap_size)
                })
                .collect::<SmallVec<[_; 32]>>()
        };

        if fitting.is_empty() {
            return Err(AllocationError::RequestTooLarge);
        }

        let mut state = self.state.lock();
        if state.pools.len() >= self.config.max_allocations as usize {
            log::debug!(
                "Memory object limit {} reached",
                self.config.max_allocations
            );
            return Err(AllocationError::OutOfMemory);
        }

        for (index, size) in fitting {
            match MemoryPool::allocate(&self.device, &self.memory_properties, index, size) {
                Ok(pool) => {
                    let allocator: Weak<dyn Allocator<D>> = self.this.clone();
                    let entry = state.pools.vacant_entry();
                    let allocation =
                        pool.allocate_tagged_view(allocator, 0, request.size, entry.key());
                    entry.insert(pool);
                    state.utilization.allocated(request.size);
                    state.utilization.effective += size;
                    return Ok(allocation);
                }
                Err(AllocationError::OutOfMemory) => {
                    log::trace!("Memory type {} exhausted, trying next", index);
                }
                Err(error) => return Err(error),
            }
        }

        Err(AllocationError::OutOfMemory)
    }

    fn free(&self, block: Block<D>) {
        let mut state = self.state.lock();
        let key = block.tag();

        let owned = state
            .pools
            .get(key)
            .map_or(false, |pool| block.is_from(pool));

        if owned {
            let pool = state.pools.remove(key);
            state.utilization.freed(block.size());
            state.utilization.effective -= pool.size();
            drop(state);
            log::trace!("Free dedicated memory {:?}", pool.memory());
            drop(pool);
        } else {
            log::error!("{:?} wasn't allocated by this allocator", block);
        }

        block.dispose();
    }

    fn utilization(&self) -> AllocatorUtilization {
        self.state.lock().utilization
    }
}
