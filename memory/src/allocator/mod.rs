//! This module provides `Allocator` trait and allocators that implement the trait.

mod dedicated;
mod pool;

use std::sync::{Arc, Weak};

use crate::{
    allocation::{Allocation, Block},
    device::Device,
    error::AllocationError,
    utilization::AllocatorUtilization,
};

pub use self::{
    dedicated::{DedicatedAllocator, DedicatedConfig},
    pool::PoolAllocator,
};

/// Memory requirements of a resource as reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRequirements {
    /// Size in bytes.
    pub size: u64,

    /// Alignment in bytes. Power of two.
    pub alignment: u64,

    /// Bit `i` is set if memory type `i` is acceptable for the resource.
    pub type_mask: u32,
}

/// Parameters of a single allocation.
#[derive(derivative::Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct AllocationRequest<D: Device> {
    /// Size in bytes.
    pub size: u64,

    /// Alignment of the offset in bytes. Power of two.
    pub alignment: u64,

    /// Bit `i` is set if memory type `i` is acceptable.
    pub memory_type_mask: u32,

    /// Device the memory must come from. Any device if `None`.
    #[derivative(Debug = "ignore")]
    pub device: Option<Weak<D>>,
}

impl<D> AllocationRequest<D>
where
    D: Device,
{
    /// Request `size` bytes aligned to `alignment` of any memory type.
    pub fn new(size: u64, alignment: u64) -> Self {
        AllocationRequest {
            size,
            alignment,
            memory_type_mask: !0,
            device: None,
        }
    }

    /// Restrict acceptable memory types.
    pub fn with_mask(mut self, memory_type_mask: u32) -> Self {
        self.memory_type_mask = memory_type_mask;
        self
    }

    /// Require memory of particular device.
    pub fn for_device(mut self, device: &Arc<D>) -> Self {
        self.device = Some(Arc::downgrade(device));
        self
    }

    /// Check if memory type with `index` is acceptable.
    pub fn accepts(&self, index: u32) -> bool {
        index < 32 && self.memory_type_mask & (1 << index) != 0
    }

    /// Check if memory from `device` is acceptable.
    pub fn accepts_device(&self, device: &Arc<D>) -> bool {
        match &self.device {
            None => true,
            Some(weak) => weak.as_ptr() == Arc::as_ptr(device),
        }
    }

    /// # Panics
    ///
    /// Panics if alignment is not power of two.
    pub(crate) fn validate(&self) {
        assert!(
            self.alignment.is_power_of_two(),
            "Alignment {} is not power of two",
            self.alignment
        );
    }
}

impl<D> From<MemoryRequirements> for AllocationRequest<D>
where
    D: Device,
{
    fn from(requirements: MemoryRequirements) -> Self {
        AllocationRequest::new(requirements.size, requirements.alignment)
            .with_mask(requirements.type_mask)
    }
}

/// Allocation strategy.
///
/// Allocators are shared through `Arc` and allocations hold weak references to them,
/// so an allocator never tracks its allocations.
/// Allocation and freeing are not required to run concurrently,
/// implementations guard their bookkeeping with locks anyway.
pub trait Allocator<D: Device>: Send + Sync {
    /// Allocate memory range satisfying the request.
    ///
    /// Returns `MemoryTypeUnavailable` if none of managed memory types is acceptable,
    /// `RequestTooLarge` if acceptable memory can't hold the request
    /// and `OutOfMemory` if memory is exhausted.
    /// Failure leaves the allocator unchanged.
    fn allocate(&self, request: &AllocationRequest<D>) -> Result<Allocation<D>, AllocationError>;

    /// Reclaim the range of released allocation.
    /// Called by `Allocation` exactly once. Must not fail.
    fn free(&self, block: Block<D>);

    /// Get allocator bookkeeping.
    fn utilization(&self) -> AllocatorUtilization;
}
