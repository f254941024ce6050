use std::{fmt::Debug, hash::Hash, ops::Range, ptr::NonNull};

use crate::{error::DeviceError, memory::MemoryProperties};

/// Trait for native memory allocation and mapping.
pub trait Device: Send + Sync + 'static {
    /// Native memory object handle.
    type Memory: Copy + Debug + Eq + Hash + Send + Sync + 'static;

    /// Allocate memory object.
    ///
    /// # Parameters
    /// `index` - memory type index.
    /// `size`  - size of the memory object to allocate.
    ///
    /// # Safety
    ///
    /// `index` must be valid memory type index for the device.
    unsafe fn allocate(&self, index: u32, size: u64) -> Result<Self::Memory, DeviceError>;

    /// Free memory object.
    ///
    /// # Safety
    ///
    /// `memory` must be allocated from this device and must not be used afterwards.
    unsafe fn free(&self, memory: Self::Memory);

    /// Map memory range.
    /// Only one range for the given memory object can be mapped.
    ///
    /// # Safety
    ///
    /// Memory must be host visible and not mapped.
    unsafe fn map(&self, memory: &Self::Memory, range: Range<u64>)
        -> Result<NonNull<u8>, DeviceError>;

    /// Unmap memory.
    ///
    /// # Safety
    ///
    /// Memory must be mapped. Pointers to the mapping become dangling.
    unsafe fn unmap(&self, memory: &Self::Memory);

    /// Flush mapped regions guaranteeing that host writes to the memory can be made available to device access.
    ///
    /// # Safety
    ///
    /// Regions must be mapped and aligned to the non-coherent atom size or end at the memory object size.
    unsafe fn flush<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a Self::Memory, Range<u64>)>,
    ) -> Result<(), DeviceError>;

    /// Invalidate mapped regions guaranteeing that device writes to the memory,
    /// which have been made visible to the host-write and host-read access types, are made visible to the host.
    ///
    /// # Safety
    ///
    /// Same as for `flush`.
    unsafe fn invalidate<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a Self::Memory, Range<u64>)>,
    ) -> Result<(), DeviceError>;
}

/// Source of per memory type properties.
pub trait PhysicalDevice {
    /// Get memory layout of the physical device.
    fn memory_properties(&self) -> &MemoryProperties;
}

impl PhysicalDevice for MemoryProperties {
    fn memory_properties(&self) -> &MemoryProperties {
        self
    }
}

impl<P> PhysicalDevice for &P
where
    P: PhysicalDevice + ?Sized,
{
    fn memory_properties(&self) -> &MemoryProperties {
        (**self).memory_properties()
    }
}
