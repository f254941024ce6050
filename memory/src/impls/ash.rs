//! Adapter for ash.

use std::{ops::Range, ptr::NonNull};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    device::Device,
    error::DeviceError,
    memory::{MemoryProperties, MemoryType, Properties},
};

impl From<vk::Result> for DeviceError {
    fn from(result: vk::Result) -> DeviceError {
        match result {
            vk::Result::SUCCESS => panic!("Unexpected success"),
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => DeviceError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => DeviceError::OutOfDeviceMemory,
            vk::Result::ERROR_TOO_MANY_OBJECTS => DeviceError::TooManyObjects,
            vk::Result::ERROR_MEMORY_MAP_FAILED => DeviceError::MemoryMapFailed,
            vk::Result::ERROR_DEVICE_LOST => DeviceError::DeviceLost,
            other => DeviceError::Unknown(other.as_raw()),
        }
    }
}

impl From<vk::MemoryPropertyFlags> for Properties {
    fn from(flags: vk::MemoryPropertyFlags) -> Self {
        Properties::from_bits_truncate(flags.as_raw())
    }
}

impl MemoryProperties {
    /// Query memory layout of `physical_device`.
    ///
    /// # Safety
    ///
    /// `physical_device` must be enumerated from `instance`.
    pub unsafe fn from_ash(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_memory_properties(physical_device);
        let limits = instance.get_physical_device_properties(physical_device).limits;

        MemoryProperties {
            memory_types: properties.memory_types[..properties.memory_type_count as usize]
                .iter()
                .map(|mt| MemoryType {
                    properties: mt.property_flags.into(),
                    heap_index: mt.heap_index,
                })
                .collect(),
            memory_heaps: properties.memory_heaps[..properties.memory_heap_count as usize]
                .iter()
                .map(|heap| heap.size)
                .collect(),
            non_coherent_atom_size: limits.non_coherent_atom_size,
        }
    }
}

fn mapped_ranges<'a>(
    regions: impl IntoIterator<Item = (&'a vk::DeviceMemory, Range<u64>)>,
) -> SmallVec<[vk::MappedMemoryRange; 4]> {
    regions
        .into_iter()
        .map(|(memory, range)| {
            vk::MappedMemoryRange::builder()
                .memory(*memory)
                .offset(range.start)
                .size(range.end - range.start)
                .build()
        })
        .collect()
}

impl Device for ash::Device {
    type Memory = vk::DeviceMemory;

    unsafe fn allocate(&self, index: u32, size: u64) -> Result<vk::DeviceMemory, DeviceError> {
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(index);
        Ok(self.allocate_memory(&info, None)?)
    }

    unsafe fn free(&self, memory: vk::DeviceMemory) {
        self.free_memory(memory, None);
    }

    unsafe fn map(
        &self,
        memory: &vk::DeviceMemory,
        range: Range<u64>,
    ) -> Result<NonNull<u8>, DeviceError> {
        let ptr = self.map_memory(
            *memory,
            range.start,
            range.end - range.start,
            vk::MemoryMapFlags::empty(),
        )?;
        NonNull::new(ptr as *mut u8).ok_or(DeviceError::MemoryMapFailed)
    }

    unsafe fn unmap(&self, memory: &vk::DeviceMemory) {
        self.unmap_memory(*memory);
    }

    unsafe fn flush<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a vk::DeviceMemory, Range<u64>)>,
    ) -> Result<(), DeviceError> {
        let ranges = mapped_ranges(regions);
        if !ranges.is_empty() {
            self.flush_mapped_memory_ranges(&ranges)?;
        }
        Ok(())
    }

    unsafe fn invalidate<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a vk::DeviceMemory, Range<u64>)>,
    ) -> Result<(), DeviceError> {
        let ranges = mapped_ranges(regions);
        if !ranges.is_empty() {
            self.invalidate_mapped_memory_ranges(&ranges)?;
        }
        Ok(())
    }
}
