use bitflags::bitflags;

bitflags! {
    /// Memory property flags.
    /// Bit values match the native ones so conversion is a plain cast.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Properties: u32 {
        /// Device local memory on a discrete GPU.
        /// Fastest for device access.
        const DEVICE_LOCAL = 0x01;

        /// Memory can be mapped into host address space.
        const HOST_VISIBLE = 0x02;

        /// Host writes become visible to the device without explicit flush,
        /// device writes become visible to the host without explicit invalidation.
        const HOST_COHERENT = 0x04;

        /// Host reads of this memory are cached.
        const HOST_CACHED = 0x08;

        /// Memory may be committed by the implementation lazily.
        /// Never host visible.
        const LAZILY_ALLOCATED = 0x10;

        /// Memory is only accessible by the device and protected queue operations.
        const PROTECTED = 0x20;
    }
}

impl Properties {
    /// Check if memory with these properties can be mapped.
    pub fn host_visible(&self) -> bool {
        self.contains(Properties::HOST_VISIBLE)
    }

    /// Check if memory with these properties doesn't require flushing or invalidating.
    pub fn host_coherent(&self) -> bool {
        self.contains(Properties::HOST_COHERENT)
    }

    /// Check if memory with these properties can be mapped but requires
    /// explicit flushes and invalidations.
    pub fn non_coherent_visible(&self) -> bool {
        *self & (Properties::HOST_VISIBLE | Properties::HOST_COHERENT) == Properties::HOST_VISIBLE
    }
}

/// Memory type as reported by the physical device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryType {
    /// Properties of the memory type.
    pub properties: Properties,

    /// Index of the heap this memory type allocates from.
    pub heap_index: u32,
}

/// Memory layout of a physical device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryProperties {
    /// Memory types in index order.
    pub memory_types: Vec<MemoryType>,

    /// Sizes of memory heaps in bytes in index order.
    pub memory_heaps: Vec<u64>,

    /// Granularity of ranges passed to flush and invalidate operations.
    pub non_coherent_atom_size: u64,
}

impl MemoryProperties {
    /// Get memory type by index.
    pub fn memory_type(&self, index: u32) -> Option<&MemoryType> {
        self.memory_types.get(index as usize)
    }

    /// Get size of the heap memory type with `index` allocates from.
    pub fn heap_size(&self, index: u32) -> Option<u64> {
        let memory_type = self.memory_type(index)?;
        self.memory_heaps
            .get(memory_type.heap_index as usize)
            .cloned()
    }

    /// Iterate over indices of memory types that have all of `required` properties.
    pub fn types_with(&self, required: Properties) -> impl Iterator<Item = u32> + '_ {
        self.memory_types
            .iter()
            .enumerate()
            .filter(move |(_, mt)| mt.properties.contains(required))
            .map(|(index, _)| index as u32)
    }
}
