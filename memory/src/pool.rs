use std::{
    iter::once,
    ops::Range,
    ptr::{copy_nonoverlapping, NonNull},
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    allocation::Allocation,
    allocator::Allocator,
    backref::BackRef,
    device::{Device, PhysicalDevice},
    error::AllocationError,
    memory::Properties,
    util::{fits, to_usize},
};

/// Host address of mapped memory.
#[derive(Clone, Copy, Debug)]
struct Mapping(NonNull<u8>);

// Mapping stays valid until the memory object is freed, which requires unique access.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

/// Part of the pool allocations can observe.
/// Dropping it releases the native memory object.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct PoolShared<D: Device> {
    #[derivative(Debug = "ignore")]
    device: Arc<D>,
    raw: D::Memory,
    memory_type: u32,
    properties: Properties,
    non_coherent_atom_size: u64,
    size: u64,
    mapping: Mutex<Option<Mapping>>,
}

impl<D> PoolShared<D>
where
    D: Device,
{
    pub(crate) fn raw(&self) -> D::Memory {
        self.raw
    }

    pub(crate) fn memory_type(&self) -> u32 {
        self.memory_type
    }

    pub(crate) fn properties(&self) -> Properties {
        self.properties
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn non_coherent_atom_size(&self) -> u64 {
        self.non_coherent_atom_size
    }

    pub(crate) fn mapped(&self) -> NonNull<u8> {
        let mut mapping = self.mapping.lock();
        if let Some(Mapping(ptr)) = *mapping {
            return ptr;
        }

        assert!(
            self.properties.host_visible(),
            "Memory {:?} of type {} is not HOST_VISIBLE and can't be mapped",
            self.raw,
            self.memory_type,
        );

        let ptr = match unsafe { self.device.map(&self.raw, 0..self.size) } {
            Ok(ptr) => ptr,
            Err(error) => panic!("Failed to map memory {:?}: {}", self.raw, error),
        };
        log::trace!("Mapped memory {:?} to {:p}", self.raw, ptr);
        *mapping = Some(Mapping(ptr));
        ptr
    }

    /// Publish host writes in `range`.
    /// `range` must be atom aligned or end at the pool size.
    pub(crate) fn flush_range(&self, range: Range<u64>) {
        if !self.needs_sync(&range) {
            return;
        }
        log::trace!(
            "Flush memory {:?} @ {} .. {}",
            self.raw,
            range.start,
            range.end
        );
        if let Err(error) = unsafe { self.device.flush(once((&self.raw, range))) } {
            panic!("Failed to flush memory {:?}: {}", self.raw, error);
        }
    }

    /// Make device writes in `range` visible to the host.
    /// `range` must be atom aligned or end at the pool size.
    pub(crate) fn invalidate_range(&self, range: Range<u64>) {
        if !self.needs_sync(&range) {
            return;
        }
        log::trace!(
            "Invalidate memory {:?} @ {} .. {}",
            self.raw,
            range.start,
            range.end
        );
        if let Err(error) = unsafe { self.device.invalidate(once((&self.raw, range))) } {
            panic!("Failed to invalidate memory {:?}: {}", self.raw, error);
        }
    }

    /// Only non-empty ranges of mapped non-coherent memory have anything to flush or invalidate.
    fn needs_sync(&self, range: &Range<u64>) -> bool {
        range.start < range.end
            && self.properties.non_coherent_visible()
            && self.mapping.lock().is_some()
    }

    /// Copy `bytes` to `offset` without flushing.
    pub(crate) fn write_at(&self, offset: u64, bytes: &[u8]) {
        debug_assert!(fits(offset, bytes.len() as u64, self.size));
        let ptr = self.mapped();
        unsafe {
            copy_nonoverlapping(
                bytes.as_ptr(),
                ptr.as_ptr().add(to_usize(offset)),
                bytes.len(),
            );
        }
    }

    /// Copy bytes at `offset` to `dst` without invalidating.
    pub(crate) fn read_at(&self, offset: u64, dst: &mut [u8]) {
        debug_assert!(fits(offset, dst.len() as u64, self.size));
        let ptr = self.mapped();
        unsafe {
            copy_nonoverlapping(
                ptr.as_ptr().add(to_usize(offset)),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
    }
}

impl<D> Drop for PoolShared<D>
where
    D: Device,
{
    fn drop(&mut self) {
        unsafe {
            if self.mapping.get_mut().take().is_some() {
                log::trace!("Unmap memory {:?}", self.raw);
                self.device.unmap(&self.raw);
            }
            log::trace!("Free memory {:?} ({} bytes)", self.raw, self.size);
            self.device.free(self.raw);
        }
    }
}

/// Contiguous block of device memory obtained by single native allocation.
///
/// Pool is the only owner of the native memory object.
/// `Allocation`s viewing the pool observe it through liveness-checked references
/// and panic if used after the pool is dropped.
#[derive(derivative::Derivative)]
#[derivative(Debug(bound = ""))]
pub struct MemoryPool<D: Device> {
    shared: Arc<PoolShared<D>>,
}

impl<D> MemoryPool<D>
where
    D: Device,
{
    /// Allocate `size` bytes of memory type `memory_type`.
    ///
    /// Exhaustion of either host or device memory is reported as `AllocationError::OutOfMemory`.
    ///
    /// # Panics
    ///
    /// Panics if `memory_type` is not a memory type of `physical_device`
    /// or if the device fails with anything but memory exhaustion.
    pub fn allocate(
        device: &Arc<D>,
        physical_device: &impl PhysicalDevice,
        memory_type: u32,
        size: u64,
    ) -> Result<Self, AllocationError> {
        let memory_properties = physical_device.memory_properties();
        let properties = match memory_properties.memory_type(memory_type) {
            Some(mt) => mt.properties,
            None => panic!(
                "Memory type index {} is out of bounds ({} types available)",
                memory_type,
                memory_properties.memory_types.len()
            ),
        };

        let raw = match unsafe { device.allocate(memory_type, size) } {
            Ok(raw) => raw,
            Err(error) if error.is_out_of_memory() => {
                log::debug!(
                    "Allocation of {} bytes of memory type {} failed: {}",
                    size,
                    memory_type,
                    error
                );
                return Err(AllocationError::OutOfMemory);
            }
            Err(error) => panic!(
                "Unexpected failure allocating {} bytes of memory type {}: {}",
                size, memory_type, error
            ),
        };
        log::trace!(
            "Allocated memory {:?}: type {}, {} bytes",
            raw,
            memory_type,
            size
        );

        Ok(unsafe {
            Self::from_raw(
                device.clone(),
                raw,
                memory_type,
                properties,
                memory_properties.non_coherent_atom_size,
                size,
            )
        })
    }

    /// Create pool from raw memory object.
    ///
    /// # Safety
    ///
    /// `raw` must be allocated from `device` with `memory_type`, `properties` and `size`
    /// and must not be owned by anything else. Pool will free it.
    pub unsafe fn from_raw(
        device: Arc<D>,
        raw: D::Memory,
        memory_type: u32,
        properties: Properties,
        non_coherent_atom_size: u64,
        size: u64,
    ) -> Self {
        MemoryPool {
            shared: Arc::new(PoolShared {
                device,
                raw,
                memory_type,
                properties,
                non_coherent_atom_size,
                size,
                mapping: Mutex::new(None),
            }),
        }
    }

    /// Create allocation viewing `offset .. offset + size` range of this pool
    /// that will be returned to `allocator` when released.
    ///
    /// Ranges of allocations are not checked for overlapping.
    ///
    /// # Panics
    ///
    /// Panics if the range doesn't fit in the pool.
    pub fn allocate_view(
        &self,
        allocator: Weak<dyn Allocator<D>>,
        offset: u64,
        size: u64,
    ) -> Allocation<D> {
        self.allocate_tagged_view(allocator, offset, size, 0)
    }

    /// Same as `allocate_view` but the `Block` returned to `allocator` carries `tag`.
    pub fn allocate_tagged_view(
        &self,
        allocator: Weak<dyn Allocator<D>>,
        offset: u64,
        size: u64,
        tag: usize,
    ) -> Allocation<D> {
        assert!(
            fits(offset, size, self.size()),
            "View of {} bytes at {} is out of pool bounds {}",
            size,
            offset,
            self.size()
        );
        log::trace!(
            "View memory {:?} @ {} .. {}",
            self.memory(),
            offset,
            offset + size
        );
        Allocation::new(
            BackRef::new(allocator),
            BackRef::new(Arc::downgrade(&self.shared)),
            offset,
            size,
            tag,
        )
    }

    /// Get device the memory was allocated from.
    pub fn device(&self) -> &Arc<D> {
        &self.shared.device
    }

    /// Get raw memory object.
    pub fn memory(&self) -> D::Memory {
        self.shared.raw
    }

    /// Get memory type index.
    pub fn memory_type(&self) -> u32 {
        self.shared.memory_type
    }

    /// Get memory size.
    pub fn size(&self) -> u64 {
        self.shared.size
    }

    /// Get memory properties.
    pub fn properties(&self) -> Properties {
        self.shared.properties
    }

    /// Get granularity of flush and invalidate ranges.
    pub fn non_coherent_atom_size(&self) -> u64 {
        self.shared.non_coherent_atom_size
    }

    /// Get host address of the pool.
    /// Memory is mapped on the first call and stays mapped until the pool is dropped.
    ///
    /// # Panics
    ///
    /// Panics if memory is not host visible.
    pub fn mapped_address(&self) -> NonNull<u8> {
        self.shared.mapped()
    }

    /// Publish host writes to the whole pool.
    /// Required after writing through `mapped_address` to memory that is not `HOST_COHERENT`.
    pub fn flush(&self) {
        self.shared.flush_range(0..self.size());
    }

    /// Make device writes to the whole pool visible to the host.
    /// Required before reading through `mapped_address` from memory that is not `HOST_COHERENT`.
    pub fn invalidate(&self) {
        self.shared.invalidate_range(0..self.size());
    }

    /// Copy `bytes` to the beginning of the pool, flushing if memory is not `HOST_COHERENT`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` are longer than the pool or memory is not host visible.
    pub fn overwrite(&self, bytes: &[u8]) {
        assert!(
            bytes.len() as u64 <= self.size(),
            "Can't write {} bytes to pool of {} bytes",
            bytes.len(),
            self.size()
        );
        self.shared.write_at(0, bytes);
        self.flush();
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared<D>> {
        &self.shared
    }
}
