mod pool;

use std::{
    collections::{HashMap, VecDeque},
    ops::Range,
    ptr::NonNull,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
    allocation::{Allocation, Block},
    allocator::{AllocationRequest, Allocator},
    device::Device,
    error::{AllocationError, DeviceError},
    memory::{MemoryProperties, MemoryType, Properties},
    utilization::AllocatorUtilization,
};

pub(crate) const DEVICE_LOCAL: u32 = 0;
pub(crate) const COHERENT: u32 = 1;
pub(crate) const NON_COHERENT: u32 = 2;
pub(crate) const LOCAL_NON_COHERENT: u32 = 3;

pub(crate) const ATOM: u64 = 64;

pub(crate) fn memory_properties() -> MemoryProperties {
    MemoryProperties {
        memory_types: vec![
            MemoryType {
                properties: Properties::DEVICE_LOCAL,
                heap_index: 0,
            },
            MemoryType {
                properties: Properties::HOST_VISIBLE | Properties::HOST_COHERENT,
                heap_index: 1,
            },
            MemoryType {
                properties: Properties::HOST_VISIBLE | Properties::HOST_CACHED,
                heap_index: 1,
            },
            MemoryType {
                properties: Properties::DEVICE_LOCAL | Properties::HOST_VISIBLE,
                heap_index: 2,
            },
        ],
        memory_heaps: vec![1024 * 1024, 64 * 1024, 4 * 1024],
        non_coherent_atom_size: ATOM,
    }
}

#[derive(Debug, Default)]
struct Inner {
    next: u64,
    live: HashMap<u64, Box<[u8]>>,
    allocated: Vec<(u32, u64)>,
    freed: Vec<u64>,
    maps: Vec<u64>,
    unmaps: Vec<u64>,
    flushes: Vec<(u64, Range<u64>)>,
    invalidations: Vec<(u64, Range<u64>)>,
    failures: VecDeque<DeviceError>,
}

/// Device backed by host memory that records every native call.
#[derive(Debug, Default)]
pub(crate) struct MockDevice(Mutex<Inner>);

impl MockDevice {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(MockDevice::default())
    }

    /// Make next allocation fail with `error`.
    pub(crate) fn fail_next(&self, error: DeviceError) {
        self.0.lock().failures.push_back(error);
    }

    pub(crate) fn allocated(&self) -> Vec<(u32, u64)> {
        self.0.lock().allocated.clone()
    }

    pub(crate) fn freed(&self) -> Vec<u64> {
        self.0.lock().freed.clone()
    }

    pub(crate) fn maps(&self) -> Vec<u64> {
        self.0.lock().maps.clone()
    }

    pub(crate) fn unmaps(&self) -> Vec<u64> {
        self.0.lock().unmaps.clone()
    }

    pub(crate) fn flushes(&self) -> Vec<(u64, Range<u64>)> {
        self.0.lock().flushes.clone()
    }

    pub(crate) fn invalidations(&self) -> Vec<(u64, Range<u64>)> {
        self.0.lock().invalidations.clone()
    }

    pub(crate) fn live(&self) -> usize {
        self.0.lock().live.len()
    }

    /// Bytes of live memory object.
    pub(crate) fn contents(&self, memory: u64) -> Vec<u8> {
        self.0.lock().live[&memory].to_vec()
    }

    /// Emulate device write to live memory object.
    pub(crate) fn device_write(&self, memory: u64, offset: usize, bytes: &[u8]) {
        let mut inner = self.0.lock();
        let contents = inner.live.get_mut(&memory).expect("Write to freed memory");
        contents[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl Device for MockDevice {
    type Memory = u64;

    unsafe fn allocate(&self, index: u32, size: u64) -> Result<u64, DeviceError> {
        let mut inner = self.0.lock();
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }
        inner.next += 1;
        let id = inner.next;
        inner
            .live
            .insert(id, vec![0u8; size as usize].into_boxed_slice());
        inner.allocated.push((index, size));
        Ok(id)
    }

    unsafe fn free(&self, memory: u64) {
        let mut inner = self.0.lock();
        assert!(inner.live.remove(&memory).is_some(), "Double-free");
        inner.freed.push(memory);
    }

    unsafe fn map(&self, memory: &u64, range: Range<u64>) -> Result<NonNull<u8>, DeviceError> {
        let mut inner = self.0.lock();
        inner.maps.push(*memory);
        let contents = inner.live.get_mut(memory).expect("Map of freed memory");
        assert!(range.end as usize <= contents.len());
        Ok(NonNull::new(contents.as_mut_ptr().add(range.start as usize))
            .expect("Boxed slice pointer is never null"))
    }

    unsafe fn unmap(&self, memory: &u64) {
        self.0.lock().unmaps.push(*memory);
    }

    unsafe fn flush<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a u64, Range<u64>)>,
    ) -> Result<(), DeviceError> {
        let mut inner = self.0.lock();
        for (memory, range) in regions {
            inner.flushes.push((*memory, range));
        }
        Ok(())
    }

    unsafe fn invalidate<'a>(
        &self,
        regions: impl IntoIterator<Item = (&'a u64, Range<u64>)>,
    ) -> Result<(), DeviceError> {
        let mut inner = self.0.lock();
        for (memory, range) in regions {
            inner.invalidations.push((*memory, range));
        }
        Ok(())
    }
}

/// Allocator that only records returned claims.
/// Used as the owner of views created directly through `MemoryPool::allocate_view`.
#[derive(Debug, Default)]
pub(crate) struct RecordingAllocator {
    freed: Mutex<Vec<(u64, u64)>>,
}

impl RecordingAllocator {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(RecordingAllocator::default())
    }

    pub(crate) fn weak(this: &Arc<Self>) -> Weak<dyn Allocator<MockDevice>> {
        Arc::downgrade(this) as Weak<dyn Allocator<MockDevice>>
    }

    /// `(offset, size)` of every returned claim.
    pub(crate) fn freed(&self) -> Vec<(u64, u64)> {
        self.freed.lock().clone()
    }
}

impl Allocator<MockDevice> for RecordingAllocator {
    fn allocate(
        &self,
        _request: &AllocationRequest<MockDevice>,
    ) -> Result<Allocation<MockDevice>, AllocationError> {
        Err(AllocationError::MemoryTypeUnavailable)
    }

    fn free(&self, block: Block<MockDevice>) {
        self.freed.lock().push((block.offset(), block.size()));
        block.dispose();
    }

    fn utilization(&self) -> AllocatorUtilization {
        AllocatorUtilization {
            frees: self.freed.lock().len() as u64,
            ..AllocatorUtilization::default()
        }
    }
}
