use super::*;

use crate::pool::MemoryPool;

fn pool(device: &Arc<MockDevice>, memory_type: u32, size: u64) -> MemoryPool<MockDevice> {
    MemoryPool::allocate(device, &memory_properties(), memory_type, size)
        .expect("Mock device doesn't run out of memory unless asked to")
}

#[test]
fn allocate_records_type_and_properties() {
    let device = MockDevice::new();
    let pool = pool(&device, NON_COHERENT, 256);

    assert_eq!(pool.memory_type(), NON_COHERENT);
    assert_eq!(pool.size(), 256);
    assert_eq!(
        pool.properties(),
        Properties::HOST_VISIBLE | Properties::HOST_CACHED
    );
    assert_eq!(pool.non_coherent_atom_size(), ATOM);
    assert!(Arc::ptr_eq(pool.device(), &device));
    assert_eq!(device.allocated(), vec![(NON_COHERENT, 256)]);
}

#[test]
fn native_exhaustion_is_out_of_memory() {
    let device = MockDevice::new();
    let properties = memory_properties();

    for &error in &[DeviceError::OutOfHostMemory, DeviceError::OutOfDeviceMemory] {
        device.fail_next(error);
        let result = MemoryPool::allocate(&device, &properties, DEVICE_LOCAL, 1024);
        assert_eq!(result.err(), Some(AllocationError::OutOfMemory));
    }
    assert_eq!(device.live(), 0);
}

#[test]
#[should_panic(expected = "Unexpected failure")]
fn unexpected_native_failure_panics() {
    let device = MockDevice::new();
    device.fail_next(DeviceError::DeviceLost);
    let _ = MemoryPool::allocate(&device, &memory_properties(), DEVICE_LOCAL, 1024);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn unknown_memory_type_panics() {
    let device = MockDevice::new();
    let _ = MemoryPool::allocate(&device, &memory_properties(), 17, 1024);
}

#[test]
fn mapping_is_idempotent() {
    let device = MockDevice::new();
    let pool = pool(&device, COHERENT, 128);

    let first = pool.mapped_address();
    let second = pool.mapped_address();
    assert_eq!(first, second);
    assert_eq!(device.maps(), vec![pool.memory()]);
}

#[test]
#[should_panic(expected = "not HOST_VISIBLE")]
fn mapping_device_local_memory_panics() {
    let device = MockDevice::new();
    let pool = pool(&device, DEVICE_LOCAL, 128);
    pool.mapped_address();
}

#[test]
fn coherent_overwrite_never_flushes() {
    let device = MockDevice::new();
    let pool = pool(&device, COHERENT, 16);

    pool.overwrite(&[7; 16]);
    pool.flush();

    assert!(device.flushes().is_empty());
    assert_eq!(device.contents(pool.memory()), vec![7; 16]);
}

#[test]
fn non_coherent_overwrite_flushes_whole_pool() {
    let device = MockDevice::new();
    let pool = pool(&device, NON_COHERENT, 100);

    pool.overwrite(&[1, 2, 3]);

    assert_eq!(device.flushes(), vec![(pool.memory(), 0..100)]);
    assert_eq!(&device.contents(pool.memory())[..4], &[1, 2, 3, 0]);
}

#[test]
#[should_panic(expected = "Can't write 17 bytes")]
fn overwrite_longer_than_pool_panics() {
    let device = MockDevice::new();
    let pool = pool(&device, COHERENT, 16);
    pool.overwrite(&[0; 17]);
}

#[test]
fn flush_of_unmapped_pool_is_noop() {
    let device = MockDevice::new();
    let pool = pool(&device, NON_COHERENT, 64);

    pool.flush();
    pool.invalidate();

    assert!(device.maps().is_empty());
    assert!(device.flushes().is_empty());
    assert!(device.invalidations().is_empty());
}

#[test]
fn invalidate_exposes_device_writes() {
    let device = MockDevice::new();
    let pool = pool(&device, NON_COHERENT, 64);
    let ptr = pool.mapped_address();

    device.device_write(pool.memory(), 0, &[9, 9]);
    pool.invalidate();

    assert_eq!(device.invalidations(), vec![(pool.memory(), 0..64)]);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 2) };
    assert_eq!(bytes, &[9, 9]);
}

#[test]
fn drop_unmaps_and_frees_once() {
    let device = MockDevice::new();
    let pool = pool(&device, COHERENT, 64);
    let memory = pool.memory();
    pool.mapped_address();

    drop(pool);

    assert_eq!(device.unmaps(), vec![memory]);
    assert_eq!(device.freed(), vec![memory]);
}

#[test]
fn moved_pool_is_freed_once() {
    let device = MockDevice::new();
    let pool = pool(&device, DEVICE_LOCAL, 64);
    let memory = pool.memory();

    let boxed = Box::new(pool);
    let mut pools = vec![*boxed];
    let pool = pools.pop();
    assert!(device.freed().is_empty());

    drop(pool);
    assert_eq!(device.freed(), vec![memory]);
    assert!(device.unmaps().is_empty());
}

#[test]
#[should_panic(expected = "out of pool bounds")]
fn view_out_of_bounds_panics() {
    let device = MockDevice::new();
    let pool = pool(&device, COHERENT, 64);
    let allocator = RecordingAllocator::new();
    let _view = pool.allocate_view(RecordingAllocator::weak(&allocator), 48, 17);
}
