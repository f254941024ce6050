use failure::Fail;

/// Possible cause of allocation failure.
/// Every variant is recoverable: the caller may retry, fall back to another allocator or propagate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Fail)]
pub enum AllocationError {
    /// Host or device memory exhausted.
    /// Exhaustion of host and device memory is not distinguished.
    #[fail(display = "Out of memory")]
    OutOfMemory,

    /// None of the memory types managed by the allocator is acceptable for the request.
    #[fail(display = "No managed memory type is acceptable for the request")]
    MemoryTypeUnavailable,

    /// Acceptable memory exists but it can't hold requested size with requested alignment.
    #[fail(display = "Request exceeds capacity of acceptable memory")]
    RequestTooLarge,
}

/// Result codes a `Device` may report for native memory operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Fail)]
pub enum DeviceError {
    /// Host memory exhausted.
    #[fail(display = "Out of host memory")]
    OutOfHostMemory,

    /// Device memory exhausted.
    #[fail(display = "Out of device memory")]
    OutOfDeviceMemory,

    /// Implementation doesn't allow to create more memory objects.
    #[fail(display = "Can't allocate more memory objects")]
    TooManyObjects,

    /// Host address range for the mapping can't be reserved.
    #[fail(display = "Memory mapping failed")]
    MemoryMapFailed,

    /// Device was lost.
    #[fail(display = "Device lost")]
    DeviceLost,

    /// Any other native result code.
    #[fail(display = "Unexpected native result code {}", _0)]
    Unknown(i32),
}

impl DeviceError {
    /// Check if this is one of the memory exhaustion codes.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            DeviceError::OutOfHostMemory | DeviceError::OutOfDeviceMemory => true,
            _ => false,
        }
    }
}
