//! Device memory management.
//!
//! A `MemoryPool` owns one native memory object.
//! `Allocator`s lend byte ranges of pools out as `Allocation`s,
//! which hand their claim back to the allocator exactly once when released.

#![forbid(overflowing_literals)]
#![warn(missing_copy_implementations)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![deny(unused_must_use)]
#![warn(path_statements)]
#![warn(trivial_bounds)]
#![warn(type_alias_bounds)]
#![warn(unconditional_recursion)]
#![warn(while_true)]
#![warn(unused)]
#![warn(bad_style)]
#![warn(future_incompatible)]
#![warn(rust_2018_compatibility)]
#![warn(rust_2018_idioms)]

mod allocation;
mod allocator;
mod backref;
mod device;
mod error;
mod impls;
mod memory;
mod pool;
mod util;
mod utilization;

#[cfg(test)]
mod test;

pub use crate::{
    allocation::{Allocation, Block},
    allocator::{
        AllocationRequest, Allocator, DedicatedAllocator, DedicatedConfig, MemoryRequirements,
        PoolAllocator,
    },
    device::{Device, PhysicalDevice},
    error::{AllocationError, DeviceError},
    memory::{MemoryProperties, MemoryType, Properties},
    pool::MemoryPool,
    utilization::AllocatorUtilization,
};
