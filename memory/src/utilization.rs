use std::fmt;

/// Allocator bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorUtilization {
    /// Number of successful allocations so far.
    pub allocations: u64,

    /// Number of claims returned to the allocator so far.
    pub frees: u64,

    /// Bytes currently claimed by live allocations.
    pub used: u64,

    /// Bytes of device memory currently held by the allocator.
    pub effective: u64,
}

impl AllocatorUtilization {
    /// Number of allocations not returned yet.
    pub fn live(&self) -> u64 {
        self.allocations - self.frees
    }

    pub(crate) fn allocated(&mut self, size: u64) {
        self.allocations += 1;
        self.used += size;
    }

    pub(crate) fn freed(&mut self, size: u64) {
        debug_assert!(self.used >= size && self.frees < self.allocations);
        self.frees += 1;
        self.used -= size;
    }
}

impl fmt::Display for AllocatorUtilization {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KB: u64 = 1024;

        write!(
            fmt,
            "{} live allocations ({} / {}), {} KiB used of {} KiB",
            self.live(),
            self.allocations,
            self.frees,
            self.used / KB,
            self.effective / KB,
        )?;
        if self.effective > 0 {
            write!(fmt, " ({}%)", self.used * 100 / self.effective)?;
        }
        Ok(())
    }
}
