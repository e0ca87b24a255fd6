//! jemalloc-backed allocator telemetry.
//!
//! Reads `stats.allocated` and `stats.resident` through `mallctl`. The
//! stats epoch is advanced before each read so the numbers are fresh
//! rather than cached from the previous refresh.

use std::ffi::CStr;
use std::mem::size_of;

use tailstat_core::mem::{AllocSnapshot, MemoryProbe};
use tikv_jemalloc_sys::mallctl;

/// Memory probe reading the process-wide jemalloc statistics.
#[derive(Debug, Default)]
pub struct JemallocProbe;

impl MemoryProbe for JemallocProbe {
    fn snapshot(&self) -> Option<AllocSnapshot> {
        advance_epoch();
        let allocated = read_stat(c"stats.allocated")?;
        let resident = read_stat(c"stats.resident")?;
        Some(AllocSnapshot {
            allocated_bytes: allocated as u64,
            resident_bytes: resident as u64,
        })
    }
}

/// Refreshes jemalloc's cached statistics.
fn advance_epoch() {
    let mut epoch: u64 = 1;
    // SAFETY: "epoch" is a writable u64 mallctl; the pointer and length
    // describe a valid u64.
    unsafe {
        mallctl(
            c"epoch".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            (&mut epoch as *mut u64).cast(),
            size_of::<u64>(),
        );
    }
}

/// Reads a `size_t` statistic; `None` if jemalloc refuses the name.
fn read_stat(name: &CStr) -> Option<usize> {
    let mut value: usize = 0;
    let mut len = size_of::<usize>();
    // SAFETY: the out-pointer and length describe a valid size_t, and the
    // name is a NUL-terminated mallctl identifier.
    let rc = unsafe {
        mallctl(
            name.as_ptr(),
            (&mut value as *mut usize).cast(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    (rc == 0).then_some(value)
}
