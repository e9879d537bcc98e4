// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per-core log buffers in secure memory.
//!
//! Each core appends to its own [`CoreLog`] without taking a lock. A log starts with a small header
//! so that it can be found and decoded in a memory dump taken after the monitor has hung.

use crate::{
    cache,
    logger::LogSink,
    platform::{CoresImpl, PerCoreState, Platform, PlatformImpl, exception_free},
};
use core::{
    cell::RefCell,
    fmt::{self, Arguments, Write},
    ptr,
};
use percore::{Cores, ExceptionLock, PerCore};

/// Value of the header magic once a core has written to its log.
pub const CORE_LOG_MAGIC: u32 = u32::from_le_bytes(*b"SMLG");

/// The log of a single core, in the layout it has in memory.
#[repr(C)]
pub struct CoreLog<const N: usize> {
    /// [`CORE_LOG_MAGIC`] once the log is in use, otherwise 0.
    magic: u32,
    /// Index of the core that owns the log.
    core: u32,
    /// Bytes written since boot. Only the last `N` are kept, the newest at `(written - 1) % N`.
    written: u64,
    buffer: [u8; N],
}

impl<const N: usize> CoreLog<N> {
    const fn new() -> Self {
        const { assert!(N > 0) };
        Self {
            magic: 0,
            core: 0,
            written: 0,
            buffer: [0; N],
        }
    }

    /// Fills in the header the first time the log is written.
    fn claim(&mut self, core: u32) {
        if self.magic != CORE_LOG_MAGIC {
            self.core = core;
            self.magic = CORE_LOG_MAGIC;
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.buffer[(self.written % N as u64) as usize] = byte;
            self.written += 1;
        }
    }

    /// Writes the header and buffer back to memory, so a dump sees them without the caches.
    fn flush(&self) {
        cache::flush_dcache_range(ptr::from_ref(self) as usize, size_of::<Self>());
    }
}

impl<const N: usize> Write for CoreLog<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

/// A lock-free [`LogSink`] which writes to the calling core's [`CoreLog`].
pub struct PerCoreLog<const N: usize> {
    logs: PerCoreState<CoreLog<N>>,
}

impl<const N: usize> PerCoreLog<N> {
    /// Creates a set of empty logs, one per core.
    pub const fn new() -> Self {
        Self {
            logs: PerCore::new(
                [const { ExceptionLock::new(RefCell::new(CoreLog::new())) };
                    PlatformImpl::CORE_COUNT],
            ),
        }
    }
}

impl<const N: usize> LogSink for PerCoreLog<N> {
    fn write_fmt(&self, args: Arguments) {
        let core = CoresImpl::core_index() as u32;
        exception_free(|token| {
            let mut log = self.logs.get().borrow_mut(token);
            log.claim(core);
            // Appending to memory never fails.
            let _ = log.write_fmt(args);
        });
    }

    fn flush(&self) {
        exception_free(|token| self.logs.get().borrow_mut(token).flush());
    }
}

impl<const N: usize> LogSink for &PerCoreLog<N> {
    fn write_fmt(&self, args: Arguments) {
        (*self).write_fmt(args)
    }

    fn flush(&self) {
        (*self).flush();
    }
}
