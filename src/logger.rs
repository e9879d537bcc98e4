// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Log output of the secure monitor.
//!
//! Every line is tagged with the index of the core that wrote it and goes to the platform's
//! [`LogSink`], which on hardware is the per-core memory log mirrored to the debug UART.

pub mod inmemory;

use crate::{
    debug::DEBUG,
    platform::{CoresImpl, LogSinkImpl},
};
use core::fmt::{Arguments, Write};
#[cfg(not(test))]
use core::{option_env, panic::PanicInfo};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use percore::Cores;
use spin::{Once, mutex::SpinMutex};

static LOGGER: Once<Logger> = Once::new();

struct Logger<S: LogSink = LogSinkImpl> {
    sink: S,
}

impl<S: LogSink + Send + Sync> Log for Logger<S> {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        writeln!(
            self.sink,
            "[{}] {:<5} {}",
            CoresImpl::core_index(),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {
        self.sink.flush();
    }
}

/// Installs `sink` as the destination of the `log` macros, at the level chosen at build time.
pub fn init(sink: LogSinkImpl) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink });
    log::set_logger(logger)?;
    log::set_max_level(build_time_log_level());
    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(logger) = LOGGER.get() {
        writeln!(logger.sink, "[{}] PANIC {}", CoresImpl::core_index(), info);
        logger.sink.flush();
    }
    loop {}
}

/// Returns the level named by the build-time `LOG_LEVEL` environment variable.
///
/// `LOG_LEVEL` is one of "off", "error", "warn", "info", "debug" or "trace". When it is absent or
/// unrecognised, debug builds log at `Debug` and release builds at `Info`.
pub const fn build_time_log_level() -> LevelFilter {
    let named = match option_env!("LOG_LEVEL") {
        Some(level) => parse_level(level.as_bytes()),
        None => None,
    };
    match named {
        Some(level) => level,
        None if DEBUG => LevelFilter::Debug,
        None => LevelFilter::Info,
    }
}

const fn parse_level(name: &[u8]) -> Option<LevelFilter> {
    Some(match name {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => return None,
    })
}

/// A destination for log lines which may be shared between cores.
///
/// Unlike `core::fmt::Write`, `write_fmt` takes `&self`, so an implementation does its own locking
/// or is lock-free.
pub trait LogSink {
    /// Writes the given format arguments to the log sink.
    fn write_fmt(&self, args: Arguments);

    /// Makes everything written so far visible to an external observer.
    fn flush(&self);
}

/// A [`LogSink`] around a [`Write`] implementation such as the UART.
///
/// Each line is written under a spin lock, so lines from different cores are not interleaved.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Wraps `writer` for use from any core.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }
}

impl<W: Write> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        // A UART write can't usefully be retried.
        let _ = self.writer.lock().write_fmt(args);
    }

    fn flush(&self) {}
}

/// Writes every line to a memory log and mirrors it to a second sink.
///
/// The memory log comes first so that a line is kept even if the core hangs in the mirror, such as
/// while waiting on a stuck UART.
pub struct MirroredSink<M: LogSink, S: LogSink> {
    memory: M,
    mirror: S,
}

impl<M: LogSink, S: LogSink> MirroredSink<M, S> {
    /// Creates a sink writing to `memory` then to `mirror`.
    pub const fn new(memory: M, mirror: S) -> Self {
        Self { memory, mirror }
    }
}

impl<M: LogSink, S: LogSink> LogSink for MirroredSink<M, S> {
    fn write_fmt(&self, args: Arguments) {
        self.memory.write_fmt(args);
        self.mirror.write_fmt(args);
    }

    fn flush(&self) {
        self.memory.flush();
        self.mirror.flush();
    }
}
