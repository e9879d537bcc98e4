// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the Tegra security engine (SE).
//!
//! The engine has a single set of operation registers shared by all cores, so every access goes
//! through a [`SecurityEngine`] which serialises callers with a spin lock. Synchronous operations
//! hold the lock until the engine reports completion. Asynchronous operations return an
//! [`SeOperation`] handle, and complete when the engine's interrupt calls
//! [`SecurityEngine::operation_completed`]. While one is in flight any other operation fails with
//! [`SeError::EngineBusy`], or [`SeError::KeyslotBusy`] if it touches the same key slot.
//!
//! Buffers are passed to the engine as descriptor lists of physical addresses.

#[cfg(test)]
pub mod fake;
mod linked_list;
pub mod registers;

use self::{linked_list::LinkedList, registers::*};
use crate::{
    aarch64::virtual_to_physical,
    cache,
    platform::SeHardwareImpl,
    timer::{Delay, Timeout, Timerus, poll_with_budget},
};
use bitflags::bitflags;
use core::{ptr, task::Poll};
use log::{debug, warn};
use spin::{
    Once,
    mutex::{SpinMutex, SpinMutexGuard},
};
use thiserror::Error;

/// Number of AES key slots.
pub const AES_KEYSLOT_COUNT: usize = 16;
/// Number of RSA key slots.
pub const RSA_KEYSLOT_COUNT: usize = 2;
/// Size of an AES block, IV or counter.
pub const AES_BLOCK_SIZE: usize = 0x10;
const AES_128_KEY_SIZE: usize = 0x10;
const AES_256_KEY_SIZE: usize = 0x20;
/// Maximum size of an RSA modulus, exponent or message.
pub const RSA_SIZE_MAX: usize = 0x100;
const RSA_MODULUS_GRANULE: usize = 0x40;
/// Size of a SHA-256 hash.
pub const SHA256_HASH_SIZE: usize = 0x20;

/// Number of times `INT_STATUS` is polled before a synchronous operation times out.
const SE_POLL_BUDGET: u32 = 1_000_000;
const SE_POLL_INTERVAL_US: u32 = 1;
/// Number of asynchronous operations whose results are kept for their handles.
const RESULT_HISTORY: usize = 4;

bitflags! {
    /// Access rights to revoke from a key slot.
    ///
    /// Revoked rights accumulate and can't be restored until the engine is reset.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct KeyslotFlags: u32 {
        const KEY_READ = 1 << 0;
        const KEY_UPDATE = 1 << 1;
        const ORIGINAL_IV_READ = 1 << 2;
        const ORIGINAL_IV_UPDATE = 1 << 3;
        const UPDATED_IV_READ = 1 << 4;
        const UPDATED_IV_UPDATE = 1 << 5;
        const KEY_USE = 1 << 6;
        /// Makes the key slot accessible to the secure world only.
        const SECURE_ONLY = 1 << 7;
    }
}

impl KeyslotFlags {
    /// Returns the value of the RSA key slot access register which revokes these rights.
    fn rsa_access(self) -> u32 {
        let bits = self.bits();
        (((bits >> 4) & 0b100) | (bits & 0b11)) ^ 0b111
    }
}

/// An error from the security engine driver.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum SeError {
    /// A key slot, size or address was out of range.
    #[error("Invalid argument")]
    InvalidArgument,
    /// The key slot is in use by the operation in flight.
    #[error("Key slot is busy")]
    KeyslotBusy,
    /// Another operation is in flight.
    #[error("Security engine is busy")]
    EngineBusy,
    /// The access needed has been revoked from the key slot.
    #[error("Key slot is locked")]
    KeyslotLocked,
    /// The engine didn't finish in time.
    #[error("Timed out waiting for the security engine")]
    Timeout,
    /// The engine reported an error.
    #[error("Security engine reported an error")]
    HardwareFault,
    /// The result asked for is no longer, or was never, held by the driver.
    #[error("Result is not available")]
    ResultUnavailable,
}

impl From<Timeout> for SeError {
    fn from(_: Timeout) -> Self {
        Self::Timeout
    }
}

/// Access to the SE register block and to memory as the engine sees it.
pub trait SeHardware: Delay {
    /// Reads the register at the given offset in the SE block.
    fn read(&self, offset: usize) -> u32;

    /// Writes the register at the given offset in the SE block.
    fn write(&mut self, offset: usize, value: u32);

    /// Returns the physical address through which the engine can access the memory at the given
    /// virtual address, or `None` if it can't.
    fn dma_address(&self, address: usize) -> Option<u32>;

    /// Cleans and invalidates the data cache for the given range.
    fn flush_dcache_range(&self, address: usize, size: usize);
}

/// The SE register block, mapped as device memory.
#[derive(Debug)]
pub struct SeRegisters {
    base: *mut u32,
    timer: Timerus,
}

impl SeRegisters {
    /// Creates a new instance for the SE register block at the given address.
    ///
    /// # Safety
    ///
    /// `base` must point to the SE register block, mapped as device memory, and must remain valid
    /// for the lifetime of the returned value. No other driver may access the SE registers.
    pub const unsafe fn new(base: *mut u32, timer: Timerus) -> Self {
        Self { base, timer }
    }
}

impl Delay for SeRegisters {
    fn wait_us(&self, us: u32) {
        self.timer.wait_us(us);
    }
}

impl SeHardware for SeRegisters {
    fn read(&self, offset: usize) -> u32 {
        assert!(offset < SE_BLOCK_SIZE && offset % 4 == 0);
        // SAFETY: `base` points to the SE block, as promised by the caller of `new`, and the offset
        // is within it.
        unsafe { self.base.byte_add(offset).read_volatile() }
    }

    fn write(&mut self, offset: usize, value: u32) {
        assert!(offset < SE_BLOCK_SIZE && offset % 4 == 0);
        // SAFETY: `base` points to the SE block, as promised by the caller of `new`, and the offset
        // is within it.
        unsafe { self.base.byte_add(offset).write_volatile(value) }
    }

    fn dma_address(&self, address: usize) -> Option<u32> {
        u32::try_from(virtual_to_physical(address)?).ok()
    }

    fn flush_dcache_range(&self, address: usize, size: usize) {
        cache::flush_dcache_range(address, size);
    }
}

// SAFETY: `SeRegisters` is only a pointer to device memory, which can be accessed from any core.
unsafe impl Send for SeRegisters {}

/// A key slot, as claimed by an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Keyslot {
    Aes(usize),
    Rsa(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OperationStatus {
    Idle,
    InFlight { keyslot: Keyslot, sequence: u64 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct CompletedOperation {
    sequence: u64,
    result: Result<(), SeError>,
}

#[derive(Clone, Copy, Debug, Default)]
struct RsaKeyslot {
    flags: KeyslotFlags,
    modulus_size: usize,
    exponent_size: usize,
}

/// A buffer aligned to a cache line, so cache maintenance on it doesn't affect its neighbours.
#[derive(Clone, Debug)]
#[repr(C, align(64))]
struct DmaBuffer<const N: usize>([u8; N]);

/// A range of memory for the engine to read or write.
#[derive(Clone, Copy, Debug)]
struct DmaRegion {
    address: usize,
    size: usize,
}

impl DmaRegion {
    const NONE: Self = Self {
        address: 0,
        size: 0,
    };

    fn input(buffer: &[u8]) -> Self {
        Self {
            address: buffer.as_ptr() as usize,
            size: buffer.len(),
        }
    }

    fn output(buffer: &mut [u8]) -> Self {
        Self {
            address: buffer.as_mut_ptr() as usize,
            size: buffer.len(),
        }
    }

    fn of<T>(object: &T) -> Self {
        Self {
            address: ptr::from_ref(object) as usize,
            size: size_of::<T>(),
        }
    }
}

struct SeState<H> {
    hardware: H,
    aes_keyslot_flags: [KeyslotFlags; AES_KEYSLOT_COUNT],
    rsa_keyslots: [RsaKeyslot; RSA_KEYSLOT_COUNT],
    status: OperationStatus,
    next_sequence: u64,
    completed: [Option<CompletedOperation>; RESULT_HISTORY],
    /// Outcome of the last asynchronous exponentiation, cleared when `RSA_OUTPUT` is overwritten.
    exp_mod_result: Option<Result<(), SeError>>,
    // Buffers read by the engine during an asynchronous operation.
    rsa_input: DmaBuffer<RSA_SIZE_MAX>,
    async_input: LinkedList<1>,
    async_output: LinkedList<1>,
}

impl<H: SeHardware> SeState<H> {
    fn read(&self, offset: usize) -> u32 {
        self.hardware.read(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.hardware.write(offset, value);
    }

    fn check_idle(&self, keyslot: Option<Keyslot>) -> Result<(), SeError> {
        match self.status {
            OperationStatus::InFlight { keyslot: busy, .. } if Some(busy) == keyslot => {
                Err(SeError::KeyslotBusy)
            }
            OperationStatus::InFlight { .. } => Err(SeError::EngineBusy),
            OperationStatus::Idle => Ok(()),
        }
    }

    /// Checks that the given AES key slot exists, is free, and still has the access in `needs`.
    fn check_aes_keyslot(&self, slot: usize, needs: KeyslotFlags) -> Result<(), SeError> {
        if slot >= AES_KEYSLOT_COUNT {
            return Err(SeError::InvalidArgument);
        }
        self.check_idle(Some(Keyslot::Aes(slot)))?;
        if self.aes_keyslot_flags[slot].intersects(needs) {
            return Err(SeError::KeyslotLocked);
        }
        Ok(())
    }

    /// Checks that the given RSA key slot exists, is free, and still has the access in `needs`.
    fn check_rsa_keyslot(&self, slot: usize, needs: KeyslotFlags) -> Result<(), SeError> {
        if slot >= RSA_KEYSLOT_COUNT {
            return Err(SeError::InvalidArgument);
        }
        self.check_idle(Some(Keyslot::Rsa(slot)))?;
        if self.rsa_keyslots[slot].flags.intersects(needs) {
            return Err(SeError::KeyslotLocked);
        }
        Ok(())
    }

    fn write_aes_keytable(&mut self, address: u32, value: u32) {
        self.write(AES_KEYTABLE_ADDR, address);
        self.write(AES_KEYTABLE_DATA, value);
    }

    fn write_rsa_keytable(&mut self, address: u32, value: u32) {
        self.write(RSA_KEYTABLE_ADDR, address);
        self.write(RSA_KEYTABLE_DATA, value);
    }

    fn write_aes_keyslot_iv(&mut self, slot: usize, iv: &[u8]) {
        for word in 0..AES_BLOCK_SIZE / 4 {
            let value = iv.get(word * 4..word * 4 + 4).map_or(0, le_word);
            self.write_aes_keytable(aes_iv_address(slot, word), value);
        }
    }

    fn write_ctr(&mut self, ctr: &[u8; AES_BLOCK_SIZE]) {
        for (i, word) in ctr.chunks_exact(4).enumerate() {
            self.write(CRYPTO_LINEAR_CTR + 4 * i, le_word(word));
        }
    }

    fn clear_interrupts(&mut self) {
        let err_status = self.read(ERR_STATUS);
        self.write(ERR_STATUS, err_status);
        let int_status = self.read(INT_STATUS);
        self.write(INT_STATUS, int_status);
    }

    fn check_for_error(&self) -> Result<(), SeError> {
        let int_status = self.read(INT_STATUS);
        let flags = self.read(FLAGS);
        let err_status = self.read(ERR_STATUS);
        if IntStatus::from_bits_retain(int_status).contains(IntStatus::ERR)
            || flags & FLAGS_BUSY_MASK != 0
            || err_status != 0
        {
            warn!(
                "Security engine fault: INT_STATUS {int_status:#x}, FLAGS {flags:#x}, ERR_STATUS \
                 {err_status:#x}"
            );
            return Err(SeError::HardwareFault);
        }
        Ok(())
    }

    fn dma_address(&self, address: usize) -> Result<u32, SeError> {
        self.hardware
            .dma_address(address)
            .ok_or(SeError::InvalidArgument)
    }

    fn flush(&self, region: DmaRegion) {
        if region.size != 0 {
            self.hardware
                .flush_dcache_range(region.address, region.size);
        }
    }

    /// Returns a descriptor list for the given region.
    fn linked_list(&self, region: DmaRegion) -> Result<LinkedList<1>, SeError> {
        if region.size == 0 {
            return Ok(LinkedList::EMPTY);
        }
        let size = u32::try_from(region.size).map_err(|_| SeError::InvalidArgument)?;
        Ok(LinkedList::single(self.dma_address(region.address)?, size))
    }

    fn start(&mut self, input_list: u32, output_list: u32) {
        self.write(IN_LL_ADDR, input_list);
        self.write(OUT_LL_ADDR, output_list);
        self.clear_interrupts();
        self.write(OPERATION, Operation::Start.into());
    }

    /// Runs the configured operation and waits for it to finish.
    fn run_blocking(&mut self, output: DmaRegion, input: DmaRegion) -> Result<(), SeError> {
        let output_list = self.linked_list(output)?;
        let input_list = self.linked_list(input)?;
        let output_list_address = self.dma_address(ptr::from_ref(&output_list) as usize)?;
        let input_list_address = self.dma_address(ptr::from_ref(&input_list) as usize)?;

        self.flush(input);
        self.flush(output);
        self.flush(DmaRegion::of(&input_list));
        self.flush(DmaRegion::of(&output_list));
        self.start(input_list_address, output_list_address);

        let result = poll_with_budget(
            &self.hardware,
            SE_POLL_BUDGET,
            SE_POLL_INTERVAL_US,
            || {
                IntStatus::from_bits_retain(self.hardware.read(INT_STATUS))
                    .contains(IntStatus::OP_DONE)
            },
        );
        self.flush(output);
        if result.is_err() {
            warn!("Security engine operation timed out");
        }
        result?;
        self.check_for_error()
    }

    /// Starts the configured operation with the given descriptor lists, completing through the
    /// interrupt. Returns the sequence number of the operation.
    fn start_async(&mut self, keyslot: Keyslot, input_list: u32, output_list: u32) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.status = OperationStatus::InFlight { keyslot, sequence };
        self.write(INT_ENABLE, IntStatus::OP_DONE.bits());
        self.start(input_list, output_list);
        sequence
    }

    /// Returns the result of the operation with the given sequence number, if it has completed.
    fn operation_result(&self, sequence: u64) -> Poll<Result<(), SeError>> {
        match self.status {
            OperationStatus::InFlight {
                sequence: in_flight,
                ..
            } if in_flight == sequence => Poll::Pending,
            _ => Poll::Ready(
                self.completed[history_index(sequence)]
                    .filter(|completed| completed.sequence == sequence)
                    .map_or(Err(SeError::ResultUnavailable), |completed| {
                        completed.result
                    }),
            ),
        }
    }

    /// Encrypts or decrypts a block of up to 16 bytes with the configured key and mode, through an
    /// aligned bounce buffer.
    fn aes_block_operation(&mut self, output: &mut [u8], input: &[u8]) -> Result<(), SeError> {
        let mut block = DmaBuffer([0; AES_BLOCK_SIZE]);
        block.0[..input.len()].copy_from_slice(input);
        self.write(BLOCK_COUNT, 0);
        let region = DmaRegion::output(&mut block.0);
        self.run_blocking(region, region)?;
        output.copy_from_slice(&block.0[..output.len()]);
        Ok(())
    }

    fn aes_ecb_encrypt_block(
        &mut self,
        slot: usize,
        output: &mut [u8; AES_BLOCK_SIZE],
        input: &[u8; AES_BLOCK_SIZE],
        key_size_config: u32,
    ) -> Result<(), SeError> {
        self.write(
            CONFIG,
            ALG_AES_ENC | Destination::Memory.config() | key_size_config,
        );
        self.write(CRYPTO, keyslot_field(slot) | CRYPTO_ECB_ENCRYPT);
        self.aes_block_operation(output, input)
    }

    /// Runs the configured AES operation over whole blocks in one go, then the trailing partial
    /// block through the bounce buffer.
    fn aes_crypt_blocks(&mut self, output: &mut [u8], input: Option<&[u8]>) -> Result<(), SeError> {
        let aligned_size = output.len() & !(AES_BLOCK_SIZE - 1);
        if aligned_size != 0 {
            self.write(BLOCK_COUNT, block_count(aligned_size)?);
            let input_region = input.map_or(DmaRegion::NONE, |input| {
                DmaRegion::input(&input[..aligned_size])
            });
            self.run_blocking(DmaRegion::output(&mut output[..aligned_size]), input_region)?;
        }
        if aligned_size != output.len() {
            let input = input.map_or(&[][..], |input| &input[aligned_size..]);
            self.aes_block_operation(&mut output[aligned_size..], input)?;
        }
        Ok(())
    }

    fn configure_exp_mod(&mut self, slot: usize) {
        let keyslot = self.rsa_keyslots[slot];
        self.write(CONFIG, ALG_RSA | Destination::RsaRegister.config());
        self.write(RSA_CONFIG, keyslot_field(slot));
        self.write(
            RSA_KEY_SIZE,
            (keyslot.modulus_size / RSA_MODULUS_GRANULE - 1) as u32,
        );
        self.write(RSA_EXP_SIZE, (keyslot.exponent_size / 4) as u32);
    }

    /// Reads the big-endian result of the last exponentiation into `output`.
    fn read_exp_mod_output(&self, output: &mut [u8]) {
        let mut result = [0; RSA_SIZE_MAX];
        for (i, word) in result.chunks_exact_mut(4).enumerate() {
            word.copy_from_slice(&self.read(RSA_OUTPUT + 4 * i).to_le_bytes());
        }
        let len = output.len();
        for (byte, value) in output.iter_mut().zip(result[..len].iter().rev()) {
            *byte = *value;
        }
    }
}

/// The security engine driver.
pub struct SecurityEngine<H: SeHardware> {
    state: SpinMutex<SeState<H>>,
}

impl<H: SeHardware> SecurityEngine<H> {
    /// Creates a new driver for the given hardware, with no operation in flight and no access
    /// revoked.
    pub fn new(hardware: H) -> Self {
        Self {
            state: SpinMutex::new(SeState {
                hardware,
                aes_keyslot_flags: [KeyslotFlags::empty(); AES_KEYSLOT_COUNT],
                rsa_keyslots: [RsaKeyslot::default(); RSA_KEYSLOT_COUNT],
                status: OperationStatus::Idle,
                next_sequence: 0,
                completed: [None; RESULT_HISTORY],
                exp_mod_result: None,
                rsa_input: DmaBuffer([0; RSA_SIZE_MAX]),
                async_input: LinkedList::EMPTY,
                async_output: LinkedList::EMPTY,
            }),
        }
    }

    fn lock_idle(&self) -> Result<SpinMutexGuard<'_, SeState<H>>, SeError> {
        let state = self.state.lock();
        state.check_idle(None)?;
        Ok(state)
    }

    fn lock_aes_keyslot(
        &self,
        slot: usize,
        needs: KeyslotFlags,
    ) -> Result<SpinMutexGuard<'_, SeState<H>>, SeError> {
        let state = self.state.lock();
        state.check_aes_keyslot(slot, needs)?;
        Ok(state)
    }

    fn lock_rsa_keyslot(
        &self,
        slot: usize,
        needs: KeyslotFlags,
    ) -> Result<SpinMutexGuard<'_, SeState<H>>, SeError> {
        let state = self.state.lock();
        state.check_rsa_keyslot(slot, needs)?;
        Ok(state)
    }

    /// Checks that the engine is neither busy nor faulted.
    pub fn verify_flags_cleared(&self) -> Result<(), SeError> {
        if self.state.lock().read(FLAGS) & FLAGS_BUSY_MASK != 0 {
            return Err(SeError::HardwareFault);
        }
        Ok(())
    }

    /// Checks the interrupt and error status of the last operation.
    pub fn check_for_error(&self) -> Result<(), SeError> {
        self.state.lock().check_for_error()
    }

    /// Acknowledges all pending interrupt and error status.
    pub fn clear_interrupts(&self) {
        self.state.lock().clear_interrupts();
    }

    /// Re-enables the completion interrupt of the operation in flight, if any, so a completion
    /// which is already pending is delivered.
    pub fn trigger_interrupt(&self) {
        let mut state = self.state.lock();
        if matches!(state.status, OperationStatus::InFlight { .. }) {
            state.write(INT_ENABLE, IntStatus::OP_DONE.bits());
        }
    }

    /// Revokes the given access rights from an AES key slot.
    pub fn set_aes_keyslot_flags(&self, slot: usize, flags: KeyslotFlags) -> Result<(), SeError> {
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::empty())?;
        let revoked = state.aes_keyslot_flags[slot] | flags;
        state.aes_keyslot_flags[slot] = revoked;
        if !revoked.difference(KeyslotFlags::SECURE_ONLY).is_empty() {
            state.write(AES_KEYSLOT_FLAGS + 4 * slot, !revoked.bits());
        }
        if flags.contains(KeyslotFlags::SECURE_ONLY) {
            let read_disable = state.read(AES_KEY_READ_DISABLE);
            state.write(AES_KEY_READ_DISABLE, read_disable & !(1 << slot));
        }
        Ok(())
    }

    /// Revokes the given access rights from an RSA key slot.
    ///
    /// Only [`KeyslotFlags::KEY_READ`], [`KeyslotFlags::KEY_UPDATE`], [`KeyslotFlags::KEY_USE`] and
    /// [`KeyslotFlags::SECURE_ONLY`] apply to RSA key slots.
    pub fn set_rsa_keyslot_flags(&self, slot: usize, flags: KeyslotFlags) -> Result<(), SeError> {
        let mut state = self.lock_rsa_keyslot(slot, KeyslotFlags::empty())?;
        let revoked = state.rsa_keyslots[slot].flags | flags;
        state.rsa_keyslots[slot].flags = revoked;
        if !revoked.difference(KeyslotFlags::SECURE_ONLY).is_empty() {
            state.write(RSA_KEYSLOT_FLAGS + 4 * slot, revoked.rsa_access());
        }
        if flags.contains(KeyslotFlags::SECURE_ONLY) {
            let read_disable = state.read(RSA_KEY_READ_DISABLE);
            state.write(RSA_KEY_READ_DISABLE, read_disable & !(1 << slot));
        }
        Ok(())
    }

    /// Loads a 128 or 256-bit key into an AES key slot.
    pub fn set_aes_keyslot(&self, slot: usize, key: &[u8]) -> Result<(), SeError> {
        if !matches!(key.len(), AES_128_KEY_SIZE | AES_256_KEY_SIZE) {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_UPDATE)?;
        for (i, word) in key.chunks_exact(4).enumerate() {
            state.write_aes_keytable(aes_key_address(slot, i), le_word(word));
        }
        Ok(())
    }

    /// Clears the key and IVs of an AES key slot.
    pub fn clear_aes_keyslot(&self, slot: usize) -> Result<(), SeError> {
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_UPDATE)?;
        for i in 0..16 {
            state.write_aes_keytable(aes_key_address(slot, i), 0);
        }
        Ok(())
    }

    /// Sets the original IV of an AES key slot. An IV shorter than 16 bytes is zero-extended.
    pub fn set_aes_keyslot_iv(&self, slot: usize, iv: &[u8]) -> Result<(), SeError> {
        if iv.len() > AES_BLOCK_SIZE || iv.len() % 4 != 0 {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::ORIGINAL_IV_UPDATE)?;
        state.write_aes_keyslot_iv(slot, iv);
        Ok(())
    }

    /// Clears the original IV of an AES key slot.
    pub fn clear_aes_keyslot_iv(&self, slot: usize) -> Result<(), SeError> {
        self.set_aes_keyslot_iv(slot, &[])
    }

    /// Loads an RSA key into an RSA key slot.
    ///
    /// The modulus and exponent are big-endian. The modulus must be a multiple of 64 bytes long and
    /// the exponent a multiple of 4 bytes, neither longer than 256 bytes.
    pub fn set_rsa_keyslot(
        &self,
        slot: usize,
        modulus: &[u8],
        exponent: &[u8],
    ) -> Result<(), SeError> {
        if modulus.is_empty()
            || modulus.len() > RSA_SIZE_MAX
            || modulus.len() % RSA_MODULUS_GRANULE != 0
            || exponent.is_empty()
            || exponent.len() > RSA_SIZE_MAX
            || exponent.len() % 4 != 0
        {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_rsa_keyslot(slot, KeyslotFlags::KEY_UPDATE)?;
        // The key table holds the least significant word first.
        for (i, word) in modulus.rchunks_exact(4).enumerate() {
            state.write_rsa_keytable(rsa_modulus_address(slot, i), be_word(word));
        }
        for (i, word) in exponent.rchunks_exact(4).enumerate() {
            state.write_rsa_keytable(rsa_exponent_address(slot, i), be_word(word));
        }
        state.rsa_keyslots[slot].modulus_size = modulus.len();
        state.rsa_keyslots[slot].exponent_size = exponent.len();
        Ok(())
    }

    /// Clears the modulus and exponent of an RSA key slot.
    pub fn clear_rsa_keyslot(&self, slot: usize) -> Result<(), SeError> {
        let mut state = self.lock_rsa_keyslot(slot, KeyslotFlags::KEY_UPDATE)?;
        for i in 0..RSA_SIZE_MAX / 4 {
            state.write_rsa_keytable(rsa_modulus_address(slot, i), 0);
        }
        for i in 0..RSA_SIZE_MAX / 4 {
            state.write_rsa_keytable(rsa_exponent_address(slot, i), 0);
        }
        state.rsa_keyslots[slot].modulus_size = 0;
        state.rsa_keyslots[slot].exponent_size = 0;
        Ok(())
    }

    /// Sets the counter used by the next CTR mode operation.
    pub fn set_ctr(&self, ctr: &[u8; AES_BLOCK_SIZE]) -> Result<(), SeError> {
        self.lock_idle()?.write_ctr(ctr);
        Ok(())
    }

    /// Decrypts `wrapped_key` with the key in `source` and loads the result into `destination`,
    /// without the key ever reaching memory.
    pub fn decrypt_data_into_keyslot(
        &self,
        destination: usize,
        source: usize,
        wrapped_key: &[u8],
    ) -> Result<(), SeError> {
        if !matches!(wrapped_key.len(), AES_128_KEY_SIZE | AES_256_KEY_SIZE) {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_aes_keyslot(source, KeyslotFlags::KEY_USE)?;
        state.check_aes_keyslot(destination, KeyslotFlags::KEY_UPDATE)?;

        state.write(CONFIG, ALG_AES_DEC | Destination::KeyTable.config());
        state.write(CRYPTO, keyslot_field(source));
        state.write(BLOCK_COUNT, block_count(wrapped_key.len())?);
        state.write(CRYPTO_KEYTABLE_DST, (destination as u32) << 8);
        state.run_blocking(DmaRegion::NONE, DmaRegion::input(wrapped_key))
    }

    /// Encrypts a single block with the AES-128 key in the given slot.
    pub fn aes_128_ecb_encrypt_block(
        &self,
        slot: usize,
        output: &mut [u8; AES_BLOCK_SIZE],
        input: &[u8; AES_BLOCK_SIZE],
    ) -> Result<(), SeError> {
        self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?
            .aes_ecb_encrypt_block(slot, output, input, 0)
    }

    /// Encrypts a single block with the AES-256 key in the given slot.
    pub fn aes_256_ecb_encrypt_block(
        &self,
        slot: usize,
        output: &mut [u8; AES_BLOCK_SIZE],
        input: &[u8; AES_BLOCK_SIZE],
    ) -> Result<(), SeError> {
        self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?
            .aes_ecb_encrypt_block(slot, output, input, CONFIG_AES_256)
    }

    /// Decrypts a single block with the AES-128 key in the given slot.
    pub fn aes_ecb_decrypt_block(
        &self,
        slot: usize,
        output: &mut [u8; AES_BLOCK_SIZE],
        input: &[u8; AES_BLOCK_SIZE],
    ) -> Result<(), SeError> {
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?;
        state.write(CONFIG, ALG_AES_DEC | Destination::Memory.config());
        state.write(CRYPTO, keyslot_field(slot));
        state.aes_block_operation(output, input)
    }

    /// Encrypts or decrypts `input` into `output` in CTR mode, starting from counter `ctr`.
    ///
    /// `output` is zeroed if the operation fails.
    pub fn aes_ctr_crypt(
        &self,
        slot: usize,
        output: &mut [u8],
        input: &[u8],
        ctr: &[u8; AES_BLOCK_SIZE],
    ) -> Result<(), SeError> {
        if output.len() != input.len() {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?;
        state.write(CONFIG, ALG_AES_ENC | Destination::Memory.config());
        state.write(
            CRYPTO,
            keyslot_field(slot) | CRYPTO_CTR | CRYPTO_CORE_SEL_ENCRYPT,
        );
        state.write_ctr(ctr);
        state.write(SPARE, 1);

        let result = state.aes_crypt_blocks(output, Some(input));
        if result.is_err() {
            output.fill(0);
        }
        result
    }

    /// Computes the AES-128 CMAC of `data` with the key in the given slot, truncated to the length
    /// of `cmac`.
    pub fn compute_aes_128_cmac(
        &self,
        slot: usize,
        cmac: &mut [u8],
        data: &[u8],
    ) -> Result<(), SeError> {
        self.compute_aes_cmac(slot, cmac, data, 0)
    }

    /// Computes the AES-256 CMAC of `data` with the key in the given slot, truncated to the length
    /// of `cmac`.
    pub fn compute_aes_256_cmac(
        &self,
        slot: usize,
        cmac: &mut [u8],
        data: &[u8],
    ) -> Result<(), SeError> {
        self.compute_aes_cmac(slot, cmac, data, CONFIG_AES_256)
    }

    fn compute_aes_cmac(
        &self,
        slot: usize,
        cmac: &mut [u8],
        data: &[u8],
        key_size_config: u32,
    ) -> Result<(), SeError> {
        if cmac.len() > AES_BLOCK_SIZE {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_aes_keyslot(
            slot,
            KeyslotFlags::KEY_USE | KeyslotFlags::ORIGINAL_IV_UPDATE,
        )?;

        let mut subkey = [0; AES_BLOCK_SIZE];
        state.aes_ecb_encrypt_block(slot, &mut subkey, &[0; AES_BLOCK_SIZE], key_size_config)?;
        shift_left_xor_rb(&mut subkey);
        let padded = data.is_empty() || data.len() % AES_BLOCK_SIZE != 0;
        if padded {
            shift_left_xor_rb(&mut subkey);
        }

        state.write(
            CONFIG,
            ALG_AES_ENC | Destination::HashRegister.config() | key_size_config,
        );
        state.write(CRYPTO, keyslot_field(slot) | CRYPTO_CMAC);
        state.write_aes_keyslot_iv(slot, &[]);

        // All but the last block are chained through the engine directly.
        let block_count = data.len().div_ceil(AES_BLOCK_SIZE);
        let last_block_start = block_count.saturating_sub(1) * AES_BLOCK_SIZE;
        if block_count > 1 {
            state.write(
                BLOCK_COUNT,
                u32::try_from(block_count - 2).map_err(|_| SeError::InvalidArgument)?,
            );
            state.run_blocking(DmaRegion::NONE, DmaRegion::input(&data[..last_block_start]))?;
            let crypto = state.read(CRYPTO);
            state.write(CRYPTO, crypto | CRYPTO_IV_SEL_UPDATED);
        }

        let mut last_block = DmaBuffer([0; AES_BLOCK_SIZE]);
        let tail = &data[last_block_start..];
        last_block.0[..tail.len()].copy_from_slice(tail);
        if padded {
            last_block.0[tail.len()] = 0x80;
        }
        for (byte, key) in last_block.0.iter_mut().zip(subkey) {
            *byte ^= key;
        }
        state.write(BLOCK_COUNT, 0);
        state.run_blocking(DmaRegion::NONE, DmaRegion::input(&last_block.0))?;

        let mut result = [0; AES_BLOCK_SIZE];
        for (i, word) in result.chunks_exact_mut(4).enumerate() {
            word.copy_from_slice(&state.read(HASH_RESULT + 4 * i).to_le_bytes());
        }
        cmac.copy_from_slice(&result[..cmac.len()]);
        Ok(())
    }

    /// Computes the SHA-256 hash of `data`.
    pub fn calculate_sha256(
        &self,
        hash: &mut [u8; SHA256_HASH_SIZE],
        data: &[u8],
    ) -> Result<(), SeError> {
        let mut state = self.lock_idle()?;
        state.write(
            CONFIG,
            ENCMODE_SHA256 | ALG_SHA | Destination::HashRegister.config(),
        );
        state.write(SHA_CONFIG, 1);
        let bits = (data.len() as u64) * 8;
        let length = [bits as u32, (bits >> 32) as u32, 0, 0];
        for (i, word) in length.into_iter().enumerate() {
            state.write(SHA_MSG_LENGTH + 4 * i, word);
            state.write(SHA_MSG_LEFT + 4 * i, word);
        }
        state.run_blocking(DmaRegion::NONE, DmaRegion::input(data))?;

        for (i, word) in hash.chunks_exact_mut(4).enumerate() {
            word.copy_from_slice(&state.read(HASH_RESULT + 4 * i).to_be_bytes());
        }
        Ok(())
    }

    /// Computes `input ^ exponent mod modulus` with the key in the given RSA slot, and waits for
    /// the result.
    ///
    /// `input` and `output` are big-endian.
    pub fn synchronous_exp_mod(
        &self,
        slot: usize,
        output: &mut [u8],
        input: &[u8],
    ) -> Result<(), SeError> {
        if input.len() > RSA_SIZE_MAX || output.len() > RSA_SIZE_MAX {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_rsa_keyslot(slot, KeyslotFlags::KEY_USE)?;
        if state.rsa_keyslots[slot].modulus_size == 0 {
            return Err(SeError::InvalidArgument);
        }

        // The engine takes the input least significant byte first.
        let mut buffer = DmaBuffer([0; RSA_SIZE_MAX]);
        for (byte, value) in buffer.0.iter_mut().zip(input.iter().rev()) {
            *byte = *value;
        }
        state.configure_exp_mod(slot);
        state.exp_mod_result = None;
        state.run_blocking(DmaRegion::NONE, DmaRegion::input(&buffer.0[..input.len()]))?;
        state.read_exp_mod_output(output);
        Ok(())
    }

    /// Starts computing `input ^ exponent mod modulus` with the key in the given RSA slot.
    ///
    /// Once the returned operation has completed the result can be read with
    /// [`exp_mod_output`](Self::exp_mod_output).
    pub fn exp_mod(&self, slot: usize, input: &[u8]) -> Result<SeOperation<'_, H>, SeError> {
        if input.len() > RSA_SIZE_MAX {
            return Err(SeError::InvalidArgument);
        }
        let mut state = self.lock_rsa_keyslot(slot, KeyslotFlags::KEY_USE)?;
        if state.rsa_keyslots[slot].modulus_size == 0 {
            return Err(SeError::InvalidArgument);
        }

        state.rsa_input.0.fill(0);
        for (byte, value) in state.rsa_input.0.iter_mut().zip(input.iter().rev()) {
            *byte = *value;
        }
        state.configure_exp_mod(slot);

        let input_region = DmaRegion::input(&state.rsa_input.0[..input.len()]);
        state.async_input = state.linked_list(input_region)?;
        state.async_output = LinkedList::EMPTY;
        let input_list = state.dma_address(ptr::from_ref(&state.async_input) as usize)?;
        let output_list = state.dma_address(ptr::from_ref(&state.async_output) as usize)?;
        state.flush(input_region);
        state.flush(DmaRegion::of(&state.async_input));
        state.flush(DmaRegion::of(&state.async_output));

        state.exp_mod_result = None;
        let sequence = state.start_async(Keyslot::Rsa(slot), input_list, output_list);
        debug!("Started exponentiation with RSA key slot {slot}");
        Ok(SeOperation {
            engine: self,
            sequence,
        })
    }

    /// Reads the big-endian result of the last asynchronous exponentiation.
    ///
    /// Fails, with `output` zeroed, unless that exponentiation completed without error and no
    /// synchronous exponentiation has run since.
    pub fn exp_mod_output(&self, output: &mut [u8]) -> Result<(), SeError> {
        if output.len() > RSA_SIZE_MAX {
            return Err(SeError::InvalidArgument);
        }
        let state = self.lock_idle()?;
        let result = state.exp_mod_result.unwrap_or(Err(SeError::ResultUnavailable));
        match result {
            Ok(()) => state.read_exp_mod_output(output),
            Err(_) => output.fill(0),
        }
        result
    }

    /// Seeds the random number generator, using the key in the given slot.
    pub fn initialize_rng(&self, slot: usize) -> Result<(), SeError> {
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?;
        state.write(CONFIG, ALG_RNG | Destination::Memory.config());
        state.write(CRYPTO, keyslot_field(slot) | CRYPTO_RNG);
        state.write(RNG_CONFIG, RNG_CONFIG_SEED);
        state.write(RNG_SRC_CONFIG, RNG_SRC_CONFIG_ENTROPY);
        state.write(RNG_RESEED_INTERVAL, RNG_RESEED_INTERVAL_BLOCKS);

        // The first output is discarded.
        let mut discard = DmaBuffer([0; AES_BLOCK_SIZE]);
        state.write(BLOCK_COUNT, 0);
        state.run_blocking(DmaRegion::output(&mut discard.0), DmaRegion::NONE)
    }

    /// Fills `output` with random bytes, using the key in the given slot.
    ///
    /// `output` is zeroed if the operation fails.
    pub fn generate_random(&self, slot: usize, output: &mut [u8]) -> Result<(), SeError> {
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?;
        state.write(CONFIG, ALG_RNG | Destination::Memory.config());
        state.write(CRYPTO, keyslot_field(slot) | CRYPTO_RNG);
        state.write(RNG_CONFIG, RNG_CONFIG_GENERATE);

        let result = state.aes_crypt_blocks(output, None);
        if result.is_err() {
            output.fill(0);
        }
        result
    }

    /// Starts a CTR mode operation on buffers provided by the non-secure world.
    ///
    /// # Safety
    ///
    /// `output_list` and `input_list` must be the physical addresses of descriptor lists each
    /// describing `size` bytes, and the engine must be allowed to write the buffers described by
    /// `output_list` until the operation completes.
    pub unsafe fn aes_ctr_crypt_insecure(
        &self,
        slot: usize,
        output_list: u32,
        input_list: u32,
        size: usize,
        ctr: &[u8; AES_BLOCK_SIZE],
    ) -> Result<SeOperation<'_, H>, SeError> {
        let block_count = insecure_block_count(size)?;
        let mut state = self.lock_aes_keyslot(slot, KeyslotFlags::KEY_USE)?;
        state.write(CONFIG, ALG_AES_ENC | Destination::Memory.config());
        state.write_ctr(ctr);
        self.start_insecure(state, slot, output_list, input_list, block_count, CRYPTO_CTR, true)
    }

    /// Starts a CBC mode encryption on buffers provided by the non-secure world.
    ///
    /// # Safety
    ///
    /// `output_list` and `input_list` must be the physical addresses of descriptor lists each
    /// describing `size` bytes, and the engine must be allowed to write the buffers described by
    /// `output_list` until the operation completes.
    pub unsafe fn aes_cbc_encrypt_insecure(
        &self,
        slot: usize,
        output_list: u32,
        input_list: u32,
        size: usize,
        iv: &[u8; AES_BLOCK_SIZE],
    ) -> Result<SeOperation<'_, H>, SeError> {
        let block_count = insecure_block_count(size)?;
        let mut state = self.lock_aes_keyslot(
            slot,
            KeyslotFlags::KEY_USE | KeyslotFlags::ORIGINAL_IV_UPDATE,
        )?;
        state.write(CONFIG, ALG_AES_ENC | Destination::Memory.config());
        state.write_aes_keyslot_iv(slot, iv);
        self.start_insecure(
            state,
            slot,
            output_list,
            input_list,
            block_count,
            CRYPTO_CBC_ENCRYPT,
            true,
        )
    }

    /// Starts a CBC mode decryption on buffers provided by the non-secure world.
    ///
    /// # Safety
    ///
    /// `output_list` and `input_list` must be the physical addresses of descriptor lists each
    /// describing `size` bytes, and the engine must be allowed to write the buffers described by
    /// `output_list` until the operation completes.
    pub unsafe fn aes_cbc_decrypt_insecure(
        &self,
        slot: usize,
        output_list: u32,
        input_list: u32,
        size: usize,
        iv: &[u8; AES_BLOCK_SIZE],
    ) -> Result<SeOperation<'_, H>, SeError> {
        let block_count = insecure_block_count(size)?;
        let mut state = self.lock_aes_keyslot(
            slot,
            KeyslotFlags::KEY_USE | KeyslotFlags::ORIGINAL_IV_UPDATE,
        )?;
        state.write(CONFIG, ALG_AES_DEC | Destination::Memory.config());
        state.write_aes_keyslot_iv(slot, iv);
        self.start_insecure(
            state,
            slot,
            output_list,
            input_list,
            block_count,
            CRYPTO_CBC_DECRYPT,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn start_insecure(
        &self,
        mut state: SpinMutexGuard<'_, SeState<H>>,
        slot: usize,
        output_list: u32,
        input_list: u32,
        block_count: u32,
        mode: u32,
        encrypt: bool,
    ) -> Result<SeOperation<'_, H>, SeError> {
        let core_select = if encrypt { CRYPTO_CORE_SEL_ENCRYPT } else { 0 };
        state.write(
            CRYPTO,
            mode | keyslot_field(slot) | core_select | CRYPTO_MEMIF_AHB,
        );
        state.write(BLOCK_COUNT, block_count);
        let sequence = state.start_async(Keyslot::Aes(slot), input_list, output_list);
        debug!("Started insecure AES operation with key slot {slot}");
        Ok(SeOperation {
            engine: self,
            sequence,
        })
    }

    /// Handles the completion interrupt of an asynchronous operation.
    pub fn operation_completed(&self) {
        let mut state = self.state.lock();
        state.write(INT_ENABLE, 0);
        let int_status = IntStatus::from_bits_retain(state.read(INT_STATUS));
        let OperationStatus::InFlight { keyslot, sequence } = state.status else {
            warn!("Security engine interrupt without an operation in flight");
            return;
        };
        if !int_status.intersects(IntStatus::OP_DONE | IntStatus::ERR) {
            warn!("Spurious security engine interrupt, INT_STATUS {int_status:?}");
            state.write(INT_ENABLE, IntStatus::OP_DONE.bits());
            return;
        }

        let result = state.check_for_error();
        debug!("Security engine operation {sequence} with {keyslot:?} completed: {result:?}");
        if let Keyslot::Rsa(_) = keyslot {
            state.exp_mod_result = Some(result);
        }
        state.completed[history_index(sequence)] = Some(CompletedOperation { sequence, result });
        state.status = OperationStatus::Idle;
    }

    #[cfg(test)]
    fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.state.lock().hardware)
    }
}

/// An asynchronous security engine operation.
#[must_use]
pub struct SeOperation<'a, H: SeHardware> {
    engine: &'a SecurityEngine<H>,
    sequence: u64,
}

impl<H: SeHardware> SeOperation<'_, H> {
    /// Returns the result of this operation if it has completed.
    ///
    /// Only the results of the last few operations are kept. Once this one has been pushed out by
    /// later operations, `SeError::ResultUnavailable` is returned.
    pub fn poll(&self) -> Poll<Result<(), SeError>> {
        self.engine.state.lock().operation_result(self.sequence)
    }
}

fn history_index(sequence: u64) -> usize {
    (sequence % RESULT_HISTORY as u64) as usize
}

fn keyslot_field(slot: usize) -> u32 {
    (slot as u32) << CRYPTO_KEY_INDEX_SHIFT
}

/// Returns the `BLOCK_COUNT` value for `size` bytes of whole blocks.
fn block_count(size: usize) -> Result<u32, SeError> {
    u32::try_from(size / AES_BLOCK_SIZE - 1).map_err(|_| SeError::InvalidArgument)
}

fn insecure_block_count(size: usize) -> Result<u32, SeError> {
    if size == 0 || size % AES_BLOCK_SIZE != 0 {
        return Err(SeError::InvalidArgument);
    }
    block_count(size)
}

fn le_word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_word(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Doubles `block` in GF(2^128), as used to derive the CMAC subkeys.
fn shift_left_xor_rb(block: &mut [u8; AES_BLOCK_SIZE]) {
    let value = u128::from_be_bytes(*block);
    let carry = if value >> 127 != 0 { 0x87 } else { 0 };
    *block = ((value << 1) ^ carry).to_be_bytes();
}

static SECURITY_ENGINE: Once<SecurityEngine<SeHardwareImpl>> = Once::new();

/// Makes the given driver the one used by all cores from now on.
///
/// # Panics
///
/// Panics if a driver was already installed.
#[cfg_attr(test, allow(unused))]
pub fn install(engine: SecurityEngine<SeHardwareImpl>) {
    let mut installed = false;
    SECURITY_ENGINE.call_once(|| {
        installed = true;
        engine
    });
    assert!(installed, "Security engine already installed");
}

/// Returns the driver installed by the cold boot.
#[cfg_attr(test, allow(unused))]
pub fn security_engine() -> &'static SecurityEngine<SeHardwareImpl> {
    SECURITY_ENGINE
        .get()
        .expect("Security engine not installed")
}

/// Interrupt entry point for the security engine completion interrupt.
#[unsafe(no_mangle)]
pub extern "C" fn se_operation_completed() {
    match SECURITY_ENGINE.get() {
        Some(engine) => engine.operation_completed(),
        None => warn!("Security engine interrupt before the driver was installed"),
    }
}

#[cfg(test)]
mod tests {
    use super::{fake::FakeSecurityEngine, linked_list::LinkedList, *};
    use aes::{
        Aes128,
        cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray},
    };

    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const FIPS_KEY: [u8; 32] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
        0x1e, 0x1f,
    ];
    const FIPS_PLAINTEXT: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];
    /// The example message of RFC 4493 and SP 800-38A.
    const MESSAGE: [u8; 64] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a, 0xae, 0x2d, 0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c, 0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf,
        0x8e, 0x51, 0x30, 0xc8, 0x1c, 0x46, 0xa3, 0x5c, 0xe4, 0x11, 0xe5, 0xfb, 0xc1, 0x19, 0x1a,
        0x0a, 0x52, 0xef, 0xf6, 0x9f, 0x24, 0x45, 0xdf, 0x4f, 0x9b, 0x17, 0xad, 0x2b, 0x41, 0x7b,
        0xe6, 0x6c, 0x37, 0x10,
    ];

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn engine() -> SecurityEngine<FakeSecurityEngine> {
        SecurityEngine::new(FakeSecurityEngine::new())
    }

    /// An RSA key with a 64-byte modulus of 3233 and the given exponent.
    fn set_small_rsa_key(engine: &SecurityEngine<FakeSecurityEngine>, slot: usize, exponent: u32) {
        let mut modulus = [0; 64];
        modulus[62..].copy_from_slice(&3233u16.to_be_bytes());
        engine
            .set_rsa_keyslot(slot, &modulus, &exponent.to_be_bytes())
            .unwrap();
    }

    #[test]
    fn ecb_encrypt_and_decrypt() {
        let engine = engine();
        engine.set_aes_keyslot(3, &FIPS_KEY[..16]).unwrap();
        let mut ciphertext = [0; 16];
        engine
            .aes_128_ecb_encrypt_block(3, &mut ciphertext, &FIPS_PLAINTEXT)
            .unwrap();
        assert_eq!(ciphertext.to_vec(), hex("69c4e0d86a7b0430d8cdb78070b4c55a"));

        let mut plaintext = [0; 16];
        engine
            .aes_ecb_decrypt_block(3, &mut plaintext, &ciphertext)
            .unwrap();
        assert_eq!(plaintext, FIPS_PLAINTEXT);
    }

    #[test]
    fn ecb_encrypt_aes_256() {
        let engine = engine();
        engine.set_aes_keyslot(5, &FIPS_KEY).unwrap();
        let mut ciphertext = [0; 16];
        engine
            .aes_256_ecb_encrypt_block(5, &mut ciphertext, &FIPS_PLAINTEXT)
            .unwrap();
        assert_eq!(ciphertext.to_vec(), hex("8ea2b7ca516745bfeafc49904b496089"));
    }

    #[test]
    fn cmac_rfc_4493_vectors() {
        let engine = engine();
        engine.set_aes_keyslot(0, &KEY).unwrap();

        for (length, expected) in [
            (0, "bb1d6929e95937287fa37d129b756746"),
            (16, "070a16b46b4d4144f79bdd9dd04a287c"),
            (40, "dfa66747de9ae63030ca32611497c827"),
            (64, "51f0bebf7e3b9d92fc49741779363cfe"),
        ] {
            let mut cmac = [0; 16];
            engine
                .compute_aes_128_cmac(0, &mut cmac, &MESSAGE[..length])
                .unwrap();
            assert_eq!(cmac.to_vec(), hex(expected), "CMAC of {length} bytes");
        }
    }

    #[test]
    fn cmac_truncated() {
        let engine = engine();
        engine.set_aes_keyslot(0, &KEY).unwrap();
        let mut cmac = [0; 8];
        engine
            .compute_aes_128_cmac(0, &mut cmac, &MESSAGE[..16])
            .unwrap();
        assert_eq!(cmac.to_vec(), hex("070a16b46b4d4144"));

        let mut too_long = [0; 17];
        assert_eq!(
            engine.compute_aes_128_cmac(0, &mut too_long, &MESSAGE),
            Err(SeError::InvalidArgument)
        );
    }

    #[test]
    fn sha256() {
        let engine = engine();
        let mut hash = [0; SHA256_HASH_SIZE];
        engine.calculate_sha256(&mut hash, b"abc").unwrap();
        assert_eq!(
            hash.to_vec(),
            hex("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(engine.with_hardware(|fake| fake.read(SHA_MSG_LENGTH)), 24);

        engine.calculate_sha256(&mut hash, &[]).unwrap();
        assert_eq!(
            hash.to_vec(),
            hex("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn ctr_with_partial_block() {
        let engine = engine();
        engine.set_aes_keyslot(1, &KEY).unwrap();
        let ctr: [u8; 16] = hex("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").try_into().unwrap();

        let mut ciphertext = [0; 20];
        engine
            .aes_ctr_crypt(1, &mut ciphertext, &MESSAGE[..20], &ctr)
            .unwrap();
        assert_eq!(
            ciphertext.to_vec(),
            hex("874d6191b620e3261bef6864990db6ce9806f66b")
        );
        assert_eq!(engine.with_hardware(|fake| fake.read(SPARE)), 1);

        let mut plaintext = [0; 20];
        engine
            .aes_ctr_crypt(1, &mut plaintext, &ciphertext, &ctr)
            .unwrap();
        assert_eq!(plaintext, MESSAGE[..20]);
    }

    #[test]
    fn ctr_length_mismatch() {
        let engine = engine();
        let mut output = [0; 16];
        assert_eq!(
            engine.aes_ctr_crypt(1, &mut output, &MESSAGE[..32], &[0; 16]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(engine.with_hardware(|fake| fake.register_writes()), 0);
    }

    #[test]
    fn unwrap_key_into_keyslot() {
        let engine = engine();
        let kek = KEY;
        engine.set_aes_keyslot(0, &kek).unwrap();

        let mut wrapped = GenericArray::clone_from_slice(&FIPS_KEY[..16]);
        Aes128::new(GenericArray::from_slice(&kek)).encrypt_block(&mut wrapped);
        engine
            .decrypt_data_into_keyslot(7, 0, wrapped.as_slice())
            .unwrap();

        let mut ciphertext = [0; 16];
        engine
            .aes_128_ecb_encrypt_block(7, &mut ciphertext, &FIPS_PLAINTEXT)
            .unwrap();
        assert_eq!(ciphertext.to_vec(), hex("69c4e0d86a7b0430d8cdb78070b4c55a"));
    }

    #[test]
    fn unwrap_into_locked_keyslot() {
        let engine = engine();
        engine.set_aes_keyslot(0, &KEY).unwrap();
        engine
            .set_aes_keyslot_flags(7, KeyslotFlags::KEY_UPDATE)
            .unwrap();
        assert_eq!(
            engine.decrypt_data_into_keyslot(7, 0, &[0; 16]),
            Err(SeError::KeyslotLocked)
        );
        assert_eq!(
            engine.decrypt_data_into_keyslot(6, 0, &[0; 24]),
            Err(SeError::InvalidArgument)
        );
    }

    #[test]
    fn rsa_round_trip() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        set_small_rsa_key(&engine, 1, 2753);

        let mut ciphertext = [0; 64];
        engine
            .synchronous_exp_mod(0, &mut ciphertext, &[65])
            .unwrap();
        assert!(ciphertext[..62].iter().all(|byte| *byte == 0));
        assert_eq!(ciphertext[62..], 2790u16.to_be_bytes());

        let mut plaintext = [0; 2];
        engine
            .synchronous_exp_mod(1, &mut plaintext, &ciphertext)
            .unwrap();
        assert_eq!(plaintext, [0, 65]);
    }

    #[test]
    fn rsa_key_validation() {
        let engine = engine();
        assert_eq!(
            engine.set_rsa_keyslot(0, &[0; 65], &[0; 4]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.set_rsa_keyslot(0, &[0; 64], &[0; 3]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.set_rsa_keyslot(2, &[0; 64], &[0; 4]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.synchronous_exp_mod(0, &mut [0; 4], &[1]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(engine.with_hardware(|fake| fake.register_writes()), 0);
    }

    #[test]
    fn async_exp_mod_completes_through_interrupt() {
        let engine = engine();
        set_small_rsa_key(&engine, 1, 17);
        engine.with_hardware(|fake| fake.defer_async_operations());

        let operation = engine.exp_mod(1, &[65]).unwrap();
        assert_eq!(operation.poll(), Poll::Pending);
        assert_eq!(
            engine.with_hardware(|fake| fake.read(INT_ENABLE)),
            IntStatus::OP_DONE.bits()
        );

        // Everything else has to wait.
        assert_eq!(
            engine.set_rsa_keyslot(1, &[0; 64], &[0; 4]),
            Err(SeError::KeyslotBusy)
        );
        assert_eq!(
            engine.set_rsa_keyslot(0, &[0; 64], &[0; 4]),
            Err(SeError::EngineBusy)
        );
        assert_eq!(
            engine.calculate_sha256(&mut [0; 32], b"abc"),
            Err(SeError::EngineBusy)
        );
        assert_eq!(
            engine.exp_mod_output(&mut [0; 2]),
            Err(SeError::EngineBusy)
        );

        // An interrupt before the engine is done is ignored.
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Pending);

        engine.with_hardware(|fake| fake.complete_pending_operation());
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        assert_eq!(engine.with_hardware(|fake| fake.read(INT_ENABLE)), 0);

        let mut output = [0; 2];
        engine.exp_mod_output(&mut output).unwrap();
        assert_eq!(output, 2790u16.to_be_bytes());
    }

    #[test]
    fn async_fault() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        engine.with_hardware(|fake| fake.fail_next_operation());

        let operation = engine.exp_mod(0, &[65]).unwrap();
        assert_eq!(operation.poll(), Poll::Pending);
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Err(SeError::HardwareFault)));

        // The engine is usable again.
        let mut hash = [0; SHA256_HASH_SIZE];
        assert_eq!(engine.calculate_sha256(&mut hash, b"abc"), Ok(()));
    }

    #[test]
    fn faulted_exp_mod_has_no_output() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        engine.with_hardware(|fake| fake.fail_next_operation());

        let operation = engine.exp_mod(0, &[65]).unwrap();
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Err(SeError::HardwareFault)));

        let mut output = [0xff; 2];
        assert_eq!(
            engine.exp_mod_output(&mut output),
            Err(SeError::HardwareFault)
        );
        assert_eq!(output, [0, 0]);

        // The fault stays latched until it is acknowledged.
        assert_eq!(engine.check_for_error(), Err(SeError::HardwareFault));
        engine.clear_interrupts();
        assert_eq!(engine.check_for_error(), Ok(()));
    }

    #[test]
    fn trigger_interrupt_rearms_operation_in_flight() {
        let engine = engine();
        engine.trigger_interrupt();
        assert_eq!(engine.with_hardware(|fake| fake.read(INT_ENABLE)), 0);

        set_small_rsa_key(&engine, 1, 17);
        engine.with_hardware(|fake| fake.defer_async_operations());
        let operation = engine.exp_mod(1, &[65]).unwrap();
        // The interrupt was lost, for example masked while the engine finished.
        engine.with_hardware(|fake| {
            fake.write(INT_ENABLE, 0);
            fake.complete_pending_operation();
        });
        assert_eq!(operation.poll(), Poll::Pending);

        engine.trigger_interrupt();
        assert_eq!(
            engine.with_hardware(|fake| fake.read(INT_ENABLE)),
            IntStatus::OP_DONE.bits()
        );
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
    }

    #[test]
    fn exp_mod_output_needs_async_exp_mod() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        assert_eq!(
            engine.exp_mod_output(&mut [0; 2]),
            Err(SeError::ResultUnavailable)
        );

        let operation = engine.exp_mod(0, &[65]).unwrap();
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));

        // A synchronous exponentiation overwrites the output register.
        let mut output = [0; 2];
        engine.synchronous_exp_mod(0, &mut output, &[2]).unwrap();
        assert_eq!(
            engine.exp_mod_output(&mut output),
            Err(SeError::ResultUnavailable)
        );
    }

    #[test]
    fn second_async_operation_on_busy_keyslot() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        set_small_rsa_key(&engine, 1, 17);
        engine.set_aes_keyslot(2, &KEY).unwrap();
        engine.with_hardware(|fake| fake.defer_async_operations());

        let operation = engine.exp_mod(1, &[65]).unwrap();
        let started = engine.with_hardware(|fake| fake.operations_started());

        assert_eq!(engine.exp_mod(1, &[66]).err(), Some(SeError::KeyslotBusy));
        assert_eq!(engine.exp_mod(0, &[66]).err(), Some(SeError::EngineBusy));
        // SAFETY: The request is rejected before any descriptor list is used.
        let insecure =
            unsafe { engine.aes_ctr_crypt_insecure(2, 0x8000_0000, 0x8000_1000, 16, &[0; 16]) };
        assert_eq!(insecure.err(), Some(SeError::EngineBusy));
        assert_eq!(engine.with_hardware(|fake| fake.operations_started()), started);

        engine.with_hardware(|fake| fake.complete_pending_operation());
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        assert!(engine.exp_mod(1, &[66]).is_ok());
    }

    #[test]
    fn handle_reports_its_own_operation() {
        let engine = engine();
        set_small_rsa_key(&engine, 0, 17);
        set_small_rsa_key(&engine, 1, 17);

        let first = engine.exp_mod(0, &[65]).unwrap();
        engine.operation_completed();
        assert_eq!(first.poll(), Poll::Ready(Ok(())));

        engine.with_hardware(|fake| fake.defer_async_operations());
        let second = engine.exp_mod(1, &[65]).unwrap();
        assert_eq!(second.poll(), Poll::Pending);
        assert_eq!(first.poll(), Poll::Ready(Ok(())));

        engine.with_hardware(|fake| {
            fake.fail_next_operation();
            fake.complete_pending_operation();
        });
        engine.operation_completed();
        assert_eq!(second.poll(), Poll::Ready(Err(SeError::HardwareFault)));
        assert_eq!(first.poll(), Poll::Ready(Ok(())));

        // Only the most recent results are kept.
        for _ in 0..RESULT_HISTORY {
            let operation = engine.exp_mod(0, &[65]).unwrap();
            engine.with_hardware(|fake| fake.complete_pending_operation());
            engine.operation_completed();
            assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        }
        assert_eq!(first.poll(), Poll::Ready(Err(SeError::ResultUnavailable)));
        assert_eq!(second.poll(), Poll::Ready(Err(SeError::ResultUnavailable)));
    }

    #[test]
    fn insecure_cbc_round_trip() {
        let engine = engine();
        engine.set_aes_keyslot(4, &KEY).unwrap();
        let iv: [u8; 16] = core::array::from_fn(|i| i as u8);

        let input = MESSAGE;
        let mut ciphertext = [0; 64];
        let input_list = LinkedList::single(fake::dma_address(input.as_ptr() as usize), 32);
        let output_list =
            LinkedList::single(fake::dma_address(ciphertext.as_mut_ptr() as usize), 32);
        // SAFETY: Both lists describe 32 bytes of buffers which outlive the operation.
        let operation = unsafe {
            engine.aes_cbc_encrypt_insecure(
                4,
                fake::dma_address(ptr::from_ref(&output_list) as usize),
                fake::dma_address(ptr::from_ref(&input_list) as usize),
                32,
                &iv,
            )
        }
        .unwrap();
        assert_eq!(operation.poll(), Poll::Pending);
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        assert_eq!(
            ciphertext[..32].to_vec(),
            hex("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2")
        );

        let mut plaintext = [0; 32];
        let input_list = LinkedList::single(fake::dma_address(ciphertext.as_ptr() as usize), 32);
        let output_list =
            LinkedList::single(fake::dma_address(plaintext.as_mut_ptr() as usize), 32);
        // SAFETY: Both lists describe 32 bytes of buffers which outlive the operation.
        let operation = unsafe {
            engine.aes_cbc_decrypt_insecure(
                4,
                fake::dma_address(ptr::from_ref(&output_list) as usize),
                fake::dma_address(ptr::from_ref(&input_list) as usize),
                32,
                &iv,
            )
        }
        .unwrap();
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        assert_eq!(plaintext, MESSAGE[..32]);
    }

    #[test]
    fn insecure_ctr() {
        let engine = engine();
        engine.set_aes_keyslot(2, &KEY).unwrap();
        let ctr: [u8; 16] = hex("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").try_into().unwrap();

        let mut output = [0; 16];
        let input_list = LinkedList::single(fake::dma_address(MESSAGE.as_ptr() as usize), 16);
        let output_list = LinkedList::single(fake::dma_address(output.as_mut_ptr() as usize), 16);
        // SAFETY: Both lists describe 16 bytes of buffers which outlive the operation.
        let operation = unsafe {
            engine.aes_ctr_crypt_insecure(
                2,
                fake::dma_address(ptr::from_ref(&output_list) as usize),
                fake::dma_address(ptr::from_ref(&input_list) as usize),
                16,
                &ctr,
            )
        }
        .unwrap();
        engine.operation_completed();
        assert_eq!(operation.poll(), Poll::Ready(Ok(())));
        assert_eq!(output.to_vec(), hex("874d6191b620e3261bef6864990db6ce"));
        assert_eq!(
            engine.with_hardware(|fake| fake.read(CRYPTO)),
            0x8200_091E
        );
    }

    #[test]
    fn insecure_size_validation() {
        let engine = engine();
        // SAFETY: The operation is rejected before any list is used.
        let result = unsafe { engine.aes_ctr_crypt_insecure(2, 0, 0, 24, &[0; 16]) };
        assert_eq!(result.err(), Some(SeError::InvalidArgument));
        // SAFETY: The operation is rejected before any list is used.
        let result = unsafe { engine.aes_cbc_encrypt_insecure(2, 0, 0, 0, &[0; 16]) };
        assert_eq!(result.err(), Some(SeError::InvalidArgument));
    }

    #[test]
    fn keyslot_flags_accumulate() {
        let engine = engine();
        engine.set_aes_keyslot(2, &KEY).unwrap();
        engine
            .set_aes_keyslot_flags(2, KeyslotFlags::KEY_UPDATE)
            .unwrap();
        assert_eq!(
            engine.set_aes_keyslot(2, &KEY),
            Err(SeError::KeyslotLocked)
        );
        assert_eq!(engine.clear_aes_keyslot(2), Err(SeError::KeyslotLocked));

        // The key can still be used.
        let mut output = [0; 16];
        engine
            .aes_128_ecb_encrypt_block(2, &mut output, &[0; 16])
            .unwrap();

        engine
            .set_aes_keyslot_flags(2, KeyslotFlags::KEY_USE)
            .unwrap();
        assert_eq!(
            engine.aes_128_ecb_encrypt_block(2, &mut output, &[0; 16]),
            Err(SeError::KeyslotLocked)
        );
        assert_eq!(
            engine.with_hardware(|fake| fake.read(AES_KEYSLOT_FLAGS + 8)),
            !(KeyslotFlags::KEY_UPDATE | KeyslotFlags::KEY_USE).bits()
        );
    }

    #[test]
    fn secure_only_keyslot() {
        let engine = engine();
        engine.with_hardware(|fake| fake.write(AES_KEY_READ_DISABLE, 0xFFFF));
        engine
            .set_aes_keyslot_flags(9, KeyslotFlags::SECURE_ONLY)
            .unwrap();
        assert_eq!(
            engine.with_hardware(|fake| fake.read(AES_KEY_READ_DISABLE)),
            0xFDFF
        );
        // No access rights were revoked, so the access register is untouched.
        assert_eq!(
            engine.with_hardware(|fake| fake.read(AES_KEYSLOT_FLAGS + 4 * 9)),
            0
        );
    }

    #[test]
    fn rsa_keyslot_flags() {
        let engine = engine();
        engine
            .set_rsa_keyslot_flags(1, KeyslotFlags::KEY_READ | KeyslotFlags::KEY_USE)
            .unwrap();
        assert_eq!(
            engine.with_hardware(|fake| fake.read(RSA_KEYSLOT_FLAGS + 4)),
            0b010
        );
        set_small_rsa_key(&engine, 1, 17);
        assert_eq!(
            engine.synchronous_exp_mod(1, &mut [0; 2], &[65]),
            Err(SeError::KeyslotLocked)
        );
    }

    #[test]
    fn keyslot_validation() {
        let engine = engine();
        assert_eq!(
            engine.set_aes_keyslot(AES_KEYSLOT_COUNT, &KEY),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.set_aes_keyslot(0, &KEY[..12]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.set_aes_keyslot_iv(0, &[0; 20]),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(
            engine.set_aes_keyslot_flags(AES_KEYSLOT_COUNT, KeyslotFlags::KEY_USE),
            Err(SeError::InvalidArgument)
        );
        assert_eq!(engine.with_hardware(|fake| fake.register_writes()), 0);
    }

    #[test]
    fn keyslot_iv() {
        let engine = engine();
        engine.set_aes_keyslot_iv(3, &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
        assert_eq!(engine.with_hardware(|fake| fake.keytable_word(3, 8)), 1);
        assert_eq!(engine.with_hardware(|fake| fake.keytable_word(3, 9)), 2);
        engine.clear_aes_keyslot_iv(3).unwrap();
        assert_eq!(engine.with_hardware(|fake| fake.keytable_word(3, 8)), 0);
    }

    #[test]
    fn clear_keyslots() {
        let engine = engine();
        engine.set_aes_keyslot(6, &FIPS_KEY).unwrap();
        assert_eq!(engine.with_hardware(|fake| fake.keytable_word(6, 7)), 0x1f1e_1d1c);
        engine.clear_aes_keyslot(6).unwrap();
        assert!((0..16).all(|word| engine.with_hardware(|fake| fake.keytable_word(6, word)) == 0));

        set_small_rsa_key(&engine, 0, 17);
        engine.clear_rsa_keyslot(0).unwrap();
        assert_eq!(
            engine.synchronous_exp_mod(0, &mut [0; 2], &[65]),
            Err(SeError::InvalidArgument)
        );
    }

    #[test]
    fn random_numbers() {
        let engine = engine();
        engine.set_aes_keyslot(0xB, &KEY).unwrap();
        engine.initialize_rng(0xB).unwrap();
        assert_eq!(
            engine.with_hardware(|fake| fake.read(RNG_RESEED_INTERVAL)),
            70001
        );

        let mut first = [0; 20];
        let mut second = [0; 20];
        engine.generate_random(0xB, &mut first).unwrap();
        engine.generate_random(0xB, &mut second).unwrap();
        assert_ne!(first, [0; 20]);
        assert_ne!(first, second);
        assert_eq!(engine.with_hardware(|fake| fake.read(RNG_CONFIG)), 4);
    }

    #[test]
    fn hardware_fault_clears_output() {
        let engine = engine();
        engine.set_aes_keyslot(1, &KEY).unwrap();
        engine.with_hardware(|fake| fake.fail_next_operation());

        let mut output = [0xAA; 32];
        assert_eq!(
            engine.aes_ctr_crypt(1, &mut output, &MESSAGE[..32], &[0; 16]),
            Err(SeError::HardwareFault)
        );
        assert_eq!(output, [0; 32]);
    }

    #[test]
    fn engine_flags_fault() {
        let engine = engine();
        engine.set_aes_keyslot(1, &KEY).unwrap();
        assert_eq!(engine.verify_flags_cleared(), Ok(()));

        engine.with_hardware(|fake| fake.write(FLAGS, 1));
        assert_eq!(engine.verify_flags_cleared(), Err(SeError::HardwareFault));
        let mut output = [0; 16];
        assert_eq!(
            engine.aes_128_ecb_encrypt_block(1, &mut output, &[0; 16]),
            Err(SeError::HardwareFault)
        );
        assert_eq!(output, [0; 16]);
    }

    #[test]
    fn timeout() {
        let engine = engine();
        engine.set_aes_keyslot(1, &KEY).unwrap();
        engine.with_hardware(|fake| fake.hang());
        let mut output = [0; 16];
        assert_eq!(
            engine.aes_128_ecb_encrypt_block(1, &mut output, &[0; 16]),
            Err(SeError::Timeout)
        );
    }

    #[test]
    fn set_counter() {
        let engine = engine();
        let ctr: [u8; 16] = core::array::from_fn(|i| i as u8);
        engine.set_ctr(&ctr).unwrap();
        assert_eq!(
            engine.with_hardware(|fake| fake.read(CRYPTO_LINEAR_CTR + 4)),
            0x0706_0504
        );
    }

    #[test]
    fn subkey_doubling() {
        let mut block = [0; 16];
        block[0] = 0x80;
        block[15] = 0x01;
        shift_left_xor_rb(&mut block);
        let mut expected = [0; 16];
        expected[15] = 0x02 ^ 0x87;
        assert_eq!(block, expected);
    }
}
