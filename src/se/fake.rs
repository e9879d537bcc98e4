// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A behavioural model of the security engine, for tests.
//!
//! The model runs operations synchronously when they are started, using the `aes` and `sha2`
//! crates, and reads and writes host memory through the DMA addresses handed out by
//! [`dma_address`].

use super::{
    SeHardware,
    linked_list::LinkedList,
    registers::*,
};
use crate::timer::Delay;
use aes::{
    Aes128, Aes256,
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray},
};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use zerocopy::FromBytes;

const DMA_WINDOW_BASE: u32 = 0x4000_0000;
const DMA_WINDOW_SIZE: u32 = 0x10_0000;
const DMA_WINDOW_COUNT: usize = 0xC00;

/// Start of each host allocation the engine has been given access to.
static DMA_WINDOWS: Mutex<Vec<usize>> = Mutex::new(Vec::new());

/// Returns a fake physical address for the host memory at `address`.
///
/// Each distinct address gets its own 1 MiB window, so buffers up to that size can be accessed
/// through the returned address.
pub fn dma_address(address: usize) -> u32 {
    let mut windows = DMA_WINDOWS.lock().unwrap();
    let index = match windows.iter().position(|window| *window == address) {
        Some(index) => index,
        None => {
            assert!(windows.len() < DMA_WINDOW_COUNT, "Out of fake DMA windows");
            windows.push(address);
            windows.len() - 1
        }
    };
    DMA_WINDOW_BASE + index as u32 * DMA_WINDOW_SIZE
}

/// Returns the host address for the given fake physical address.
fn host_address(physical_address: u32) -> *mut u8 {
    let offset = physical_address
        .checked_sub(DMA_WINDOW_BASE)
        .expect("Address below the fake DMA windows");
    let index = (offset / DMA_WINDOW_SIZE) as usize;
    let window = DMA_WINDOWS.lock().unwrap()[index];
    (window + (offset % DMA_WINDOW_SIZE) as usize) as *mut u8
}

fn read_memory(physical_address: u32, length: usize) -> Vec<u8> {
    let mut bytes = vec![0; length];
    // SAFETY: Tests only hand the engine addresses of live buffers of at least the described size.
    unsafe {
        host_address(physical_address).copy_to_nonoverlapping(bytes.as_mut_ptr(), length);
    }
    bytes
}

fn write_memory(physical_address: u32, bytes: &[u8]) {
    // SAFETY: Tests only hand the engine addresses of live, writable buffers of at least the
    // described size.
    unsafe {
        host_address(physical_address).copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
    }
}

fn read_linked_list(physical_address: u32) -> LinkedList<1> {
    LinkedList::read_from_bytes(&read_memory(physical_address, size_of::<LinkedList<1>>()))
        .unwrap()
}

enum Cipher {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl Cipher {
    fn new(key: &[u8]) -> Self {
        match key.len() {
            16 => Self::Aes128(Aes128::new(GenericArray::from_slice(key))),
            32 => Self::Aes256(Aes256::new(GenericArray::from_slice(key))),
            length => panic!("Invalid AES key length {length}"),
        }
    }

    fn process(&self, block: [u8; 16], encrypt: bool) -> [u8; 16] {
        let mut block = GenericArray::clone_from_slice(&block);
        match (self, encrypt) {
            (Self::Aes128(cipher), true) => cipher.encrypt_block(&mut block),
            (Self::Aes128(cipher), false) => cipher.decrypt_block(&mut block),
            (Self::Aes256(cipher), true) => cipher.encrypt_block(&mut block),
            (Self::Aes256(cipher), false) => cipher.decrypt_block(&mut block),
        }
        block.into()
    }
}

fn xor(a: [u8; 16], b: [u8; 16]) -> [u8; 16] {
    core::array::from_fn(|i| a[i] ^ b[i])
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// A fake security engine.
pub struct FakeSecurityEngine {
    registers: Box<[u32; SE_BLOCK_SIZE / 4]>,
    /// Words 0-7 hold the key, 8-11 the original IV and 12-15 the updated IV.
    aes_keytable: [[u32; 16]; 16],
    rsa_modulus: [[u32; 64]; 2],
    rsa_exponent: [[u32; 64]; 2],
    random_state: u64,
    fail_next: bool,
    hung: bool,
    defer_async: bool,
    pending: bool,
    operations_started: usize,
    register_writes: usize,
}

impl FakeSecurityEngine {
    /// Creates a new idle engine with cleared key tables.
    pub fn new() -> Self {
        Self {
            registers: Box::new([0; SE_BLOCK_SIZE / 4]),
            aes_keytable: [[0; 16]; 16],
            rsa_modulus: [[0; 64]; 2],
            rsa_exponent: [[0; 64]; 2],
            random_state: 0x2545_f491_4f6c_dd1d,
            fail_next: false,
            hung: false,
            defer_async: false,
            pending: false,
            operations_started: 0,
            register_writes: 0,
        }
    }

    /// Makes the next operation report an error.
    pub fn fail_next_operation(&mut self) {
        self.fail_next = true;
    }

    /// Makes operations never complete.
    pub fn hang(&mut self) {
        self.hung = true;
    }

    /// Leaves operations started with the completion interrupt enabled pending until
    /// [`complete_pending_operation`](Self::complete_pending_operation) is called.
    pub fn defer_async_operations(&mut self) {
        self.defer_async = true;
    }

    /// Runs the pending operation.
    pub fn complete_pending_operation(&mut self) {
        assert!(self.pending, "No operation pending");
        self.pending = false;
        self.execute();
    }

    /// Returns the number of operations started.
    pub fn operations_started(&self) -> usize {
        self.operations_started
    }

    /// Returns the number of register writes so far.
    pub fn register_writes(&self) -> usize {
        self.register_writes
    }

    /// Returns a word of the AES key table.
    pub fn keytable_word(&self, slot: usize, word: usize) -> u32 {
        self.aes_keytable[slot][word]
    }

    fn register(&self, offset: usize) -> u32 {
        self.registers[offset / 4]
    }

    fn set_register(&mut self, offset: usize, value: u32) {
        self.registers[offset / 4] = value;
    }

    fn start(&mut self) {
        self.operations_started += 1;
        if self.hung {
            return;
        }
        if self.defer_async && self.register(INT_ENABLE) != 0 {
            self.pending = true;
            return;
        }
        self.execute();
    }

    fn execute(&mut self) {
        if self.fail_next {
            self.fail_next = false;
            self.set_register(ERR_STATUS, 1);
            self.set_register(
                INT_STATUS,
                self.register(INT_STATUS) | (IntStatus::OP_DONE | IntStatus::ERR).bits(),
            );
            return;
        }

        let input_list = read_linked_list(self.register(IN_LL_ADDR));
        let input: Vec<u8> = input_list
            .entries()
            .iter()
            .filter(|entry| entry.size != 0)
            .flat_map(|entry| read_memory(entry.address, entry.size as usize))
            .collect();

        let config = self.register(CONFIG);
        let output = match config & 0xF000 {
            ALG_SHA => self.sha256(&input),
            ALG_RSA => self.exp_mod(&input),
            ALG_AES_ENC | ALG_RNG => self.aes(&input, true),
            _ if config & ALG_AES_DEC == ALG_AES_DEC => self.aes(&input, false),
            _ => panic!("Unsupported CONFIG {config:#x}"),
        };

        match Destination::try_from((config >> Destination::SHIFT) & 0x7).unwrap() {
            Destination::Memory => self.scatter(&output),
            Destination::HashRegister => {
                for (i, word) in output.chunks_exact(4).take(HASH_RESULT_WORDS).enumerate() {
                    let word = u32::from_le_bytes(word.try_into().unwrap());
                    self.set_register(HASH_RESULT + 4 * i, word);
                }
            }
            Destination::KeyTable => {
                let slot = (self.register(CRYPTO_KEYTABLE_DST) >> 8) as usize & 0xF;
                for (i, word) in output.chunks_exact(4).enumerate() {
                    self.aes_keytable[slot][i] = u32::from_le_bytes(word.try_into().unwrap());
                }
            }
            Destination::RsaRegister => {
                for (i, word) in output.chunks_exact(4).enumerate() {
                    let word = u32::from_le_bytes(word.try_into().unwrap());
                    self.set_register(RSA_OUTPUT + 4 * i, word);
                }
            }
            Destination::SecureRandomKey => panic!("Unsupported destination"),
        }

        self.set_register(
            INT_STATUS,
            self.register(INT_STATUS) | IntStatus::OP_DONE.bits(),
        );
    }

    fn scatter(&self, output: &[u8]) {
        let output_list = read_linked_list(self.register(OUT_LL_ADDR));
        let mut remaining = output;
        for entry in output_list.entries() {
            let length = remaining.len().min(entry.size as usize);
            if length == 0 {
                continue;
            }
            write_memory(entry.address, &remaining[..length]);
            remaining = &remaining[length..];
        }
    }

    /// Hashes the input, returning the state words as the hash registers hold them.
    fn sha256(&self, input: &[u8]) -> Vec<u8> {
        assert_eq!(
            u64::from(self.register(SHA_MSG_LENGTH))
                | (u64::from(self.register(SHA_MSG_LENGTH + 4)) << 32),
            input.len() as u64 * 8,
        );
        Sha256::digest(input)
            .chunks_exact(4)
            .flat_map(|word| u32::from_be_bytes(word.try_into().unwrap()).to_le_bytes())
            .collect()
    }

    /// Exponentiates the little-endian input with the small key in the configured slot.
    fn exp_mod(&self, input: &[u8]) -> Vec<u8> {
        let slot = (self.register(RSA_CONFIG) >> 24) as usize;
        let modulus_words = (self.register(RSA_KEY_SIZE) as usize + 1) * 16;
        let exponent_words = self.register(RSA_EXP_SIZE) as usize;
        let modulus = small_value(&words_to_bytes(&self.rsa_modulus[slot][..modulus_words]));
        let exponent = small_value(&words_to_bytes(&self.rsa_exponent[slot][..exponent_words]));
        let base = small_value(input);

        let mut result = 1 % modulus;
        let mut base = base % modulus;
        let mut exponent = exponent;
        while exponent != 0 {
            if exponent & 1 != 0 {
                result = result * base % modulus;
            }
            base = base * base % modulus;
            exponent >>= 1;
        }

        let mut output = vec![0; 0x100];
        output[..8].copy_from_slice(&(result as u64).to_le_bytes());
        output
    }

    fn aes(&mut self, input: &[u8], encrypt_config: bool) -> Vec<u8> {
        let config = self.register(CONFIG);
        let crypto = self.register(CRYPTO);
        let slot = (crypto >> CRYPTO_KEY_INDEX_SHIFT) as usize & 0xF;
        let key_words = if (config >> 16) & 0xFF == 2 { 8 } else { 4 };
        let cipher = Cipher::new(&words_to_bytes(&self.aes_keytable[slot][..key_words]));

        let encrypt = crypto & CRYPTO_CORE_SEL_ENCRYPT != 0;
        assert_eq!(encrypt, encrypt_config, "CRYPTO core select doesn't match CONFIG");
        let xor_position = (crypto >> CRYPTO_XOR_POS_SHIFT) & 0b11;
        let input_select = (crypto >> CRYPTO_INPUT_SEL_SHIFT) & 0b11;
        let block_count = self.register(BLOCK_COUNT) as usize + 1;
        if input_select == 0 {
            assert_eq!(input.len(), block_count * 16, "Input doesn't match BLOCK_COUNT");
        }

        let iv_words = if crypto & CRYPTO_IV_SEL_UPDATED != 0 {
            12..16
        } else {
            8..12
        };
        let mut chain: [u8; 16] = words_to_bytes(&self.aes_keytable[slot][iv_words])
            .try_into()
            .unwrap();
        let mut counter = u128::from_be_bytes(self.counter());

        let mut output = Vec::with_capacity(block_count * 16);
        for i in 0..block_count {
            let block: [u8; 16] = match input_select {
                0 | 3 => input[i * 16..i * 16 + 16].try_into().unwrap(),
                1 => self.random_block(),
                _ => panic!("Unsupported input select"),
            };
            let result = match (input_select, xor_position) {
                (3, _) => {
                    let keystream = cipher.process(counter.to_be_bytes(), true);
                    counter = counter.wrapping_add(1);
                    xor(block, keystream)
                }
                (_, 0) => cipher.process(block, encrypt),
                (_, 2) => {
                    chain = cipher.process(xor(block, chain), true);
                    chain
                }
                (_, 3) => {
                    let result = xor(cipher.process(block, false), chain);
                    chain = block;
                    result
                }
                (_, position) => panic!("Unsupported XOR position {position}"),
            };
            output.extend_from_slice(&result);
        }

        for (i, word) in chain.chunks_exact(4).enumerate() {
            self.aes_keytable[slot][12 + i] = u32::from_le_bytes(word.try_into().unwrap());
        }
        if input_select == 3 {
            for (i, word) in counter.to_be_bytes().chunks_exact(4).enumerate() {
                let word = u32::from_le_bytes(word.try_into().unwrap());
                self.set_register(CRYPTO_LINEAR_CTR + 4 * i, word);
            }
        }
        if crypto & CRYPTO_HASH_ENABLE != 0 {
            output.drain(..output.len() - 16);
        }
        output
    }

    fn counter(&self) -> [u8; 16] {
        let words: Vec<u32> = (0..4)
            .map(|i| self.register(CRYPTO_LINEAR_CTR + 4 * i))
            .collect();
        words_to_bytes(&words).try_into().unwrap()
    }

    fn random_block(&mut self) -> [u8; 16] {
        core::array::from_fn(|_| {
            self.random_state ^= self.random_state << 13;
            self.random_state ^= self.random_state >> 7;
            self.random_state ^= self.random_state << 17;
            self.random_state as u8
        })
    }
}

/// Converts a little-endian number which must fit in 64 bits.
fn small_value(bytes: &[u8]) -> u128 {
    assert!(
        bytes.iter().skip(8).all(|byte| *byte == 0),
        "The fake only supports small RSA values"
    );
    let mut value = [0; 8];
    let length = bytes.len().min(8);
    value[..length].copy_from_slice(&bytes[..length]);
    u128::from(u64::from_le_bytes(value))
}

impl Delay for FakeSecurityEngine {
    fn wait_us(&self, _us: u32) {}
}

impl SeHardware for FakeSecurityEngine {
    fn read(&self, offset: usize) -> u32 {
        self.register(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.register_writes += 1;
        match offset {
            INT_STATUS | ERR_STATUS => {
                self.set_register(offset, self.register(offset) & !value);
            }
            AES_KEYTABLE_DATA => {
                let address = self.register(AES_KEYTABLE_ADDR) as usize;
                self.aes_keytable[(address >> 4) & 0xF][address & 0xF] = value;
            }
            RSA_KEYTABLE_DATA => {
                let address = self.register(RSA_KEYTABLE_ADDR) as usize;
                let slot = (address >> 7) & 1;
                if address & 0x40 != 0 {
                    self.rsa_modulus[slot][address & 0x3F] = value;
                } else {
                    self.rsa_exponent[slot][address & 0x3F] = value;
                }
            }
            OPERATION => {
                self.set_register(offset, value);
                if matches!(Operation::try_from(value), Ok(Operation::Start)) {
                    self.start();
                }
            }
            _ => self.set_register(offset, value),
        }
    }

    fn dma_address(&self, address: usize) -> Option<u32> {
        Some(dma_address(address))
    }

    fn flush_dcache_range(&self, _address: usize, _size: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dma_windows() {
        let buffer = [1u8, 2, 3, 4];
        let address = dma_address(buffer.as_ptr() as usize);
        assert_eq!(dma_address(buffer.as_ptr() as usize), address);
        assert_eq!(read_memory(address + 1, 2), [2, 3]);
    }

    #[test]
    fn small_values() {
        assert_eq!(small_value(&[0xA1, 0x0C, 0, 0]), 3233);
        assert_eq!(small_value(&[65]), 65);
    }

    #[test]
    fn write_one_to_clear() {
        let mut fake = FakeSecurityEngine::new();
        fake.set_register(INT_STATUS, 0x11);
        fake.write(INT_STATUS, 0x10);
        assert_eq!(fake.read(INT_STATUS), 0x1);
    }
}
