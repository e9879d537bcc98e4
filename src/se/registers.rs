// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register map of the security engine.
//!
//! Offsets are from the start of the SE block.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const OPERATION: usize = 0x008;
pub const INT_ENABLE: usize = 0x00C;
pub const INT_STATUS: usize = 0x010;
pub const CONFIG: usize = 0x014;
pub const IN_LL_ADDR: usize = 0x018;
pub const OUT_LL_ADDR: usize = 0x024;
/// First of the 8 hash result words.
pub const HASH_RESULT: usize = 0x030;
pub const HASH_RESULT_WORDS: usize = 8;

pub const SHA_CONFIG: usize = 0x200;
/// First of the 4 message length words, least significant first.
pub const SHA_MSG_LENGTH: usize = 0x204;
/// First of the 4 remaining message length words, least significant first.
pub const SHA_MSG_LEFT: usize = 0x214;
pub const SHA_LENGTH_WORDS: usize = 4;

pub const AES_KEY_READ_DISABLE: usize = 0x280;
/// First of the 16 AES key slot access registers.
pub const AES_KEYSLOT_FLAGS: usize = 0x284;

pub const CRYPTO: usize = 0x304;
/// First of the 4 counter words.
pub const CRYPTO_LINEAR_CTR: usize = 0x308;
pub const BLOCK_COUNT: usize = 0x318;
pub const AES_KEYTABLE_ADDR: usize = 0x31C;
pub const AES_KEYTABLE_DATA: usize = 0x320;
pub const CRYPTO_KEYTABLE_DST: usize = 0x330;

pub const RNG_CONFIG: usize = 0x340;
pub const RNG_SRC_CONFIG: usize = 0x344;
pub const RNG_RESEED_INTERVAL: usize = 0x348;

pub const RSA_CONFIG: usize = 0x400;
pub const RSA_KEY_SIZE: usize = 0x404;
pub const RSA_EXP_SIZE: usize = 0x408;
pub const RSA_KEY_READ_DISABLE: usize = 0x40C;
/// First of the 2 RSA key slot access registers.
pub const RSA_KEYSLOT_FLAGS: usize = 0x410;
pub const RSA_KEYTABLE_ADDR: usize = 0x420;
pub const RSA_KEYTABLE_DATA: usize = 0x424;
/// Start of the 0x100 byte RSA output.
pub const RSA_OUTPUT: usize = 0x428;

pub const FLAGS: usize = 0x800;
pub const ERR_STATUS: usize = 0x804;
pub const SPARE: usize = 0x80C;

/// Size of the SE register block.
pub const SE_BLOCK_SIZE: usize = 0x2000;

/// Values for the `OPERATION` register.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Operation {
    Abort = 0,
    Start = 1,
    Restart = 2,
    ContextSave = 3,
    RestartIn = 4,
}

bitflags! {
    /// Bits of the `INT_STATUS` and `INT_ENABLE` registers.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct IntStatus: u32 {
        const IN_DONE = 1 << 1;
        const OP_DONE = 1 << 4;
        const ERR = 1 << 16;
    }
}

/// Mask of the `FLAGS` register bits which report the engine as busy or faulted.
pub const FLAGS_BUSY_MASK: u32 = 0b11;

// `CONFIG` register fields.
pub const ALG_SHIFT: u32 = 12;
pub const ALG_DEC_SHIFT: u32 = 8;
pub const ALG_NOP: u32 = 0 << ALG_SHIFT;
pub const ALG_AES_ENC: u32 = 1 << ALG_SHIFT;
pub const ALG_AES_DEC: u32 = (1 << ALG_DEC_SHIFT) | ALG_NOP;
pub const ALG_RNG: u32 = 2 << ALG_SHIFT;
pub const ALG_SHA: u32 = 3 << ALG_SHIFT;
pub const ALG_RSA: u32 = 4 << ALG_SHIFT;
pub const ENCMODE_SHA256: u32 = 5 << 24;
/// Selects 256-bit keys for both the encrypt and decrypt modes.
pub const CONFIG_AES_256: u32 = 0x202 << 16;

/// Destination of an operation's output, in the `CONFIG` register.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Destination {
    Memory = 0,
    HashRegister = 1,
    KeyTable = 2,
    SecureRandomKey = 3,
    RsaRegister = 4,
}

impl Destination {
    pub const SHIFT: u32 = 2;

    /// Returns the `CONFIG` bits selecting this destination.
    pub fn config(self) -> u32 {
        u32::from(self) << Self::SHIFT
    }
}

// `CRYPTO` register fields.
pub const CRYPTO_KEY_INDEX_SHIFT: u32 = 24;
pub const CRYPTO_HASH_ENABLE: u32 = 1 << 0;
pub const CRYPTO_XOR_POS_SHIFT: u32 = 1;
pub const CRYPTO_INPUT_SEL_SHIFT: u32 = 3;
pub const CRYPTO_VCTRAM_SEL_SHIFT: u32 = 5;
pub const CRYPTO_IV_SEL_UPDATED: u32 = 1 << 7;
pub const CRYPTO_CORE_SEL_ENCRYPT: u32 = 1 << 8;
pub const CRYPTO_CTR_INCREMENT_ONE: u32 = 1 << 11;
pub const CRYPTO_MEMIF_AHB: u32 = 1 << 31;

/// ECB encryption.
pub const CRYPTO_ECB_ENCRYPT: u32 = CRYPTO_CORE_SEL_ENCRYPT;
/// CTR mode, without the core select bit.
pub const CRYPTO_CTR: u32 = CRYPTO_CTR_INCREMENT_ONE
    | (3 << CRYPTO_INPUT_SEL_SHIFT)
    | (3 << CRYPTO_XOR_POS_SHIFT);
/// CBC encryption, without the core select bit.
pub const CRYPTO_CBC_ENCRYPT: u32 = (2 << CRYPTO_VCTRAM_SEL_SHIFT) | (2 << CRYPTO_XOR_POS_SHIFT);
/// CBC decryption, without the core select bit.
pub const CRYPTO_CBC_DECRYPT: u32 = (3 << CRYPTO_VCTRAM_SEL_SHIFT) | (3 << CRYPTO_XOR_POS_SHIFT);
/// CBC-MAC into the hash registers, starting from the original IV.
pub const CRYPTO_CMAC: u32 = CRYPTO_CORE_SEL_ENCRYPT
    | (2 << CRYPTO_VCTRAM_SEL_SHIFT)
    | (2 << CRYPTO_XOR_POS_SHIFT)
    | CRYPTO_HASH_ENABLE;
/// Random number generation, encrypting the entropy source.
pub const CRYPTO_RNG: u32 = CRYPTO_CORE_SEL_ENCRYPT | (1 << CRYPTO_INPUT_SEL_SHIFT);

/// Values for `RNG_CONFIG`.
pub const RNG_CONFIG_SEED: u32 = 5;
pub const RNG_CONFIG_GENERATE: u32 = 4;
pub const RNG_SRC_CONFIG_ENTROPY: u32 = 3;
pub const RNG_RESEED_INTERVAL_BLOCKS: u32 = 70001;

/// Returns the AES key table address of word `word` of the key in `slot`.
pub const fn aes_key_address(slot: usize, word: usize) -> u32 {
    ((slot << 4) | word) as u32
}

/// Returns the AES key table address of word `word` of the original IV in `slot`.
pub const fn aes_iv_address(slot: usize, word: usize) -> u32 {
    ((slot << 4) | 8 | word) as u32
}

/// Returns the RSA key table address of word `word` of the modulus in `slot`.
pub const fn rsa_modulus_address(slot: usize, word: usize) -> u32 {
    ((slot << 7) | 0x40 | word) as u32
}

/// Returns the RSA key table address of word `word` of the exponent in `slot`.
pub const fn rsa_exponent_address(slot: usize, word: usize) -> u32 {
    ((slot << 7) | word) as u32
}
