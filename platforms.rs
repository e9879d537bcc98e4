// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

mod icosa;

use icosa::IcosaBuilder;
use std::{error::Error, path::Path};

pub const PLATFORMS: [&str; 1] = [IcosaBuilder::PLAT_NAME];

pub trait Builder {
    /// Address at which the load image is placed by the bootloader.
    ///
    /// This is passed to the linker script through the `SECMON_LOAD_BASE` symbol.
    fn load_base(&self) -> u64;

    /// Maximum size of the load image.
    ///
    /// This is passed to the linker script through the `SECMON_LOAD_SIZE` symbol.
    fn load_size(&self) -> u64;

    /// Physical base address of TZRAM.
    ///
    /// This is passed to the linker script through the `TZRAM_BASE` symbol.
    fn tzram_base(&self) -> u64;

    /// Path of the linker script.
    fn linker_script(&self) -> &'static Path {
        Path::new("secmon.ld")
    }
}

pub fn get_builder(platform: &str) -> Result<Box<dyn Builder>, Box<dyn Error>> {
    match platform {
        IcosaBuilder::PLAT_NAME => Ok(Box::new(IcosaBuilder)),
        _ => Err(format!(
            "Unexpected platform name {platform:?}. Supported platforms: {PLATFORMS:?}"
        )
        .into()),
    }
}

pub fn add_linker_script(path: &Path) {
    println!("cargo:rustc-link-arg=-T{}", path.display());
    println!("cargo:rerun-if-changed={}", path.display());
}

pub fn define_linker_symbol(name: &str, value: u64) {
    println!("cargo:rustc-link-arg=--defsym=\"{name}\"={value}");
}
