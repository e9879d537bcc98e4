// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build script for the Tegra secure monitor.

mod platforms;

use platforms::{Builder, PLATFORMS, add_linker_script, define_linker_symbol, get_builder};
use std::env;

fn setup_linker(builder: &dyn Builder) {
    define_linker_symbol("SECMON_LOAD_BASE", builder.load_base());
    define_linker_symbol("SECMON_LOAD_SIZE", builder.load_size());
    define_linker_symbol("TZRAM_BASE", builder.tzram_base());
    add_linker_script(builder.linker_script());
}

fn main() {
    println!(
        "cargo::rustc-check-cfg=cfg(platform, values(\"{}\"))",
        PLATFORMS.join("\", \""),
    );

    if env::var("CARGO_CFG_TARGET_OS").unwrap() == "none" {
        let platform = env::var("CARGO_CFG_PLATFORM").expect("Missing platform name");

        let platform_builder = get_builder(&platform).unwrap();

        setup_linker(&*platform_builder);
    }
}
