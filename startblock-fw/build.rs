use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    // Put `memory.x` in the output directory and ensure it's on the
    // linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(include_bytes!("memory.x"))
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    // Only re-run when the memory layout changes.
    println!("cargo:rerun-if-changed=memory.x");

    // Configure the defmt log level based on features.
    if env::var("CARGO_FEATURE_DEBUG").is_ok() {
        println!("cargo:rustc-env=DEFMT_LOG=trace");
    } else {
        println!("cargo:rustc-env=DEFMT_LOG=off");
    }

    println!("cargo:rustc-link-arg-bins=--nmagic");

    // Main linker script, uses the memory layout from above.
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    // Link the defmt linker script.
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
