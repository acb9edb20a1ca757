//! Build script that probes for OpenCV and prints installation hints.
//!
//! The `opencv` crate does the actual linking; this only turns a missing
//! library into a readable warning instead of a wall of linker errors.

use std::process::Command;

fn pkg_config(args: &[&str]) -> Option<String> {
    let output = Command::new("pkg-config").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    if pkg_config(&["--version"]).is_none() {
        println!("cargo:warning=pkg-config not found. It is used to locate OpenCV.");
        println!("cargo:warning=On Ubuntu: sudo apt-get install pkg-config");
        println!("cargo:warning=On macOS: brew install pkg-config");
        return;
    }

    let found = ["opencv4", "opencv"]
        .iter()
        .find_map(|name| pkg_config(&["--modversion", name]).map(|version| (*name, version)));

    match found {
        Some((name, version)) => {
            println!("cargo:warning=Found OpenCV version: {version}");
            // The stock face cascade lives under the package's data directory
            if let Some(prefix) = pkg_config(&["--variable=prefix", name]) {
                println!("cargo:rustc-env=OPENCV_PREFIX={prefix}");
            }
        }
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. Capture, face detection and warping need it.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev");
            println!("cargo:warning=On macOS: brew install opencv");
        }
    }
}
