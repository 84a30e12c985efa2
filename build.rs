//
// Copyright (c) 2024 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use std::path::Path;

fn main() {
    // Driver version and User-Agent, used in error messages and request headers
    let out_dir = std::env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo");
    let version = env!("CARGO_PKG_VERSION");
    let rustc = rustc_version::version()
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let ua = format!(
        "NoSQL-RustWireDriver/{} (rust{}; {}/{})",
        version,
        rustc,
        std::env::consts::ARCH,
        std::env::consts::OS
    );
    let code = format!(
        "const USER_AGENT: &str = \"{}\";\nconst DRIVER_VERSION: &str = \"{}\";\n",
        ua, version
    );
    let dest_path = Path::new(&out_dir).join("ua.rs");
    std::fs::write(&dest_path, &code).expect("write ua.rs");
    println!("cargo::rerun-if-changed=build.rs");
}
