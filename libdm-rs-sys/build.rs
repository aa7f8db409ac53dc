// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env::var, path::PathBuf};

use bindgen::Builder;

fn main() {
    let mut builder = Builder::default()
        .header("dm.h")
        .allowlist_function("dm_.*")
        .allowlist_type("dm_.*")
        .allowlist_var("DM_.*")
        .derive_debug(true)
        .derive_default(true);

    // Build scripts do not see cfg(feature); Cargo exports features in the
    // environment instead.
    if var("CARGO_FEATURE_DISABLE_CARGO_METADATA").is_ok() {
        println!("cargo:rustc-link-lib=devmapper");
    } else {
        let libdm = pkg_config::Config::new()
            .probe("devmapper")
            .expect("Could not locate libdevmapper via pkg-config");
        for path in &libdm.include_paths {
            builder = builder.clang_arg(format!("-I{}", path.display()));
        }
    }

    let bindings = builder.generate().expect("Could not generate bindings");

    let mut bindings_path = PathBuf::from(var("OUT_DIR").unwrap());
    bindings_path.push("bindings.rs");
    bindings
        .write_to_file(&bindings_path)
        .expect("Could not write bindings to file");
}
