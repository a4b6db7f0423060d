// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes the `VaultServer` CRD manifest derived from `src/crd.rs`.
//!
//! ```text
//! cargo run --bin crdgen [OUTPUT_DIR]
//! ```
//!
//! `OUTPUT_DIR` defaults to `deploy/crds`.

use kube::CustomResourceExt;
use std::path::PathBuf;
use vault_operator::crd::VaultServer;

const HEADER: &str = "\
# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# Generated by `cargo run --bin crdgen` from src/crd.rs. Do not edit.
";

fn render<T: CustomResourceExt>() -> Result<String, serde_yaml::Error> {
    Ok(format!("{HEADER}{}", serde_yaml::to_string(&T::crd())?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("deploy/crds"), PathBuf::from);
    std::fs::create_dir_all(&dir)?;

    let path = dir.join("vaultservers.crd.yaml");
    std::fs::write(&path, render::<VaultServer>()?)?;
    println!("wrote {}", path.display());
    Ok(())
}
