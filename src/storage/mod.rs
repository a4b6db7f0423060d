// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Vault storage backend plugins.
//!
//! Each backend renders a `storage "<kind>" { ... }` stanza for `vault.hcl` and
//! may mount volumes into the Vault container.

pub mod etcd;
pub mod file;
pub mod inmem;

use crate::crd::BackendStorageSpec;
use crate::errors::BuildError;
use crate::plugin::Plugin;

/// Select the storage plugin for a backend spec.
///
/// # Errors
///
/// Returns [`BuildError::MissingBackend`] when no backend is populated and
/// [`BuildError::MultipleBackends`] when more than one is.
pub fn from_spec(backend: &BackendStorageSpec) -> Result<Box<dyn Plugin>, BuildError> {
    let mut selected: Vec<Box<dyn Plugin>> = Vec::new();
    let mut names: Vec<&'static str> = Vec::new();

    if backend.inmem.is_some() {
        names.push("inmem");
        selected.push(Box::new(inmem::Inmem));
    }
    if let Some(file) = &backend.file {
        names.push("file");
        selected.push(Box::new(file::FileStorage::new(file)?));
    }
    if let Some(etcd) = &backend.etcd {
        names.push("etcd");
        selected.push(Box::new(etcd::EtcdStorage::new(etcd)?));
    }

    match selected.len() {
        0 => Err(BuildError::MissingBackend),
        1 => Ok(selected.remove(0)),
        _ => Err(BuildError::MultipleBackends {
            selected: names.join(", "),
        }),
    }
}
