// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory storage. Data does not survive a pod restart.

use crate::errors::BuildError;
use crate::plugin::Plugin;

#[derive(Debug, Clone, Copy, Default)]
pub struct Inmem;

impl Plugin for Inmem {
    fn name(&self) -> &'static str {
        "inmem"
    }

    fn contribute_config(&self) -> Result<String, BuildError> {
        Ok("storage \"inmem\" {\n}\n".to_string())
    }
}
