//! Built-in kinds

pub mod playlist;

use std::sync::Arc;

use crate::error::Result;
use crate::kind::KindRegistry;

/// Registry holding every built-in kind
pub fn registry() -> Result<KindRegistry> {
    KindRegistry::builder()
        .register(playlist::kind(Arc::new(playlist::lineage()?))?)
        .build()
}
