//! Manifest scanner.
//!
//! Walks the manifest and produces the set of discoverable capability
//! implementations: concrete entries that are not themselves decorators.
//! Ambiguity on a single-bound closed contract is a configuration error
//! reported at startup, never resolved silently. A contract with no
//! implementations is simply absent from the result.

use std::collections::HashMap;

use tracing::debug;

use crate::composition::manifest::{CapabilityEntry, Manifest};
use crate::composition::CompositionError;
use crate::contract::{Cardinality, ContractId, ImplId};

/// Discover the capability implementations declared in `manifest`.
///
/// Decorator-tagged entries are excluded; a second implementation of the
/// same single-bound closed contract fails with
/// [`CompositionError::AmbiguousContract`].
pub fn scan(manifest: &Manifest) -> Result<Vec<&CapabilityEntry>, CompositionError> {
    let mut discovered: Vec<&CapabilityEntry> = Vec::new();
    let mut bound: HashMap<&ContractId, ImplId> = HashMap::new();

    for entry in manifest.capabilities() {
        let descriptor = entry.descriptor();
        if descriptor.decorator {
            debug!(
                implementation = %descriptor.implementation,
                "skipping decorator-tagged entry"
            );
            continue;
        }

        if descriptor.contract.open().cardinality() == Cardinality::Single {
            if let Some(first) = bound.insert(&descriptor.contract, descriptor.implementation) {
                return Err(CompositionError::AmbiguousContract {
                    contract: descriptor.contract.to_string(),
                    first: first.name(),
                    second: descriptor.implementation.name(),
                });
            }
        }

        discovered.push(entry);
    }

    debug!(count = discovered.len(), "scan complete");
    Ok(discovered)
}
