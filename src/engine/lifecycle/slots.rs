// Slot resolution: logical session handle → physical gateway session name.
// New handles get the configured default slot lazily, on first use; the
// assignment is persistent so every later gateway call for that handle
// addresses the same remote session.

use crate::atoms::error::Result;
use crate::config::LifecycleConfig;
use crate::engine::store::Store;
use log::debug;

pub fn resolve(store: &Store, config: &LifecycleConfig, session_id: &str) -> Result<String> {
    if let Some(slot) = store.slot_for_session(session_id)? {
        return Ok(slot);
    }

    let slot = config.default_slot.clone();
    store.assign_slot(session_id, &slot)?;
    debug!("[lifecycle] Assigned slot '{}' to session '{}'", slot, session_id);
    Ok(slot)
}
