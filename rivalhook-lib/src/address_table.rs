use serde::Deserialize;

use crate::hook::HookSite;

/// Where the snapshot fields live in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateAddresses {
    pub entity_health: usize,
    pub entity_position: usize,
    pub entity_cooldowns: usize,
    pub objective_progress: usize,
}

impl StateAddresses {
    pub fn offset_by(self, base: usize) -> Self {
        Self {
            entity_health: base + self.entity_health,
            entity_position: base + self.entity_position,
            entity_cooldowns: base + self.entity_cooldowns,
            objective_progress: base + self.objective_progress,
        }
    }
}

/// Every absolute address the core touches for one build of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTable {
    pub tick: HookSite,
    pub state: StateAddresses,
    /// Start of the packed input block.
    pub input_action: usize,
}
