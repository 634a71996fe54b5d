use anyhow::Result;
use derive_new::new;

use crate::{
    address_table::StateAddresses,
    memory_accessors::MemoryAccessor,
    records::{Record, SimulationSnapshot},
};

/// Reads one [`SimulationSnapshot`] out of the host per call.
#[derive(Debug, Clone, Copy, new)]
pub struct StateCapture {
    addresses: StateAddresses,
}

impl StateCapture {
    pub fn capture(&self, memory: &impl MemoryAccessor) -> Result<SimulationSnapshot> {
        // the host keeps each field in the wire layout, so the four blocks are
        // laid side by side and decoded in one go
        let mut raw = [0u8; SimulationSnapshot::WIRE_SIZE];
        let (health, rest) = raw.split_at_mut(SimulationSnapshot::HEALTH_BYTES);
        let (position, rest) = rest.split_at_mut(SimulationSnapshot::POSITION_BYTES);
        let (cooldowns, objective) = rest.split_at_mut(SimulationSnapshot::COOLDOWN_BYTES);
        memory.read(self.addresses.entity_health, health)?;
        memory.read(self.addresses.entity_position, position)?;
        memory.read(self.addresses.entity_cooldowns, cooldowns)?;
        memory.read(self.addresses.objective_progress, objective)?;
        Ok(SimulationSnapshot::from_wire(&raw)?)
    }
}
