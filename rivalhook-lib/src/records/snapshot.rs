use std::mem::size_of;

use bytes::{Buf, BufMut};

use super::Record;

pub const ENTITY_COUNT: usize = 12;
pub const VECTOR_WIDTH: usize = 3;
pub const COOLDOWN_SLOTS: usize = 8;

/// State of every tracked entity at the start of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationSnapshot {
    pub entity_health: [f32; ENTITY_COUNT],
    pub entity_position: [[f32; VECTOR_WIDTH]; ENTITY_COUNT],
    pub entity_cooldowns: [[f32; COOLDOWN_SLOTS]; ENTITY_COUNT],
    pub objective_progress: i32,
}

impl SimulationSnapshot {
    pub const HEALTH_BYTES: usize = ENTITY_COUNT * size_of::<f32>();
    pub const POSITION_BYTES: usize = ENTITY_COUNT * VECTOR_WIDTH * size_of::<f32>();
    pub const COOLDOWN_BYTES: usize = ENTITY_COUNT * COOLDOWN_SLOTS * size_of::<f32>();
    pub const OBJECTIVE_BYTES: usize = size_of::<i32>();
}

impl Record for SimulationSnapshot {
    const WIRE_SIZE: usize =
        Self::HEALTH_BYTES + Self::POSITION_BYTES + Self::COOLDOWN_BYTES + Self::OBJECTIVE_BYTES;

    fn put<B: BufMut>(&self, buf: &mut B) {
        self.entity_health.iter().for_each(|&v| buf.put_f32_le(v));
        self.entity_position
            .iter()
            .flatten()
            .for_each(|&v| buf.put_f32_le(v));
        self.entity_cooldowns
            .iter()
            .flatten()
            .for_each(|&v| buf.put_f32_le(v));
        buf.put_i32_le(self.objective_progress);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        let mut snapshot = Self::default();
        snapshot
            .entity_health
            .iter_mut()
            .for_each(|v| *v = buf.get_f32_le());
        snapshot
            .entity_position
            .iter_mut()
            .flatten()
            .for_each(|v| *v = buf.get_f32_le());
        snapshot
            .entity_cooldowns
            .iter_mut()
            .flatten()
            .for_each(|v| *v = buf.get_f32_le());
        snapshot.objective_progress = buf.get_i32_le();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::WireError;

    fn sample() -> SimulationSnapshot {
        let mut snapshot = SimulationSnapshot::default();
        for i in 0..ENTITY_COUNT {
            snapshot.entity_health[i] = 2500.0 - i as f32 * 125.5;
            snapshot.entity_position[i] = [i as f32, -(i as f32) * 0.5, 12.25];
            for slot in 0..COOLDOWN_SLOTS {
                snapshot.entity_cooldowns[i][slot] = (i * COOLDOWN_SLOTS + slot) as f32 / 8.0;
            }
        }
        snapshot.objective_progress = 1234;
        snapshot
    }

    #[test]
    fn wire_size_matches_field_widths() {
        assert_eq!(SimulationSnapshot::WIRE_SIZE, 580);
        assert_eq!(sample().to_wire().len(), 580);
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let snapshot = sample();
        let decoded = SimulationSnapshot::from_wire(&snapshot.to_wire()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn round_trip_preserves_special_float_bits() {
        let mut snapshot = sample();
        snapshot.entity_health[3] = f32::NAN;
        snapshot.entity_position[5][2] = -0.0;
        snapshot.entity_cooldowns[11][7] = f32::INFINITY;
        snapshot.objective_progress = i32::MIN;

        let wire = snapshot.to_wire();
        let decoded = SimulationSnapshot::from_wire(&wire).unwrap();
        assert_eq!(decoded.to_wire(), wire);
        assert!(decoded.entity_health[3].is_nan());
        assert!(decoded.entity_position[5][2].is_sign_negative());
    }

    #[test]
    fn fields_are_laid_out_in_declaration_order() {
        let wire = sample().to_wire();
        let health_0 = f32::from_le_bytes(wire[0..4].try_into().unwrap());
        let position_1_y = f32::from_le_bytes(wire[48 + 16..48 + 20].try_into().unwrap());
        let cooldown_0_1 = f32::from_le_bytes(wire[192 + 4..192 + 8].try_into().unwrap());
        let objective = i32::from_le_bytes(wire[576..580].try_into().unwrap());
        assert_eq!(health_0, 2500.0);
        assert_eq!(position_1_y, -0.5);
        assert_eq!(cooldown_0_1, 0.125);
        assert_eq!(objective, 1234);
    }

    #[test]
    fn rejects_wrong_length() {
        let wire = sample().to_wire();
        assert_eq!(
            SimulationSnapshot::from_wire(&wire[..579]),
            Err(WireError::Length {
                expected: 580,
                actual: 579
            })
        );
    }
}
