use rand::{rngs::StdRng, Rng, SeedableRng};
use rivalhook_lib::ActionCommand;

use crate::environment::Observation;

pub trait Policy {
    fn act(&mut self, observation: &Observation) -> ActionCommand;
}

/// Neutral sticks, no buttons.
#[derive(Debug, Default)]
pub struct IdlePolicy;

impl Policy for IdlePolicy {
    fn act(&mut self, _observation: &Observation) -> ActionCommand {
        ActionCommand::new(0.0, 0.0, 0.0, 0)
    }
}

/// Uniform random input. Skips a frame now and then, leaving the previous
/// input in place.
pub struct RandomPolicy {
    rng: StdRng,
    skip_probability: f64,
}

impl RandomPolicy {
    pub const BUTTON_COUNT: u32 = 10;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            skip_probability: 0.1,
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _observation: &Observation) -> ActionCommand {
        if self.rng.gen_bool(self.skip_probability) {
            return ActionCommand::absent();
        }
        ActionCommand::new(
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-180.0..=180.0),
            self.rng.gen_range(0..1 << Self::BUTTON_COUNT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Observation {
        Observation(vec![0.0; 144])
    }

    #[test]
    fn idle_holds_still() {
        let action = IdlePolicy.act(&observation());
        assert!(action.valid);
        assert_eq!(action.packed_input(), [0; 16]);
    }

    #[test]
    fn random_policy_is_reproducible_and_in_range() {
        let mut a = RandomPolicy::new(7);
        let mut b = RandomPolicy::new(7);
        let mut skipped = 0;
        for _ in 0..500 {
            let action = a.act(&observation());
            assert_eq!(action, b.act(&observation()));
            if !action.valid {
                skipped += 1;
                continue;
            }
            assert!((-1.0..=1.0).contains(&action.move_x));
            assert!((-1.0..=1.0).contains(&action.move_y));
            assert!((-180.0..=180.0).contains(&action.look_yaw));
            assert!(action.button_bits < 1 << RandomPolicy::BUTTON_COUNT);
        }
        assert!(skipped > 0 && skipped < 500);
    }
}
