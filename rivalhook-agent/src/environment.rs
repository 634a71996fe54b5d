use rivalhook_lib::{
    records::{COOLDOWN_SLOTS, ENTITY_COUNT, VECTOR_WIDTH},
    SimulationSnapshot,
};

pub const MAX_HEALTH: f32 = 2500.0;
pub const POSITION_SCALE: f32 = 50.0;
pub const COOLDOWN_SCALE: f32 = 10.0;
/// Objective ticks that end a match.
pub const MATCH_LENGTH: i32 = 3600;

pub const OBSERVATION_LEN: usize =
    ENTITY_COUNT + ENTITY_COUNT * VECTOR_WIDTH + ENTITY_COUNT * COOLDOWN_SLOTS;

/// Health, positions and cooldowns scaled to roughly `0..=1`, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation(pub Vec<f32>);

impl From<&SimulationSnapshot> for Observation {
    fn from(snapshot: &SimulationSnapshot) -> Self {
        let mut values = Vec::with_capacity(OBSERVATION_LEN);
        values.extend(snapshot.entity_health.iter().map(|hp| hp / MAX_HEALTH));
        values.extend(
            snapshot
                .entity_position
                .iter()
                .flatten()
                .map(|v| v / POSITION_SCALE),
        );
        values.extend(
            snapshot
                .entity_cooldowns
                .iter()
                .flatten()
                .map(|v| v / COOLDOWN_SCALE),
        );
        Self(values)
    }
}

pub fn reward(snapshot: &SimulationSnapshot) -> f32 {
    let mean_health = snapshot.entity_health.iter().sum::<f32>() / ENTITY_COUNT as f32;
    let damage = (MAX_HEALTH - mean_health) / MAX_HEALTH;
    let objective = snapshot.objective_progress as f32 / MATCH_LENGTH as f32;
    0.6 * damage + 0.4 * objective
}

pub fn is_done(snapshot: &SimulationSnapshot) -> bool {
    snapshot.objective_progress >= MATCH_LENGTH
}

/// Running totals of the current episode.
#[derive(Debug, Default)]
pub struct EpisodeTracker {
    episode: u64,
    steps: u64,
    total_reward: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub episode: u64,
    pub steps: u64,
    pub total_reward: f64,
}

impl EpisodeTracker {
    /// Records one step and returns the summary when it ended the episode.
    pub fn step(&mut self, snapshot: &SimulationSnapshot) -> Option<EpisodeSummary> {
        self.steps += 1;
        self.total_reward += reward(snapshot) as f64;
        if !is_done(snapshot) {
            return None;
        }
        let summary = EpisodeSummary {
            episode: self.episode,
            steps: self.steps,
            total_reward: self.total_reward,
        };
        self.episode += 1;
        self.steps = 0;
        self.total_reward = 0.0;
        Some(summary)
    }
}
