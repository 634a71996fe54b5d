mod environment;
mod policy;

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rivalhook_lib::{settings::ChannelSettings, ConsumerChannel, Settings, SystemClock};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{
    environment::{EpisodeTracker, Observation},
    policy::{IdlePolicy, Policy, RandomPolicy},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyKind {
    Idle,
    Random,
}

/// Answers the snapshots published by the hooked game with actions.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file shared with the DLL; only its [channel] section is used
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = PolicyKind::Idle)]
    policy: PolicyKind,

    /// Seed of the random policy
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// How long one snapshot poll may wait before the stop flag is checked again
    #[arg(long, default_value_t = 100)]
    snapshot_wait_ms: u64,
}

fn run(
    channel_settings: &ChannelSettings,
    mut policy: Box<dyn Policy + Send>,
    snapshot_wait: Duration,
    stop: &AtomicBool,
) -> Result<()> {
    let mut channel = ConsumerChannel::attach(channel_settings)?;
    let clock = SystemClock::new();
    let mut tracker = EpisodeTracker::default();

    while !stop.load(Ordering::Relaxed) {
        let Some(snapshot) = channel.poll_state(snapshot_wait, &clock) else {
            continue;
        };
        let observation = Observation::from(&snapshot.record);
        let action = policy.act(&observation);
        let action_sequence = channel.publish_action(&action);
        debug!(
            "snapshot {} -> action {} (valid: {})",
            snapshot.sequence, action_sequence, action.valid
        );
        if let Some(summary) = tracker.step(&snapshot.record) {
            info!(
                "episode {} finished after {} steps, return {:.3}",
                summary.episode, summary.steps, summary.total_reward
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let policy: Box<dyn Policy + Send> = match args.policy {
        PolicyKind::Idle => Box::new(IdlePolicy),
        PolicyKind::Random => Box::new(RandomPolicy::new(args.seed)),
    };
    info!(
        "policy {:?}, lanes {:?} / {:?} in {:?}",
        args.policy,
        settings.channel.state_lane,
        settings.channel.action_lane,
        settings.channel.lane_dir()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let snapshot_wait = Duration::from_millis(args.snapshot_wait_ms);
    let mut worker = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || run(&settings.channel, policy, snapshot_wait, &stop)
    });

    tokio::select! {
        joined = &mut worker => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("stopping");
            stop.store(true, Ordering::Relaxed);
            worker.await?
        }
    }
}
