use std::{sync::Arc, time::Duration};

use tracing::info;

use crate::{
    clock::Clock,
    lane::{anonymous_lane, ChannelError, LaneLayout, LaneReader, LaneWriter, RingRegion},
    records::{ActionCommand, Record, Sequenced, SimulationSnapshot},
    settings::ChannelSettings,
};

fn attach_lane<R: Record>(
    settings: &ChannelSettings,
    tag: &str,
) -> Result<Arc<RingRegion>, ChannelError> {
    let layout = LaneLayout::for_record::<R>(settings.capacity);
    Ok(Arc::new(RingRegion::attach_file(
        &settings.lane_path(tag),
        tag,
        layout,
    )?))
}

/// The host's end: snapshots out, actions in.
pub struct HostChannel {
    state: LaneWriter<SimulationSnapshot>,
    action: LaneReader<ActionCommand>,
}

impl HostChannel {
    pub fn attach(settings: &ChannelSettings) -> Result<Self, ChannelError> {
        let state = LaneWriter::new(attach_lane::<SimulationSnapshot>(
            settings,
            &settings.state_lane,
        )?)?;
        let mut action = LaneReader::new(attach_lane::<ActionCommand>(
            settings,
            &settings.action_lane,
        )?)?;
        // actions left over from an earlier session answer snapshots nobody sent
        while action.try_read().is_some() {}
        info!(
            "host channel attached in {:?} ({} -> / <- {})",
            settings.lane_dir(),
            state.tag(),
            action.tag()
        );
        Ok(Self::new(state, action))
    }

    pub fn new(state: LaneWriter<SimulationSnapshot>, action: LaneReader<ActionCommand>) -> Self {
        Self { state, action }
    }

    pub fn publish_state(&mut self, snapshot: &SimulationSnapshot) -> u64 {
        self.state.publish(snapshot)
    }

    pub fn poll_action(
        &mut self,
        max_wait: Duration,
        clock: &impl Clock,
    ) -> Option<Sequenced<ActionCommand>> {
        self.action.poll(max_wait, clock)
    }
}

/// The external consumer's end: snapshots in, actions out.
pub struct ConsumerChannel {
    state: LaneReader<SimulationSnapshot>,
    action: LaneWriter<ActionCommand>,
}

impl ConsumerChannel {
    pub fn attach(settings: &ChannelSettings) -> Result<Self, ChannelError> {
        let state = LaneReader::new(attach_lane::<SimulationSnapshot>(
            settings,
            &settings.state_lane,
        )?)?;
        let action = LaneWriter::new(attach_lane::<ActionCommand>(
            settings,
            &settings.action_lane,
        )?)?;
        info!(
            "consumer channel attached in {:?} (<- {} / {} ->)",
            settings.lane_dir(),
            state.tag(),
            action.tag()
        );
        Ok(Self::new(state, action))
    }

    pub fn new(state: LaneReader<SimulationSnapshot>, action: LaneWriter<ActionCommand>) -> Self {
        Self { state, action }
    }

    pub fn poll_state(
        &mut self,
        max_wait: Duration,
        clock: &impl Clock,
    ) -> Option<Sequenced<SimulationSnapshot>> {
        self.state.poll(max_wait, clock)
    }

    pub fn publish_action(&mut self, command: &ActionCommand) -> u64 {
        self.action.publish(command)
    }
}

/// Both ends wired together in process-private memory.
pub fn in_process_pair(capacity: usize) -> Result<(HostChannel, ConsumerChannel), ChannelError> {
    let (state_writer, state_reader) = anonymous_lane::<SimulationSnapshot>("state", capacity)?;
    let (action_writer, action_reader) = anonymous_lane::<ActionCommand>("action", capacity)?;
    Ok((
        HostChannel::new(state_writer, action_reader),
        ConsumerChannel::new(state_reader, action_writer),
    ))
}
