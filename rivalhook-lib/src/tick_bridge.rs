use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use getset::CopyGetters;
use tracing::{debug, info};

use crate::{
    address_table::AddressTable,
    apply::ActionApply,
    capture::StateCapture,
    channel::HostChannel,
    clock::Clock,
    hook::{HookBinding, HookError},
    memory_accessors::MemoryAccessor,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct TickStats {
    ticks: u64,
    published: u64,
    actions_applied: u64,
    actions_missed: u64,
    capture_failures: u64,
    apply_failures: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Sequence of the snapshot published this tick.
    pub published: Option<u64>,
    /// Sequence of the action received this tick.
    pub action: Option<u64>,
    /// Whether the received action was written into the host.
    pub applied: bool,
}

/// Everything the interposed tick handler does before handing control back
/// to the original function.
pub struct TickBridge<M: MemoryAccessor, C: Clock> {
    memory: Arc<M>,
    capture: StateCapture,
    apply: ActionApply,
    channel: HostChannel,
    clock: C,
    action_wait: Duration,
    stats_interval: u64,
    stats: TickStats,
}

impl<M: MemoryAccessor, C: Clock> TickBridge<M, C> {
    pub fn new(
        memory: Arc<M>,
        addresses: &AddressTable,
        channel: HostChannel,
        clock: C,
        action_wait: Duration,
        stats_interval: u64,
    ) -> Self {
        Self {
            memory,
            capture: StateCapture::new(addresses.state),
            apply: ActionApply::new(addresses.input_action),
            channel,
            clock,
            action_wait,
            stats_interval,
            stats: TickStats::default(),
        }
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// capture, publish, wait for an action, apply. Never fails; problems are
    /// counted and logged.
    pub fn on_tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.stats.ticks += 1;

        match self.capture.capture(self.memory.as_ref()) {
            Ok(snapshot) => {
                outcome.published = Some(self.channel.publish_state(&snapshot));
                self.stats.published += 1;
            }
            Err(err) => {
                self.stats.capture_failures += 1;
                debug!("capture failed: {}", err);
            }
        }

        match self.channel.poll_action(self.action_wait, &self.clock) {
            Some(action) => {
                outcome.action = Some(action.sequence);
                match self.apply.apply(self.memory.as_ref(), &action.record) {
                    Ok(applied) => {
                        outcome.applied = applied;
                        if applied {
                            self.stats.actions_applied += 1;
                        }
                    }
                    Err(err) => {
                        self.stats.apply_failures += 1;
                        debug!("apply failed: {}", err);
                    }
                }
            }
            None => self.stats.actions_missed += 1,
        }

        if self.stats_interval > 0 && self.stats.ticks % self.stats_interval == 0 {
            info!(
                "ticks={} published={} applied={} missed={} capture_failures={} apply_failures={}",
                self.stats.ticks,
                self.stats.published,
                self.stats.actions_applied,
                self.stats.actions_missed,
                self.stats.capture_failures,
                self.stats.apply_failures,
            );
        }
        outcome
    }
}

/// Restores the hooked target, then waits until a tick still running the
/// bridge has left it.
pub fn unhook<M: MemoryAccessor, C: Clock>(
    binding: Option<HookBinding<M>>,
    bridge: &Mutex<TickBridge<M, C>>,
) -> Result<(), HookError> {
    let result = match binding {
        Some(mut binding) => binding.deactivate(),
        None => Ok(()),
    };
    drop(bridge.lock().unwrap_or_else(PoisonError::into_inner));
    result
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc,
        },
        thread,
    };

    use super::*;
    use crate::{
        address_table::StateAddresses,
        channel::{in_process_pair, ConsumerChannel},
        clock::ManualClock,
        hook::HookSite,
        memory_accessors::SyntheticMemory,
        records::ActionCommand,
    };

    const BASE: usize = 0x10_0000;
    const INPUT: usize = BASE + 0x900;

    fn table(entity_health: usize) -> AddressTable {
        AddressTable {
            tick: HookSite::new(BASE, 16),
            state: StateAddresses {
                entity_health,
                entity_position: BASE + 0x100,
                entity_cooldowns: BASE + 0x200,
                objective_progress: BASE + 0x400,
            },
            input_action: INPUT,
        }
    }

    fn bridge(
        entity_health: usize,
    ) -> (
        Arc<SyntheticMemory>,
        TickBridge<SyntheticMemory, ManualClock>,
        ConsumerChannel,
    ) {
        let memory = Arc::new(SyntheticMemory::new(BASE, 0x1000));
        let (host, consumer) = in_process_pair(4).unwrap();
        let bridge = TickBridge::new(
            memory.clone(),
            &table(entity_health),
            host,
            ManualClock::new(),
            Duration::from_millis(1),
            0,
        );
        (memory, bridge, consumer)
    }

    #[test]
    fn missing_action_waits_the_budget_and_counts_a_miss() {
        let (_memory, mut bridge, mut consumer) = bridge(BASE + 0x40);
        let outcome = bridge.on_tick();
        assert_eq!(outcome.published, Some(1));
        assert_eq!(outcome.action, None);
        assert_eq!(bridge.clock().now(), Duration::from_millis(1));
        assert!(consumer
            .poll_state(Duration::ZERO, &ManualClock::new())
            .is_some());

        let stats = bridge.stats();
        assert_eq!(stats.ticks(), 1);
        assert_eq!(stats.published(), 1);
        assert_eq!(stats.actions_missed(), 1);
    }

    #[test]
    fn applies_valid_actions_and_skips_invalid_ones() {
        let (memory, mut bridge, mut consumer) = bridge(BASE + 0x40);
        let command = ActionCommand::new(0.25, 0.0, -5.0, 0b11);
        consumer.publish_action(&command);
        let outcome = bridge.on_tick();
        assert_eq!(outcome.action, Some(1));
        assert!(outcome.applied);
        assert_eq!(
            memory.bytes(INPUT, 16).unwrap(),
            command.packed_input().to_vec()
        );

        consumer.publish_action(&ActionCommand::absent());
        let outcome = bridge.on_tick();
        assert_eq!(outcome.action, Some(2));
        assert!(!outcome.applied);
        assert_eq!(
            memory.bytes(INPUT, 16).unwrap(),
            command.packed_input().to_vec()
        );
        assert_eq!(bridge.stats().actions_applied(), 1);
        assert_eq!(bridge.stats().actions_missed(), 0);
    }

    #[test]
    fn capture_failure_still_completes_the_tick() {
        let (memory, mut bridge, mut consumer) = bridge(BASE + 0xff0);
        let command = ActionCommand::new(1.0, 0.0, 0.0, 0);
        consumer.publish_action(&command);
        let outcome = bridge.on_tick();
        assert_eq!(outcome.published, None);
        assert!(outcome.applied);
        assert_eq!(bridge.stats().capture_failures(), 1);
        assert_eq!(
            memory.bytes(INPUT, 16).unwrap(),
            command.packed_input().to_vec()
        );
    }

    #[test]
    fn unhook_waits_for_a_tick_in_flight() {
        let (memory, bridge, _consumer) = bridge(BASE + 0x40);
        let target = BASE + 0xa00;
        memory.mark_executable(target, 0x40);
        memory.write(target, &[0x55; 16]).unwrap();
        let binding =
            HookBinding::activate(memory.clone(), HookSite::new(target, 16), BASE + 0xc00).unwrap();

        let bridge = Arc::new(Mutex::new(bridge));
        let tick_done = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();
        let in_flight = thread::spawn({
            let bridge = bridge.clone();
            let tick_done = tick_done.clone();
            move || {
                let mut bridge = bridge.lock().unwrap();
                entered_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(20));
                bridge.on_tick();
                tick_done.store(true, Ordering::SeqCst);
            }
        });
        entered_rx.recv().unwrap();

        unhook(Some(binding), &bridge).unwrap();
        assert!(tick_done.load(Ordering::SeqCst));
        assert_eq!(memory.bytes(target, 16).unwrap(), vec![0x55; 16]);
        in_flight.join().unwrap();

        unhook(None, &bridge).unwrap();
        assert_eq!(bridge.lock().unwrap().stats().ticks(), 1);
    }
}
