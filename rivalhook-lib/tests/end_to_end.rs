use std::{sync::Arc, time::Duration};

use rivalhook_lib::{
    in_process_pair,
    memory_accessors::{MemoryAccessor, SyntheticMemory},
    ActionCommand, AddressTable, Clock, HookBinding, HookSite, ManualClock, Record,
    StateAddresses, TickBridge,
};

const BASE: usize = 0x1_4000_0000;
const TICK: usize = BASE + 0x1000;
const HANDLER: usize = BASE + 0x1800;

fn table() -> AddressTable {
    AddressTable {
        tick: HookSite::new(TICK, 16),
        state: StateAddresses {
            entity_health: BASE + 0x3000,
            entity_position: BASE + 0x3100,
            entity_cooldowns: BASE + 0x3200,
            objective_progress: BASE + 0x3400,
        },
        input_action: BASE + 0x2000,
    }
}

fn host_memory() -> Arc<SyntheticMemory> {
    let memory = SyntheticMemory::new(BASE, 0x4000);
    memory.mark_executable(TICK, 0x100);
    let mut prologue = vec![
        0x48, 0x83, 0xec, 0x28, // sub rsp, 0x28
        0x0f, 0x29, 0x74, 0x24, 0x10, // movaps [rsp+0x10], xmm6
    ];
    prologue.resize(16, 0x90);
    memory.write(TICK, &prologue).unwrap();
    Arc::new(memory)
}

#[test]
fn snapshot_out_action_in() {
    let memory = host_memory();
    let table = table();
    memory
        .write(table.state.entity_health, &100.0f32.to_le_bytes())
        .unwrap();
    memory
        .write(table.state.objective_progress, &3i32.to_le_bytes())
        .unwrap();
    let original_prologue = memory.bytes(TICK, 16).unwrap();

    let mut binding = HookBinding::activate(memory.clone(), table.tick, HANDLER).unwrap();
    assert_ne!(memory.bytes(TICK, 16).unwrap(), original_prologue);

    let (host, mut consumer) = in_process_pair(8).unwrap();
    let mut bridge = TickBridge::new(
        memory.clone(),
        &table,
        host,
        ManualClock::new(),
        Duration::from_millis(1),
        0,
    );
    let consumer_clock = ManualClock::new();

    // first tick: nobody has answered yet
    let outcome = bridge.on_tick();
    assert_eq!(outcome.published, Some(1));
    assert_eq!(outcome.action, None);
    assert_eq!(bridge.clock().now(), Duration::from_millis(1));

    let snapshot = consumer
        .poll_state(Duration::from_millis(5), &consumer_clock)
        .unwrap();
    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.record.entity_health[0].to_bits(), 100.0f32.to_bits());
    assert_eq!(snapshot.record.objective_progress, 3);
    let mut expected = vec![0u8; 580];
    expected[..4].copy_from_slice(&100.0f32.to_le_bytes());
    expected[576..].copy_from_slice(&3i32.to_le_bytes());
    assert_eq!(snapshot.record.to_wire(), expected);

    let command = ActionCommand::new(0.5, -0.2, 10.0, 0b0001);
    consumer.publish_action(&command);

    let outcome = bridge.on_tick();
    assert!(outcome.applied);
    let mut packed = Vec::new();
    packed.extend_from_slice(&0.5f32.to_le_bytes());
    packed.extend_from_slice(&(-0.2f32).to_le_bytes());
    packed.extend_from_slice(&10.0f32.to_le_bytes());
    packed.extend_from_slice(&1u32.to_le_bytes());
    assert_eq!(memory.bytes(table.input_action, 16).unwrap(), packed);

    // the consumer goes quiet; the last input stays in place
    let outcome = bridge.on_tick();
    assert_eq!(outcome.action, None);
    assert_eq!(memory.bytes(table.input_action, 16).unwrap(), packed);

    let stats = bridge.stats();
    assert_eq!(stats.ticks(), 3);
    assert_eq!(stats.published(), 3);
    assert_eq!(stats.actions_applied(), 1);
    assert_eq!(stats.actions_missed(), 2);

    binding.deactivate().unwrap();
    assert_eq!(memory.bytes(TICK, 16).unwrap(), original_prologue);
}
