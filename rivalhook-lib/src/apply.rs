use anyhow::Result;
use derive_new::new;

use crate::{memory_accessors::MemoryAccessor, records::ActionCommand};

/// Writes actions into the host's input block.
#[derive(Debug, Clone, Copy, new)]
pub struct ActionApply {
    input_action: usize,
}

impl ActionApply {
    /// Returns whether anything was written. An invalid command keeps the
    /// previous input instead of clearing it.
    pub fn apply(&self, memory: &impl MemoryAccessor, command: &ActionCommand) -> Result<bool> {
        if !command.valid {
            return Ok(false);
        }
        memory.write(self.input_action, &command.packed_input())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_accessors::SyntheticMemory;

    const INPUT: usize = 0x2040;

    #[test]
    fn writes_packed_layout() {
        let memory = SyntheticMemory::new(0x2000, 0x100);
        let command = ActionCommand::new(0.5, -0.2, 10.0, 0b0001);
        assert!(ActionApply::new(INPUT).apply(&memory, &command).unwrap());
        assert_eq!(
            memory.bytes(INPUT, 16).unwrap(),
            command.packed_input().to_vec()
        );
        assert_eq!(memory.bytes(INPUT + 16, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn invalid_command_keeps_previous_input() {
        let memory = SyntheticMemory::new(0x2000, 0x100);
        let apply = ActionApply::new(INPUT);
        let previous = ActionCommand::new(1.0, 1.0, 0.0, 0b1010);
        apply.apply(&memory, &previous).unwrap();

        let mut ignored = ActionCommand::new(-1.0, 0.0, 3.0, 0);
        ignored.valid = false;
        assert!(!apply.apply(&memory, &ignored).unwrap());
        assert_eq!(
            memory.bytes(INPUT, 16).unwrap(),
            previous.packed_input().to_vec()
        );
    }
}
