use bytes::{Buf, BufMut};

use super::Record;

/// One frame of controller input chosen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActionCommand {
    pub move_x: f32,
    pub move_y: f32,
    pub look_yaw: f32,
    pub button_bits: u32,
    /// `false` means the consumer has no decision for this frame.
    pub valid: bool,
}

impl ActionCommand {
    /// Byte width of the input block the host reads, i.e. every field but `valid`.
    pub const PACKED_INPUT_SIZE: usize = 16;

    pub fn new(move_x: f32, move_y: f32, look_yaw: f32, button_bits: u32) -> Self {
        Self {
            move_x,
            move_y,
            look_yaw,
            button_bits,
            valid: true,
        }
    }

    pub fn absent() -> Self {
        Self::default()
    }

    pub fn packed_input(&self) -> [u8; Self::PACKED_INPUT_SIZE] {
        let mut packed = [0u8; Self::PACKED_INPUT_SIZE];
        let mut buf = &mut packed[..];
        buf.put_f32_le(self.move_x);
        buf.put_f32_le(self.move_y);
        buf.put_f32_le(self.look_yaw);
        buf.put_u32_le(self.button_bits);
        packed
    }
}

impl Record for ActionCommand {
    // native {f32, f32, f32, u32, bool} including trailing padding
    const WIRE_SIZE: usize = Self::PACKED_INPUT_SIZE + 4;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.packed_input());
        buf.put_u8(self.valid as u8);
        buf.put_bytes(0, 3);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        let move_x = buf.get_f32_le();
        let move_y = buf.get_f32_le();
        let look_yaw = buf.get_f32_le();
        let button_bits = buf.get_u32_le();
        let valid = buf.get_u8() != 0;
        buf.advance(3);
        Self {
            move_x,
            move_y,
            look_yaw,
            button_bits,
            valid,
        }
    }
}
