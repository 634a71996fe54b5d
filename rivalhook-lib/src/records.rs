mod action;
mod snapshot;

use bytes::{Buf, BufMut};
use thiserror::Error;

pub use action::ActionCommand;
pub use snapshot::{SimulationSnapshot, COOLDOWN_SLOTS, ENTITY_COUNT, VECTOR_WIDTH};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("record must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// A fixed-shape value exchanged over a lane.
///
/// Every field is little-endian and written in declaration order; there is no
/// length prefix and no version field, so both ends must agree on `WIRE_SIZE`.
pub trait Record: Sized {
    const WIRE_SIZE: usize;

    fn put<B: BufMut>(&self, buf: &mut B);

    /// `buf` must hold at least `WIRE_SIZE` bytes.
    fn get<B: Buf>(buf: &mut B) -> Self;

    fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        self.put(&mut buf);
        debug_assert_eq!(buf.len(), Self::WIRE_SIZE);
        buf
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(WireError::Length {
                expected: Self::WIRE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = bytes;
        Ok(Self::get(&mut buf))
    }
}

/// A record together with the lane sequence number it was published under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sequenced<R> {
    pub sequence: u64,
    pub record: R,
}
