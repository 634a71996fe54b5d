//! Fixed-capacity rings of records in shared memory.
//!
//! ```text
//! header (64 bytes):
//!   [0:8]    magic "RHLANE01"
//!   [8:12]   record size (u32)
//!   [12:16]  capacity (u32)
//!   [16:24]  write sequence (u64, atomic, 0 = never written)
//!   [24:64]  zero
//! then `capacity` slots:
//!   [0:8]    stamp (u64, atomic): sequence of the record in the slot, BUSY while written
//!   [8:..]   record bytes, padded to 8
//! ```
//!
//! A lane has exactly one writer and one reader. The writer never waits; the
//! reader takes the newest record and accepts a copy only if the slot stamp is
//! unchanged across the copy.

use std::{
    fs::OpenOptions,
    io,
    marker::PhantomData,
    path::Path,
    ptr,
    sync::{
        atomic::{fence, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use derive_new::new;
use getset::CopyGetters;
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    records::{Record, Sequenced},
};

const MAGIC: &[u8; 8] = b"RHLANE01";
const HEADER_SIZE: usize = 64;
const OFFSET_RECORD_SIZE: usize = 8;
const OFFSET_CAPACITY: usize = 12;
const OFFSET_WRITE_SEQUENCE: usize = 16;
const STAMP_SIZE: usize = 8;
const BUSY: u64 = u64::MAX;

/// Largest number of slots a lane may have.
pub const MAX_CAPACITY: usize = 4096;

/// Upper bound of a single pause between read attempts while polling.
const POLL_BACKOFF: Duration = Duration::from_micros(50);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to map lane {tag}: {source}")]
    Io {
        tag: String,
        #[source]
        source: io::Error,
    },
    #[error("lane capacity must be at least 1")]
    ZeroCapacity,
    #[error("lane capacity {capacity} exceeds {max}")]
    CapacityTooLarge { capacity: usize, max: usize },
    #[error("{record_size}-byte records do not fit a lane header")]
    RecordTooLarge { record_size: usize },
    #[error("lane holds {actual}-byte records, expected {expected}")]
    RecordSize { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, new)]
#[getset(get_copy = "pub")]
pub struct LaneLayout {
    record_size: usize,
    capacity: usize,
}

impl LaneLayout {
    pub fn for_record<R: Record>(capacity: usize) -> Self {
        Self::new(R::WIRE_SIZE, capacity)
    }

    fn slot_stride(&self) -> usize {
        STAMP_SIZE + self.record_size.next_multiple_of(8)
    }

    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.capacity * self.slot_stride()
    }

    /// [`Self::total_size`] for layouts that can actually be mapped and
    /// described by the header.
    fn checked_total_size(&self) -> Result<usize, ChannelError> {
        if self.capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ChannelError::CapacityTooLarge {
                capacity: self.capacity,
                max: MAX_CAPACITY,
            });
        }
        u32::try_from(self.record_size)
            .ok()
            .and_then(|_| self.record_size.checked_next_multiple_of(8))
            .and_then(|padded| padded.checked_add(STAMP_SIZE))
            .and_then(|stride| stride.checked_mul(self.capacity))
            .and_then(|slots| slots.checked_add(HEADER_SIZE))
            .ok_or(ChannelError::RecordTooLarge {
                record_size: self.record_size,
            })
    }

    fn slot_offset(&self, sequence: u64) -> usize {
        debug_assert!(sequence > 0);
        let index = ((sequence - 1) % self.capacity as u64) as usize;
        HEADER_SIZE + index * self.slot_stride()
    }
}

/// The mapped memory of one lane.
pub struct RingRegion {
    tag: String,
    layout: LaneLayout,
    base: *mut u8,
    _mmap: MmapMut,
}

// Shared state is only touched through the atomics in the header and slot
// stamps; record bytes are guarded by the stamp protocol.
unsafe impl Send for RingRegion {}
unsafe impl Sync for RingRegion {}

impl RingRegion {
    /// Maps `path`, creating it if needed. An existing ring with the same
    /// layout is kept as is, anything else is reinitialized.
    pub fn attach_file(path: &Path, tag: &str, layout: LaneLayout) -> Result<Self, ChannelError> {
        let total_size = layout.checked_total_size()? as u64;
        let io_error = |source| ChannelError::Io {
            tag: tag.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_error)?;
        if file.metadata().map_err(io_error)?.len() != total_size {
            file.set_len(total_size).map_err(io_error)?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(io_error)?;
        let region = Self::from_mmap(mmap, tag, layout);
        if region.is_initialized() {
            debug!(
                "attached lane {} at {:?} (sequence {})",
                tag,
                path,
                region.write_sequence().load(Ordering::Acquire)
            );
        } else {
            region.initialize();
            info!(
                "created lane {} at {:?} ({} slots x {} bytes)",
                tag, path, layout.capacity, layout.record_size
            );
        }
        Ok(region)
    }

    /// A process-private lane.
    pub fn anonymous(tag: &str, layout: LaneLayout) -> Result<Self, ChannelError> {
        let total_size = layout.checked_total_size()?;
        let mmap = MmapOptions::new()
            .len(total_size)
            .map_anon()
            .map_err(|source| ChannelError::Io {
                tag: tag.to_owned(),
                source,
            })?;
        let region = Self::from_mmap(mmap, tag, layout);
        region.initialize();
        Ok(region)
    }

    fn from_mmap(mut mmap: MmapMut, tag: &str, layout: LaneLayout) -> Self {
        let base = mmap.as_mut_ptr();
        Self {
            tag: tag.to_owned(),
            layout,
            base,
            _mmap: mmap,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn last_sequence(&self) -> u64 {
        self.write_sequence().load(Ordering::Acquire)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le(unsafe { ptr::read_unaligned(self.base.add(offset) as *const u32) })
    }

    fn is_initialized(&self) -> bool {
        let magic = unsafe { std::slice::from_raw_parts(self.base, MAGIC.len()) };
        magic == MAGIC
            && self.read_u32(OFFSET_RECORD_SIZE) as usize == self.layout.record_size
            && self.read_u32(OFFSET_CAPACITY) as usize == self.layout.capacity
    }

    fn initialize(&self) {
        unsafe {
            ptr::write_bytes(self.base, 0, self.layout.total_size());
            ptr::write_unaligned(
                self.base.add(OFFSET_RECORD_SIZE) as *mut u32,
                (self.layout.record_size as u32).to_le(),
            );
            ptr::write_unaligned(
                self.base.add(OFFSET_CAPACITY) as *mut u32,
                (self.layout.capacity as u32).to_le(),
            );
        }
        fence(Ordering::Release);
        unsafe { ptr::copy_nonoverlapping(MAGIC.as_ptr(), self.base, MAGIC.len()) };
    }

    fn write_sequence(&self) -> &AtomicU64 {
        // the mapping is page aligned and the offset is a multiple of 8
        unsafe { &*(self.base.add(OFFSET_WRITE_SEQUENCE) as *const AtomicU64) }
    }

    fn stamp(&self, sequence: u64) -> &AtomicU64 {
        unsafe { &*(self.base.add(self.layout.slot_offset(sequence)) as *const AtomicU64) }
    }

    fn slot_data(&self, sequence: u64) -> *mut u8 {
        unsafe { self.base.add(self.layout.slot_offset(sequence) + STAMP_SIZE) }
    }
}

fn check_record_size<R: Record>(region: &RingRegion) -> Result<(), ChannelError> {
    if region.layout.record_size != R::WIRE_SIZE {
        return Err(ChannelError::RecordSize {
            expected: R::WIRE_SIZE,
            actual: region.layout.record_size,
        });
    }
    Ok(())
}

pub struct LaneWriter<R> {
    region: Arc<RingRegion>,
    scratch: Vec<u8>,
    _record: PhantomData<fn(R)>,
}

impl<R: Record> LaneWriter<R> {
    pub fn new(region: Arc<RingRegion>) -> Result<Self, ChannelError> {
        check_record_size::<R>(&region)?;
        Ok(Self {
            region,
            scratch: Vec::with_capacity(R::WIRE_SIZE),
            _record: PhantomData,
        })
    }

    pub fn tag(&self) -> &str {
        self.region.tag()
    }

    /// Writes `record` into the next slot, replacing the oldest entry once the
    /// ring is full, and returns its sequence number.
    pub fn publish(&mut self, record: &R) -> u64 {
        self.scratch.clear();
        record.put(&mut self.scratch);

        let region = &self.region;
        let sequence = region.write_sequence().load(Ordering::Relaxed) + 1;
        let stamp = region.stamp(sequence);
        stamp.store(BUSY, Ordering::Relaxed);
        fence(Ordering::Release);
        unsafe {
            ptr::copy_nonoverlapping(
                self.scratch.as_ptr(),
                region.slot_data(sequence),
                self.scratch.len(),
            )
        };
        stamp.store(sequence, Ordering::Release);
        region.write_sequence().store(sequence, Ordering::Release);
        sequence
    }
}

pub struct LaneReader<R> {
    region: Arc<RingRegion>,
    scratch: Vec<u8>,
    last_sequence: u64,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> LaneReader<R> {
    /// Starts behind everything already in the lane.
    pub fn new(region: Arc<RingRegion>) -> Result<Self, ChannelError> {
        check_record_size::<R>(&region)?;
        Ok(Self {
            region,
            scratch: vec![0; R::WIRE_SIZE],
            last_sequence: 0,
            _record: PhantomData,
        })
    }

    pub fn tag(&self) -> &str {
        self.region.tag()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Newest record not yet consumed, if it can be read without tearing.
    pub fn try_read(&mut self) -> Option<Sequenced<R>> {
        let region = &self.region;
        let sequence = region.write_sequence().load(Ordering::Acquire);
        if sequence <= self.last_sequence {
            return None;
        }
        let stamp = region.stamp(sequence);
        if stamp.load(Ordering::Acquire) != sequence {
            // lapped by the writer; the next attempt picks up the newer record
            return None;
        }
        unsafe {
            ptr::copy_nonoverlapping(
                region.slot_data(sequence),
                self.scratch.as_mut_ptr(),
                self.scratch.len(),
            )
        };
        fence(Ordering::Acquire);
        if stamp.load(Ordering::Relaxed) != sequence {
            return None;
        }
        let record = R::from_wire(&self.scratch).ok()?;
        self.last_sequence = sequence;
        Some(Sequenced { sequence, record })
    }

    /// Retries [`Self::try_read`] until it yields or `max_wait` has elapsed on
    /// `clock`. Never pauses past the deadline.
    pub fn poll(&mut self, max_wait: Duration, clock: &impl Clock) -> Option<Sequenced<R>> {
        let start = clock.now();
        loop {
            if let Some(record) = self.try_read() {
                return Some(record);
            }
            let elapsed = clock.now().saturating_sub(start);
            if elapsed >= max_wait {
                return None;
            }
            clock.pause((max_wait - elapsed).min(POLL_BACKOFF));
        }
    }
}

/// A writer and a reader sharing one process-private lane.
pub fn anonymous_lane<R: Record>(
    tag: &str,
    capacity: usize,
) -> Result<(LaneWriter<R>, LaneReader<R>), ChannelError> {
    let region = Arc::new(RingRegion::anonymous(
        tag,
        LaneLayout::for_record::<R>(capacity),
    )?);
    Ok((LaneWriter::new(region.clone())?, LaneReader::new(region)?))
}
