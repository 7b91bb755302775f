//! Fixed pool of equally sized PCM buffers.
//!
//! The pool owns `N` heap buffers for its whole lifetime. A buffer leaves the pool only
//! when it is checked out for submission to the device and comes back through
//! [`BufferPool::reclaim`] when the device reports it played. Moving a [`PcmBuffer`] moves
//! the handle, never the heap block, so the address the device sees stays fixed.

use crate::error::PoolError;

/// Lifecycle of a pool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// In the pool, holding data that may be submitted.
    Idle,
    /// Being rewritten by the engine.
    Refilling,
    /// On loan to the device until its completion notification.
    Submitted,
}

/// One fixed-capacity PCM buffer.
#[derive(Debug)]
pub struct PcmBuffer {
    index: usize,
    data: Box<[u8]>,
    valid_len: usize,
}

impl PcmBuffer {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of leading bytes that hold audio.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// The meaningful bytes of the buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.valid_len]
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Rewrite the buffer in place. `fill` gets the whole capacity and returns how many
    /// bytes it wrote.
    pub fn refill_with<F>(&mut self, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let written = fill(&mut self.data).min(self.data.len());
        self.valid_len = written;
        written
    }
}

#[derive(Debug)]
struct Slot {
    buffer: Option<PcmBuffer>,
    state: BufferState,
    addr: usize,
}

/// Arena of `N` buffers indexed `0..N`.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    bytes_per_buffer: usize,
}

impl BufferPool {
    /// Allocate `count` zero-filled (silent) buffers of `bytes_per_buffer` bytes each.
    pub fn allocate(count: usize, bytes_per_buffer: usize) -> Result<Self, PoolError> {
        if count == 0 || bytes_per_buffer == 0 {
            return Err(PoolError::EmptyPool);
        }
        let slots = (0..count)
            .map(|index| {
                let data = vec![0u8; bytes_per_buffer].into_boxed_slice();
                let addr = data.as_ptr() as usize;
                Slot {
                    buffer: Some(PcmBuffer {
                        index,
                        data,
                        valid_len: bytes_per_buffer,
                    }),
                    state: BufferState::Idle,
                    addr,
                }
            })
            .collect();
        tracing::debug!(count, bytes_per_buffer, "buffer pool allocated");
        Ok(Self {
            slots,
            bytes_per_buffer,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<BufferState> {
        self.slots.get(index).map(|s| s.state)
    }

    /// Buffers currently on loan to the device.
    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == BufferState::Submitted)
            .count()
    }

    /// Read access to a buffer that is home.
    pub fn get(&self, index: usize) -> Option<&PcmBuffer> {
        self.slots.get(index).and_then(|s| s.buffer.as_ref())
    }

    /// Mark buffer `index` as being refilled and hand out mutable access to it.
    pub fn begin_refill(&mut self, index: usize) -> Result<&mut PcmBuffer, PoolError> {
        let slot = self.slots.get_mut(index).ok_or(PoolError::OutOfRange(index))?;
        let buffer = slot.buffer.as_mut().ok_or(PoolError::OnLoan(index))?;
        slot.state = BufferState::Refilling;
        Ok(buffer)
    }

    /// Take buffer `index` out of the pool for submission.
    pub fn checkout(&mut self, index: usize) -> Result<PcmBuffer, PoolError> {
        let slot = self.slots.get_mut(index).ok_or(PoolError::OutOfRange(index))?;
        let buffer = slot.buffer.take().ok_or(PoolError::OnLoan(index))?;
        slot.state = BufferState::Submitted;
        Ok(buffer)
    }

    /// Return a buffer the device has finished with. Returns its index.
    pub fn reclaim(&mut self, buffer: PcmBuffer) -> Result<usize, PoolError> {
        let index = buffer.index;
        let expected = self.bytes_per_buffer;
        let slot = self.slots.get_mut(index).ok_or(PoolError::OutOfRange(index))?;
        if slot.buffer.is_some() {
            return Err(PoolError::AlreadyHome(index));
        }
        if buffer.as_ptr() as usize != slot.addr {
            return Err(PoolError::Foreign {
                index,
                len: buffer.capacity(),
                expected,
            });
        }
        slot.buffer = Some(buffer);
        slot.state = BufferState::Idle;
        Ok(index)
    }

    /// Free every buffer. Refused while any buffer is still on loan.
    pub fn release(&mut self) -> Result<usize, PoolError> {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            return Err(PoolError::Outstanding(outstanding));
        }
        let freed = self.slots.len();
        self.slots.clear();
        tracing::debug!(freed, "buffer pool released");
        Ok(freed)
    }
}
