use alloc::vec::Vec;

use crate::registers::Window;
use crate::{MachineError, ProgramCounter};

/// Index of a frame slot in the [`CallStack`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHandle(usize);

/// Where a returning frame hands control and its result back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReturnLink {
    pub caller: FrameHandle,
    pub resume_pc: ProgramCounter,
    /// Absolute register in the caller's window receiving the result.
    pub destination: usize,
}

/// One call in progress. The root frame has no [`ReturnLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub window: Window,
    pub link: Option<ReturnLink>,
}

/// Arena of frames linked from the current frame back to the root.
///
/// Slots are recycled through a free list. The free list always has room for
/// every slot, so popping a frame never allocates.
#[derive(Debug, Default)]
pub struct CallStack {
    slots: Vec<Option<Frame>>,
    free: Vec<FrameHandle>,
    current: Option<FrameHandle>,
    live: usize,
    max_frames: Option<usize>,
}

impl CallStack {
    pub fn new(max_frames: Option<usize>) -> Self {
        Self {
            max_frames,
            ..Self::default()
        }
    }

    /// Frames created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn current(&self) -> Option<FrameHandle> {
        self.current
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.and_then(|handle| self.get(handle))
    }

    pub fn get(&self, handle: FrameHandle) -> Option<&Frame> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    /// Push the frame of an `execute` call.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already live.
    pub fn push_root(&mut self, window: Window) -> Result<FrameHandle, MachineError> {
        assert!(self.current.is_none(), "root frame pushed over a live frame");
        self.push(Frame { window, link: None })
    }

    /// Push a callee of the current frame.
    pub fn push_call(
        &mut self,
        window: Window,
        resume_pc: ProgramCounter,
        destination: usize,
    ) -> Result<FrameHandle, MachineError> {
        let Some(caller) = self.current else {
            unreachable!("call without a live caller frame");
        };
        let link = ReturnLink {
            caller,
            resume_pc,
            destination,
        };
        self.push(Frame {
            window,
            link: Some(link),
        })
    }

    /// Destroy the current frame and make its caller current.
    pub fn pop(&mut self) -> Option<Frame> {
        let handle = self.current?;
        let frame = self.slots.get_mut(handle.0)?.take()?;
        self.free.push(handle);
        self.current = frame.link.map(|link| link.caller);
        self.live -= 1;
        trace!("frame {} destroyed, {} live", handle.0, self.live);
        Some(frame)
    }

    /// Destroy every live frame from the current one back to the root.
    /// Returns how many frames were destroyed.
    pub fn unwind(&mut self) -> usize {
        let mut destroyed = 0;
        while self.pop().is_some() {
            destroyed += 1;
        }
        destroyed
    }

    fn push(&mut self, frame: Frame) -> Result<FrameHandle, MachineError> {
        if self.max_frames.is_some_and(|limit| self.live >= limit) {
            return Err(MachineError::CallStackExhausted { depth: self.live });
        }
        let handle = match self.free.pop() {
            Some(handle) => {
                let slot = &mut self.slots[handle.0];
                debug_assert!(slot.is_none(), "free frame slot {} is occupied", handle.0);
                *slot = Some(frame);
                handle
            }
            None => {
                let exhausted = MachineError::CallStackExhausted { depth: self.live };
                self.slots.try_reserve(1).map_err(|_| exhausted)?;
                let slot_count = self.slots.len() + 1;
                self.free
                    .try_reserve(slot_count.saturating_sub(self.free.len()))
                    .map_err(|_| exhausted)?;
                self.slots.push(Some(frame));
                FrameHandle(self.slots.len() - 1)
            }
        };
        self.current = Some(handle);
        self.live += 1;
        trace!("frame {} created, {} live", handle.0, self.live);
        Ok(handle)
    }
}
