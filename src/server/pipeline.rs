//! Ordered response slots of one HTTP/1.1 connection.
//!
//! Every dispatched request reserves a slot. Its responder writes into the
//! slot from whatever task runs the handler; the connection only flushes
//! bytes from the front slot, so responses leave in request order no matter
//! when their handlers finish.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

pub(crate) struct Pipeline {
    state: Mutex<PipelineState>,
    /// Wakes the connection when there may be something to flush.
    output: Notify,
    /// Wakes producers waiting for their buffered bytes to drain.
    drained: Notify,
}

struct PipelineState {
    slots: VecDeque<Slot>,
    next_id: u64,
    closed: bool,
}

struct Slot {
    id: u64,
    buffer: Vec<u8>,
    done: bool,
    close_after: bool,
}

/// Bytes ready for the socket, taken from the front of the queue.
#[derive(Debug, Default)]
pub(crate) struct Output {
    pub(crate) bytes: Vec<u8>,
    /// Responses completed by these bytes.
    pub(crate) completed: usize,
    /// The last completed response ends the connection.
    pub(crate) close: bool,
}

impl Pipeline {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState {
                slots: VecDeque::new(),
                next_id: 0,
                closed: false,
            }),
            output: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Appends an empty slot and returns its id.
    pub(crate) fn reserve(&self) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.slots.push_back(Slot {
            id,
            buffer: Vec::new(),
            done: false,
            close_after: false,
        });
        id
    }

    /// Buffers `data` in slot `id`.
    ///
    /// Returns `false` once the connection is gone; the bytes are dropped.
    pub(crate) fn write(&self, id: u64, data: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            match state.slot_mut(id) {
                Some(slot) if !slot.done => slot.buffer.extend_from_slice(data),
                _ => return false,
            }
        }

        self.output.notify_one();
        true
    }

    /// Marks slot `id` complete. Later writes to it are refused.
    pub(crate) fn finish(&self, id: u64, close_after: bool) {
        {
            let mut state = self.state.lock();
            if let Some(slot) = state.slot_mut(id) {
                slot.done = true;
                slot.close_after |= close_after;
            }
        }
        self.output.notify_one();
    }

    /// Bytes of slot `id` not yet taken by the connection.
    pub(crate) fn outstanding(&self, id: u64) -> usize {
        let mut state = self.state.lock();
        state.slot_mut(id).map_or(0, |slot| slot.buffer.len())
    }

    /// Waits until slot `id` holds at most `limit` unflushed bytes.
    ///
    /// Returns `false` when the connection closed meanwhile.
    pub(crate) async fn wait_below(&self, id: u64, limit: usize) -> bool {
        loop {
            let drained = self.drained.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return false;
                }
                match state.slot_mut(id) {
                    Some(slot) if slot.buffer.len() > limit => {}
                    _ => return true,
                }
            }
            drained.await;
        }
    }

    /// Waits for [`write`](Self::write) or [`finish`](Self::finish) on any slot.
    pub(crate) async fn wait_output(&self) {
        self.output.notified().await;
    }

    /// Drains the front of the queue: every completed slot plus whatever the
    /// first unfinished slot has buffered so far.
    pub(crate) fn take_output(&self) -> Output {
        let mut state = self.state.lock();
        let mut output = Output::default();

        while let Some(front) = state.slots.front_mut() {
            output.bytes.append(&mut front.buffer);
            if !front.done {
                break;
            }

            output.completed += 1;
            output.close = front.close_after;
            state.slots.pop_front();
            if output.close {
                state.slots.clear();
                break;
            }
        }
        output
    }

    /// Signals that taken bytes reached the socket.
    pub(crate) fn written(&self) {
        self.drained.notify_waiters();
    }

    /// Slots reserved and not yet fully flushed.
    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Turns every outstanding responder into a zombie.
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.slots.clear();
        }
        self.drained.notify_waiters();
        self.output.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl PipelineState {
    #[inline]
    fn slot_mut(&mut self, id: u64) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }
}
