//! Flow control state for a connection pair.
//!
//! Models the inbound-read pause/resume cycle as an explicit two-state
//! machine: the copier suspends while the outbound socket cannot absorb more
//! bytes and resumes once the destination drains. Keeping the machine
//! separate from the socket code makes the backpressure transitions testable
//! on their own.

/// Whether a copier is currently reading from the inbound socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Inbound reads proceed and blocks are forwarded as they arrive.
    Flowing,
    /// The outbound socket cannot absorb more; inbound reads are withheld
    /// until the destination drains.
    Suspended,
}

/// Per-pair flow state with a transition counter.
#[derive(Debug, Clone)]
pub struct FlowControl {
    state: FlowState,
    suspensions: u64,
}

impl FlowControl {
    pub fn new() -> Self {
        Self {
            state: FlowState::Flowing,
            suspensions: 0,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.state == FlowState::Suspended
    }

    /// Enter `Suspended`. Returns true when this call performed the
    /// transition, false when already suspended.
    pub fn suspend(&mut self) -> bool {
        if self.state == FlowState::Flowing {
            self.state = FlowState::Suspended;
            self.suspensions += 1;
            true
        } else {
            false
        }
    }

    /// Return to `Flowing` once the destination has drained.
    pub fn resume(&mut self) {
        self.state = FlowState::Flowing;
    }

    /// How many times this pair has been suspended.
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}
