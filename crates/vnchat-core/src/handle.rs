//! Shared run state for the turn pipeline.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    error::{Error, Result},
    orchestrator::TurnState,
};

/// Tracks whether a turn is running and which pipeline state it is in.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<TurnState>>,
    is_running: Arc<AtomicBool>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TurnState::Idle)),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark a turn as running. Fails if one already is.
    pub(crate) fn begin(&self) -> Result<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::TurnInProgress)?;
        Ok(RunGuard {
            handle: self.clone(),
        })
    }

    pub(crate) fn set_state(&self, state: TurnState) {
        *self.state.lock() = state;
    }

    /// Current pipeline state
    pub fn state(&self) -> TurnState {
        *self.state.lock()
    }
}

/// Clears the running flag when dropped, including when the turn future is
/// dropped mid-flight.
pub(crate) struct RunGuard {
    handle: SessionHandle,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.handle.set_state(TurnState::Idle);
        self.handle.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_exclusive() {
        let handle = SessionHandle::new();
        let guard = handle.begin().unwrap();
        assert!(matches!(handle.begin(), Err(Error::TurnInProgress)));
        drop(guard);
        assert!(handle.begin().is_ok());
    }

    #[test]
    fn test_guard_resets_state() {
        let handle = SessionHandle::new();
        let guard = handle.begin().unwrap();
        handle.set_state(TurnState::Narrating);
        assert_eq!(handle.state(), TurnState::Narrating);
        drop(guard);
        assert_eq!(handle.state(), TurnState::Idle);
    }
}
