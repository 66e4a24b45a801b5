//! Write-write dependency lock
//!
//! A fair (FIFO) lock with bounded acquisition. It is not tied to a thread or
//! a guard: a transaction acquires it at registration and releases it when
//! its commit or abort completes, possibly from another call site.
//!
//! Waiters queue by ticket. A newcomer never barges past a queued waiter, and
//! a waiter that times out or is interrupted removes its ticket before
//! returning, so a failed acquisition leaves the lock exactly as it was.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{AtlasError, Result};

/// Fair lock used to signal ww-dependencies
pub struct WwLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

struct LockState {
    held: bool,
    queue: VecDeque<u64>,
    next_ticket: u64,
    interrupt_epoch: u64,
}

impl WwLock {
    pub fn new() -> Self {
        Self::with_held(false)
    }

    /// A lock that starts out held by its creator
    pub(crate) fn new_held() -> Self {
        Self::with_held(true)
    }

    fn with_held(held: bool) -> Self {
        Self {
            state: Mutex::new(LockState {
                held,
                queue: VecDeque::new(),
                next_ticket: 0,
                interrupt_epoch: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquire without waiting. Fails if held or if anyone is queued.
    pub fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if !state.held && state.queue.is_empty() {
            state.held = true;
            true
        } else {
            false
        }
    }

    /// Acquire, waiting at most `timeout` behind earlier waiters
    pub fn lock(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);

        let mut state = self.state.lock();
        if !state.held && state.queue.is_empty() {
            state.held = true;
            return Ok(());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        let epoch = state.interrupt_epoch;

        loop {
            if !state.held && state.queue.front() == Some(&ticket) {
                state.queue.pop_front();
                state.held = true;
                return Ok(());
            }

            if state.interrupt_epoch != epoch {
                state.queue.retain(|t| *t != ticket);
                drop(state);
                self.cond.notify_all();
                return Err(AtlasError::Interrupted("ww-lock wait interrupted".to_string()));
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        state.queue.retain(|t| *t != ticket);
                        drop(state);
                        // The head of the queue may have changed
                        self.cond.notify_all();
                        return Err(AtlasError::Timeout {
                            what: "ww-lock",
                            waited: started.elapsed(),
                        });
                    }
                    self.cond.wait_until(&mut state, deadline);
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Release the lock
    pub fn unlock(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.held {
            return Err(AtlasError::IllegalState(
                "ww-lock released while not held".to_string(),
            ));
        }
        state.held = false;
        drop(state);
        self.cond.notify_all();
        Ok(())
    }

    /// Acquire and immediately release: returns once the current holder is done
    pub fn await_release(&self, timeout: Duration) -> Result<()> {
        self.lock(timeout)?;
        self.unlock()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().held
    }

    /// Neither held nor waited on
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        !state.held && state.queue.is_empty()
    }

    /// Number of threads queued behind the holder
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Wake every queued waiter with `AtlasError::Interrupted`
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupt_epoch += 1;
        drop(state);
        self.cond.notify_all();
    }
}

impl Default for WwLock {
    fn default() -> Self {
        Self::new()
    }
}
