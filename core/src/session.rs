use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::info;

/// Per-stream status. Reset whenever the viewed stream changes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Opaque identifier of the viewing session, in practice the page URL.
    pub current_stream_identifier: String,
    pub is_quality_applied: bool,
    /// Bumped on every identifier change so that a selection started for an
    /// earlier stream cannot mark a later one applied.
    pub generation: u64,
}

/// Shared handle to the session state plus the guard that keeps two
/// selection runs from overlapping.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    in_flight: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn is_applied(&self) -> bool {
        self.lock().is_quality_applied
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Records the identifier reported by the host. Returns `true` when it
    /// differs from the current one, in which case the applied flag is reset.
    pub fn observe_identifier(&self, identifier: &str) -> bool {
        let mut state = self.lock();
        if state.current_stream_identifier == identifier {
            return false;
        }
        info!(
            from = %state.current_stream_identifier,
            to = %identifier,
            "Detected stream change, will apply quality preferences"
        );
        state.current_stream_identifier = identifier.to_string();
        state.is_quality_applied = false;
        state.generation += 1;
        true
    }

    /// Marks the session applied if it is still the one `generation` refers
    /// to. Returns whether the flag was set.
    pub fn mark_applied(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.is_quality_applied = true;
        true
    }

    /// Claims the single selection slot. `None` while another run holds it.
    pub fn try_begin_run(&self) -> Option<RunGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RunGuard {
            in_flight: Arc::clone(&self.in_flight),
            generation: self.generation(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Held for the duration of one selection run; releases the slot on drop.
#[derive(Debug)]
pub struct RunGuard {
    in_flight: Arc<AtomicBool>,
    generation: u64,
}

impl RunGuard {
    /// Generation of the session the run started in.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
