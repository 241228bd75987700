//! Event debouncing for directory watches.
//!
//! Editors and tools often emit several raw notifications per save (truncate,
//! write, rename-over, chmod). The debouncer folds them into one event per
//! file, emitted once the file has been quiet for the debounce window.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::event::{FileEvent, FileEventKind};

/// Pending event waiting to be emitted.
struct PendingEvent {
    kind: FileEventKind,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    pending: HashMap<PathBuf, PendingEvent>,
    /// Paths already announced as created by the initial scan.
    scanned: HashSet<PathBuf>,
}

/// Thread-safe per-path event debouncer.
pub(crate) struct EventDebouncer {
    state: Mutex<State>,
    window: Duration,
}

impl EventDebouncer {
    /// Create a new debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            window,
        }
    }

    /// Remember paths the initial scan reported as created.
    ///
    /// The watch is registered before the scan, so such a path may also have
    /// a pending `Created`. If that cancels against a later `Removed`, the
    /// removal is still emitted so the scan's creation is undone.
    pub fn mark_scanned(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.scanned.extend(paths);
    }

    /// Record a raw event, restarting the path's quiet window.
    ///
    /// Called from the notify callback thread.
    pub fn record(&self, path: PathBuf, kind: FileEventKind) {
        use std::collections::hash_map::Entry;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let State { pending, scanned } = &mut *state;
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingEvent { kind, deadline });
            }
            Entry::Occupied(mut entry) => match Self::coalesce(entry.get().kind, kind) {
                Some(kind) => {
                    *entry.get_mut() = PendingEvent { kind, deadline };
                }
                None if scanned.contains(entry.key()) => {
                    *entry.get_mut() = PendingEvent {
                        kind: FileEventKind::Removed,
                        deadline,
                    };
                }
                // Created then removed inside one window: nothing to sync.
                None => {
                    entry.remove();
                }
            },
        }
    }

    /// Fold a new event kind into a pending one.
    ///
    /// Returns `None` when the pair cancels out.
    #[allow(clippy::match_same_arms)]
    fn coalesce(pending: FileEventKind, new: FileEventKind) -> Option<FileEventKind> {
        use FileEventKind::{Created, Modified, Removed};

        match (pending, new) {
            (Created, Created) => Some(Created),
            (Created, Modified) => Some(Created),
            (Created, Removed) => None,

            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            // Replaced in place (e.g. atomic save via rename).
            (Removed, Created) => Some(Modified),
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Take every event whose quiet window has elapsed.
    ///
    /// Events are returned oldest deadline first.
    pub fn drain_ready(&self) -> Vec<FileEvent> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut ready: Vec<_> = state
            .pending
            .extract_if(|_, event| event.deadline <= now)
            .collect();
        drop(state);

        ready.sort_by_key(|(_, event)| event.deadline);
        ready
            .into_iter()
            .map(|(path, event)| FileEvent {
                path,
                kind: event.kind,
            })
            .collect()
    }
}
