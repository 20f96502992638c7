//! Slots for the sessions the simulator cares about. The router looks
//! the exit session up on every send instead of holding a reference, so
//! a disconnect is a local state change rather than an aliasing hazard.

use crate::engine::EngineSession;
use dashmap::DashMap;
use fixlab_common::SessionKey;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct SessionRegistry {
    entry: Mutex<Option<Arc<dyn EngineSession>>>,
    exit: Mutex<Option<Arc<dyn EngineSession>>>,
    entry_acquired: AtomicBool,
    exit_acquired: AtomicBool,
    /// Sessions matching neither endpoint, with the number of frames
    /// silently consumed from each.
    observed: DashMap<SessionKey, u64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_entry(&self, session: Arc<dyn EngineSession>) {
        *self.entry.lock() = Some(session);
        self.entry_acquired.store(true, Ordering::SeqCst);
    }

    pub fn set_exit(&self, session: Arc<dyn EngineSession>) {
        *self.exit.lock() = Some(session);
        self.exit_acquired.store(true, Ordering::SeqCst);
    }

    pub fn entry(&self) -> Option<Arc<dyn EngineSession>> {
        self.entry.lock().clone()
    }

    pub fn exit(&self) -> Option<Arc<dyn EngineSession>> {
        self.exit.lock().clone()
    }

    pub fn exit_if_connected(&self) -> Option<Arc<dyn EngineSession>> {
        self.exit().filter(|s| s.is_connected())
    }

    pub fn entry_acquired(&self) -> bool {
        self.entry_acquired.load(Ordering::SeqCst)
    }

    pub fn exit_acquired(&self) -> bool {
        self.exit_acquired.load(Ordering::SeqCst)
    }

    /// Both endpoints acquired with live connections.
    pub fn both_connected(&self) -> bool {
        self.entry_acquired()
            && self.exit_acquired()
            && self.entry().map_or(false, |s| s.is_connected())
            && self.exit().map_or(false, |s| s.is_connected())
    }

    pub fn observe_only(&self, key: SessionKey) {
        self.observed.entry(key).or_insert(0);
    }

    pub fn record_observed_frame(&self, key: &SessionKey) {
        if let Some(mut count) = self.observed.get_mut(key) {
            *count += 1;
        }
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }
}
