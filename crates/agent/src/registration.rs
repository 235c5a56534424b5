// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration state shared between the orchestrator, reconciler,
//! dispatcher, and health surface.

use std::sync::Arc;

use parking_lot::Mutex;

/// Mutable registration state: `node_id` is present iff registered.
#[derive(Debug, Default)]
struct RegistrationState {
    node_id: Option<i64>,
}

/// Cloneable handle to the shared registration state.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    inner: Arc<Mutex<RegistrationState>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful registration.
    pub fn set(&self, node_id: i64) {
        self.inner.lock().node_id = Some(node_id);
    }

    /// Drop registration; the next heartbeat tick re-registers.
    pub fn clear(&self) {
        self.inner.lock().node_id = None;
    }

    pub fn node_id(&self) -> Option<i64> {
        self.inner.lock().node_id
    }

    pub fn is_registered(&self) -> bool {
        self.inner.lock().node_id.is_some()
    }
}
