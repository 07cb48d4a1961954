//! Per-session execution context: bound parameters, the row-visibility
//! predicate supplied by the transaction layer, and the cooperative
//! interrupt flag. Cancellation aborts a scan between row fetches; a
//! mutation either reaches its apply phase or changes nothing.

use crate::storage::{AllVisible, Visibility};
use crate::types::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct Session {
    params: Vec<Value>,
    visibility: Box<dyn Visibility + Send + Sync>,
    interrupted: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            visibility: Box::new(AllVisible),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_visibility(mut self, visibility: Box<dyn Visibility + Send + Sync>) -> Self {
        self.visibility = visibility;
        self
    }

    /// Shared handle for interrupting this session from another
    /// thread; setting it aborts the active scan at its next fetch.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }

    pub(crate) fn visibility(&self) -> &dyn Visibility {
        self.visibility.as_ref()
    }

    pub(crate) fn interrupted(&self) -> &AtomicBool {
        &self.interrupted
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
