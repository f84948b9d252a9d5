//! Mutex-guarded bitmap over a closed host-port interval.

use tokio::sync::Mutex;

use crate::error::EngineError;

pub struct PortPool {
    start: u16,
    held: Mutex<Vec<bool>>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        let len = (end - start + 1) as usize;
        Self {
            start,
            held: Mutex::new(vec![false; len]),
        }
    }

    /// Returns the lowest free port, deterministic for testability.
    pub async fn allocate(&self) -> Result<u16, EngineError> {
        let mut held = self.held.lock().await;
        match held.iter().position(|&h| !h) {
            Some(idx) => {
                held[idx] = true;
                Ok(self.start + idx as u16)
            }
            None => Err(EngineError::PortExhausted),
        }
    }

    /// Idempotent; out-of-range ports are ignored.
    pub async fn release(&self, port: u16) {
        if port < self.start {
            return;
        }
        let idx = (port - self.start) as usize;
        let mut held = self.held.lock().await;
        if let Some(slot) = held.get_mut(idx) {
            *slot = false;
        }
    }

    /// Marks a port held during startup reconciliation.
    pub async fn reconcile_held(&self, port: u16) {
        if port < self.start {
            return;
        }
        let idx = (port - self.start) as usize;
        let mut held = self.held.lock().await;
        if let Some(slot) = held.get_mut(idx) {
            *slot = true;
        }
    }
}
