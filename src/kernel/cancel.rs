use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::intent::types::IntentionId;

/// Tokens for intentions whose execution is in flight, so a human
/// rejection can stop the run without touching anything else.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    running: Mutex<HashMap<IntentionId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child of `parent`, registered under `id`.
    pub fn register(&self, id: IntentionId, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, token.clone());
        token
    }

    pub fn release(&self, id: IntentionId) {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
    }

    /// Returns whether a running execution was signalled.
    pub fn cancel(&self, id: IntentionId) -> bool {
        match self.running.lock().unwrap_or_else(|e| e.into_inner()).get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: IntentionId) -> bool {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&id)
    }
}
