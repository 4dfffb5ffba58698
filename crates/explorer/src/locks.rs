//! Per-node expansion locks
//!
//! A node is `Expanding` while a guard for it is alive. A second request
//! for the same node is rejected, unless the holder has been at it longer
//! than the stale timeout, in which case the new request takes over.
//!
//! Locks are keyed by the node's paper, not its arena index: indices are
//! reused when a conversation view is reopened, papers are not.

use citeweave_common::errors::{AppError, Result};
use citeweave_common::ids::PaperId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Idle,
    Expanding {
        expansion_id: Uuid,
        #[serde(skip)]
        started: Instant,
    },
}

type LockKey = (String, PaperId);

#[derive(Default)]
pub struct NodeLocks {
    held: Mutex<HashMap<LockKey, (Uuid, Instant)>>,
}

impl NodeLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self, chat_id: &str, paper: &PaperId) -> NodeState {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.get(&(chat_id.to_string(), paper.clone())) {
            Some((expansion_id, started)) => NodeState::Expanding {
                expansion_id: *expansion_id,
                started: *started,
            },
            None => NodeState::Idle,
        }
    }

    /// Move a node to `Expanding`, or fail with `ExpansionInProgress`
    pub fn acquire(self: &Arc<Self>, chat_id: &str, paper: &PaperId, stale_after: Duration) -> Result<ExpansionGuard> {
        let key = (chat_id.to_string(), paper.clone());
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((holder, started)) = held.get(&key) {
            let age = started.elapsed();
            if age < stale_after {
                return Err(AppError::ExpansionInProgress {
                    node_id: paper.to_string(),
                });
            }
            warn!(
                chat_id,
                paper_id = %paper,
                stale_expansion_id = %holder,
                held_secs = age.as_secs(),
                "Overriding stale expansion lock"
            );
        }

        let expansion_id = Uuid::new_v4();
        held.insert(key.clone(), (expansion_id, Instant::now()));

        Ok(ExpansionGuard {
            locks: Arc::clone(self),
            key,
            expansion_id,
        })
    }

    fn release(&self, key: &LockKey, expansion_id: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        // A stale holder must not release the lock its successor took over
        if held.get(key).map(|(id, _)| *id) == Some(expansion_id) {
            held.remove(key);
        }
    }
}

/// Holds a node in `Expanding`; dropping it returns the node to `Idle`
pub struct ExpansionGuard {
    locks: Arc<NodeLocks>,
    key: LockKey,
    expansion_id: Uuid,
}

impl ExpansionGuard {
    pub fn expansion_id(&self) -> Uuid {
        self.expansion_id
    }

    pub fn paper(&self) -> &PaperId {
        &self.key.1
    }
}

impl Drop for ExpansionGuard {
    fn drop(&mut self) {
        self.locks.release(&self.key, self.expansion_id);
    }
}
