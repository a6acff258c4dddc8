use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use uuid::Uuid;

use super::EvalReply;

/// Script evaluations waiting for the page to post their reply back.
/// Managed as plugin state and completed by the `host_reply` command.
#[derive(Debug, Default)]
pub struct PendingReplies {
    waiting: Mutex<HashMap<String, oneshot::Sender<EvalReply>>>,
}

impl PendingReplies {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<EvalReply>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for one evaluation under a fresh id
    pub fn register(self: &Arc<Self>) -> PendingReply {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id.clone(), tx);
        PendingReply {
            id,
            replies: Arc::clone(self),
            rx,
        }
    }

    /// Deliver the page's reply. Returns false when nobody waits for `id` any more.
    pub fn complete(&self, id: &str, reply: EvalReply) -> bool {
        match self.lock().remove(id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One registered evaluation.
///
/// Dropping it releases the slot, so an abandoned wait (timeout, cancelled run) leaves nothing behind.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    replies: Arc<PendingReplies>,
    rx: oneshot::Receiver<EvalReply>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply. `None` if the slot was released first.
    pub async fn recv(&mut self) -> Option<EvalReply> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.replies.lock().remove(&self.id);
    }
}
