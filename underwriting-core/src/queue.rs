//! Dispatcher/Queue abstraction. Minimal submit/consume surface
//! so an in-memory channel suffices for tests; a durable broker (Redis list)
//! backs the canonical deployment. At-least-once delivery is the
//! only contract — the Worker is idempotent against terminal states.

use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait Queue: Send + Sync {
    async fn submit(&self, job_id: String);
    async fn consume(&self) -> Option<String>;
    fn backlog(&self) -> usize;
}

/// Process-local in-memory broker — acceptable for testing and as the
/// fallback when `REDIS_URL` is unset.
pub struct InMemoryQueue {
    sender: mpsc::UnboundedSender<String>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    depth: std::sync::atomic::AtomicUsize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            depth: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn submit(&self, job_id: String) {
        self.depth
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let _ = self.sender.send(job_id);
    }

    async fn consume(&self) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        let job_id = receiver.recv().await;
        if job_id.is_some() {
            self.depth
                .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }
        job_id
    }

    fn backlog(&self) -> usize {
        self.depth.load(std::sync::atomic::Ordering::SeqCst)
    }
}
