//! Connected viewer handle and its outbound queue.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::EnqueueError;

/// Unique client identifier (`client_<uuid v7>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Producer side of one viewer's outbound queue.
///
/// Cheap to clone. The hub holds one clone in its registry and the session
/// holds another for direct replies.
#[derive(Clone, Debug)]
pub struct Client {
    id: ClientId,
    tx: mpsc::Sender<Bytes>,
    closed: CancellationToken,
}

/// Consumer side of a client's queue, drained by its writer task.
#[derive(Debug)]
pub struct ClientQueue {
    rx: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
}

impl Client {
    /// Create a client with a bounded queue of `capacity` frames.
    pub fn new(capacity: usize) -> (Self, ClientQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let client = Self {
            id: ClientId::generate(),
            tx,
            closed: closed.clone(),
        };
        (client, ClientQueue { rx, closed })
    }

    /// This client's id.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Queue `frame` without waiting.
    pub fn try_enqueue(&self, frame: Bytes) -> Result<(), EnqueueError> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the queue. The writer stops at its next poll. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl ClientQueue {
    /// Next queued frame, or `None` once the queue is closed.
    ///
    /// Frames still buffered when the queue closes are discarded.
    pub async fn next(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }
}
