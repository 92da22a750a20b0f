//! Client registry and broadcast loop.
//!
//! [`Hub::run`] is the only code that touches the registry. Everything else
//! talks to it through a [`HubHandle`], which feeds three bounded queues:
//! registrations, unregistrations and frames to broadcast.
//!
//! The queues are drained in that priority order: pending registrations and
//! unregistrations are applied before the next broadcast, so a client whose
//! registration was sent receives every frame broadcast after it. A burst of
//! registrations delays broadcasts queued alongside it.
//!
//! A client whose outbound queue is full when a frame is delivered is treated
//! as stalled: its queue is closed and it is removed on the spot, so one slow
//! viewer never holds up the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use nodelight_core::Broadcaster;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientId};

/// Owner of the client registry. Consumed by [`Hub::run`].
pub struct Hub {
    clients: HashMap<ClientId, Client>,
    register_rx: mpsc::Receiver<Client>,
    unregister_rx: mpsc::Receiver<ClientId>,
    broadcast_rx: mpsc::Receiver<Bytes>,
    client_count: Arc<AtomicUsize>,
}

/// Cloneable front door to a running [`Hub`].
#[derive(Clone, Debug)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::Sender<ClientId>,
    broadcast_tx: mpsc::Sender<Bytes>,
    client_count: Arc<AtomicUsize>,
}

impl Hub {
    /// Create a hub whose input queues each hold `capacity` events.
    pub fn new(capacity: usize) -> (Self, HubHandle) {
        let capacity = capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let client_count = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            client_count: Arc::clone(&client_count),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            client_count,
        };
        (hub, handle)
    }

    /// Process events until `cancel` fires or every handle is dropped.
    ///
    /// On exit every remaining client's queue is closed.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("hub started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(client) = self.register_rx.recv() => self.register(client),
                Some(id) = self.unregister_rx.recv() => self.unregister(&id),
                Some(frame) = self.broadcast_rx.recv() => self.deliver(&frame),
                else => break,
            }
        }

        for (_, client) in self.clients.drain() {
            client.close();
        }
        self.sync_count();
        info!("hub stopped");
    }

    fn register(&mut self, client: Client) {
        debug!(client_id = %client.id(), "client registered");
        let _ = self.clients.insert(client.id().clone(), client);
        self.sync_count();
    }

    fn unregister(&mut self, id: &ClientId) {
        if let Some(client) = self.clients.remove(id) {
            client.close();
            debug!(client_id = %id, "client unregistered");
            self.sync_count();
        }
    }

    fn deliver(&mut self, frame: &Bytes) {
        let before = self.clients.len();
        self.clients
            .retain(|id, client| match client.try_enqueue(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(client_id = %id, error = %e, "dropping client");
                    client.close();
                    false
                }
            });
        if self.clients.len() != before {
            self.sync_count();
        }
    }

    fn sync_count(&self) {
        self.client_count.store(self.clients.len(), Ordering::Relaxed);
    }
}

impl HubHandle {
    /// Add `client` to the registry.
    pub async fn register(&self, client: Client) {
        if self.register_tx.send(client).await.is_err() {
            warn!("hub stopped, registration ignored");
        }
    }

    /// Remove the client with `id` and close its queue. No-op if absent.
    pub async fn unregister(&self, id: ClientId) {
        if self.unregister_tx.send(id).await.is_err() {
            debug!("hub stopped, unregistration ignored");
        }
    }

    /// Queue `frame` for every registered client without waiting.
    ///
    /// The frame is dropped if the hub's queue is full.
    pub fn broadcast(&self, frame: Bytes) {
        match self.broadcast_tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("hub queue full, dropping broadcast");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("hub stopped, dropping broadcast");
            }
        }
    }

    /// Number of registered clients as of the hub's last event.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }
}

impl Broadcaster for HubHandle {
    fn broadcast(&self, frame: Bytes) {
        HubHandle::broadcast(self, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::ClientQueue;

    fn client(capacity: usize) -> (Client, ClientQueue) {
        Client::new(capacity)
    }

    #[test]
    fn registry_tracks_register_and_unregister() {
        let (mut hub, handle) = Hub::new(8);
        let (a, _qa) = client(4);
        let (b, _qb) = client(4);
        let (c, _qc) = client(4);

        hub.register(a.clone());
        hub.register(b.clone());
        hub.unregister(a.id());
        hub.register(c.clone());
        hub.unregister(a.id());

        assert_eq!(hub.clients.len(), 2);
        assert!(hub.clients.contains_key(b.id()));
        assert!(hub.clients.contains_key(c.id()));
        assert_eq!(handle.client_count(), 2);
        assert!(a.is_closed());
        assert!(!b.is_closed());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let (mut hub, _handle) = Hub::new(8);
        let (stranger, _q) = client(4);
        hub.unregister(stranger.id());
        assert!(hub.clients.is_empty());
        assert!(!stranger.is_closed());
    }

    #[tokio::test]
    async fn every_client_gets_one_copy_in_order() {
        let (mut hub, _handle) = Hub::new(8);
        let mut queues = Vec::new();
        for _ in 0..3 {
            let (c, q) = client(8);
            hub.register(c);
            queues.push(q);
        }

        hub.deliver(&Bytes::from_static(b"one"));
        hub.deliver(&Bytes::from_static(b"two"));

        for q in &mut queues {
            assert_eq!(q.next().await.unwrap(), Bytes::from_static(b"one"));
            assert_eq!(q.next().await.unwrap(), Bytes::from_static(b"two"));
            let extra = tokio::time::timeout(Duration::from_millis(20), q.next()).await;
            assert!(extra.is_err());
        }
    }

    #[tokio::test]
    async fn full_client_is_evicted_others_unaffected() {
        let (mut hub, handle) = Hub::new(8);
        let (slow, _slow_q) = client(1);
        let (fast, mut fast_q) = client(8);
        hub.register(slow.clone());
        hub.register(fast.clone());

        hub.deliver(&Bytes::from_static(b"a"));
        hub.deliver(&Bytes::from_static(b"b"));

        assert!(slow.is_closed());
        assert!(!hub.clients.contains_key(slow.id()));
        assert!(hub.clients.contains_key(fast.id()));
        assert_eq!(handle.client_count(), 1);
        assert_eq!(fast_q.next().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(fast_q.next().await.unwrap(), Bytes::from_static(b"b"));
    }

    #[test]
    fn closed_client_is_removed_on_delivery() {
        let (mut hub, _handle) = Hub::new(8);
        let (gone, queue) = client(4);
        hub.register(gone);
        drop(queue);
        hub.deliver(&Bytes::from_static(b"x"));
        assert!(hub.clients.is_empty());
    }

    #[test]
    fn broadcast_drops_when_hub_queue_full() {
        let (mut hub, handle) = Hub::new(1);
        handle.broadcast(Bytes::from_static(b"kept"));
        handle.broadcast(Bytes::from_static(b"dropped"));

        assert_eq!(hub.broadcast_rx.try_recv().unwrap(), Bytes::from_static(b"kept"));
        assert!(hub.broadcast_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn running_hub_fans_out_and_closes_on_cancel() {
        let (hub, handle) = Hub::new(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));

        let (a, mut qa) = client(8);
        let (b, mut qb) = client(8);
        handle.register(a.clone()).await;
        handle.register(b.clone()).await;
        handle.broadcast(Bytes::from_static(b"hello"));

        let wait = Duration::from_secs(1);
        assert_eq!(
            tokio::time::timeout(wait, qa.next()).await.unwrap().unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(
            tokio::time::timeout(wait, qb.next()).await.unwrap().unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(handle.client_count(), 2);

        handle.unregister(a.id().clone()).await;
        assert!(tokio::time::timeout(wait, qa.next()).await.unwrap().is_none());

        cancel.cancel();
        task.await.unwrap();
        assert!(b.is_closed());
        assert_eq!(handle.client_count(), 0);
    }

    #[tokio::test]
    async fn registration_is_applied_before_queued_broadcasts() {
        let (hub, handle) = Hub::new(8);
        let (a, mut qa) = client(8);
        handle.broadcast(Bytes::from_static(b"early"));
        handle.register(a).await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));
        let frame = tokio::time::timeout(Duration::from_secs(1), qa.next()).await;
        assert_eq!(frame.unwrap().unwrap(), Bytes::from_static(b"early"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn handle_is_a_broadcaster() {
        let (mut hub, handle) = Hub::new(4);
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(handle);
        broadcaster.broadcast(Bytes::from_static(b"via trait"));
        assert_eq!(
            hub.broadcast_rx.recv().await.unwrap(),
            Bytes::from_static(b"via trait")
        );
    }

    mod proptests {
        use super::*;
        use std::collections::HashSet;

        use futures::FutureExt;
        use proptest::prelude::*;

        const POOL: usize = 6;

        /// Everything currently buffered in `queue`, without waiting.
        fn drain(queue: &mut ClientQueue) -> Vec<Bytes> {
            let mut frames = Vec::new();
            while let Some(Some(frame)) = queue.next().now_or_never() {
                frames.push(frame);
            }
            frames
        }

        proptest! {
            #[test]
            fn registry_matches_model_set(
                ops in proptest::collection::vec((any::<bool>(), 0..POOL), 0..40),
            ) {
                let (mut hub, handle) = Hub::new(8);
                let pool: Vec<_> = (0..POOL).map(|_| client(4)).collect();
                let mut model = HashSet::new();

                for (register, i) in ops {
                    let c = &pool[i].0;
                    if register {
                        hub.register(c.clone());
                        let _ = model.insert(c.id().clone());
                    } else {
                        hub.unregister(c.id());
                        let _ = model.remove(c.id());
                    }
                }

                let registered: HashSet<_> = hub.clients.keys().cloned().collect();
                prop_assert_eq!(&registered, &model);
                prop_assert_eq!(handle.client_count(), model.len());
            }

            #[test]
            fn each_client_gets_every_frame_once_in_order(
                n in 1usize..8,
                frames in proptest::collection::vec(
                    proptest::collection::vec(any::<u8>(), 1..16),
                    0..16,
                ),
            ) {
                let (mut hub, _handle) = Hub::new(8);
                let mut queues = Vec::with_capacity(n);
                for _ in 0..n {
                    let (c, q) = client(frames.len());
                    hub.register(c);
                    queues.push(q);
                }

                let frames: Vec<Bytes> = frames.into_iter().map(Bytes::from).collect();
                for frame in &frames {
                    hub.deliver(frame);
                }

                prop_assert_eq!(hub.clients.len(), n);
                for queue in &mut queues {
                    prop_assert_eq!(&drain(queue), &frames);
                }
            }
        }
    }
}
