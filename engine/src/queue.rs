//! Serialized admission: one worker task admits queued proposals one at a time.

use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use sam_types::Proposal;

use crate::engine::WeakEngine;

pub(crate) enum QueueItem<A> {
    Proposal(Proposal<A>),
    /// Completed once everything queued before it has been admitted.
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct AdmissionQueue<A> {
    sender: mpsc::UnboundedSender<QueueItem<A>>,
    worker: JoinHandle<()>,
}

impl<A: Send + 'static> AdmissionQueue<A> {
    pub(crate) fn start<S>(engine: WeakEngine<S, A>, poll_interval: Duration, handle: &Handle) -> Self
    where
        S: Clone + Serialize + Send + 'static,
        A: Serialize,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = handle.spawn(run(engine, receiver, poll_interval));
        Self { sender, worker }
    }

    /// Hands the item back when the worker is gone.
    pub(crate) fn push(&self, item: QueueItem<A>) -> Result<(), QueueItem<A>> {
        self.sender.send(item).map_err(|err| err.0)
    }

    /// Stop the worker. Queued proposals are dropped.
    pub(crate) fn stop(self) {
        self.worker.abort();
    }
}

async fn run<S, A>(
    engine: WeakEngine<S, A>,
    mut receiver: mpsc::UnboundedReceiver<QueueItem<A>>,
    poll_interval: Duration,
) where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    while let Some(item) = receiver.recv().await {
        match item {
            QueueItem::Barrier(done) => {
                let _ = done.send(());
            }
            QueueItem::Proposal(proposal) => {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.admit(proposal).await;
                drop(engine);
                if !poll_interval.is_zero() {
                    time::sleep(poll_interval).await;
                }
            }
        }
    }
    tracing::debug!("Admission worker stopped");
}
