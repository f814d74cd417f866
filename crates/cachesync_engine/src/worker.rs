//! Background execution of sync rounds.

use crate::config::OverlapPolicy;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{RoundReport, SyncOrchestrator};
use cachesync_model::EntityKind;
use cachesync_remote::RemoteFetcher;
use cachesync_store::LocalStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Reply = oneshot::Sender<SyncResult<RoundReport>>;

struct Job {
    kinds: Vec<EntityKind>,
    reply: Reply,
}

/// Kinds of queued and running rounds, with the number of rounds per kind.
type InFlight = Arc<Mutex<HashMap<EntityKind, usize>>>;

/// The pending result of a requested round.
///
/// Await it from async code, or call [`RoundTicket::wait`] from a plain
/// thread.
#[derive(Debug)]
pub struct RoundTicket {
    receiver: oneshot::Receiver<SyncResult<RoundReport>>,
}

impl RoundTicket {
    /// Blocks until the round finishes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime; await the ticket
    /// there instead.
    pub fn wait(self) -> SyncResult<RoundReport> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(SyncError::WorkerStopped))
    }
}

impl Future for RoundTicket {
    type Output = SyncResult<RoundReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SyncError::WorkerStopped)))
    }
}

/// Runs rounds of one orchestrator on a dedicated thread.
///
/// Requests never block the caller. At most one round per kind is in
/// flight: an overlapping request is queued or rejected according to the
/// configured [`OverlapPolicy`]. Shutting down drains queued rounds.
pub struct SyncWorker {
    sender: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    in_flight: InFlight,
    tracked: Vec<EntityKind>,
    policy: OverlapPolicy,
    capacity: usize,
}

impl SyncWorker {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<S, R>(orchestrator: Arc<SyncOrchestrator<S, R>>) -> std::io::Result<Self>
    where
        S: LocalStore + 'static,
        R: RemoteFetcher + 'static,
    {
        let config = orchestrator.config();
        let tracked = config.kinds.iter().map(|spec| spec.kind().clone()).collect();
        let policy = config.overlap_policy;
        let capacity = config.queue_capacity.max(1);

        let (sender, mut receiver) = mpsc::channel::<Job>(capacity);
        let in_flight = InFlight::default();
        let worker_in_flight = Arc::clone(&in_flight);

        let thread = thread::Builder::new()
            .name("cachesync-sync".into())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    let result = orchestrator.run_round_for(&job.kinds);
                    release(&worker_in_flight, &job.kinds);
                    if job.reply.send(result).is_err() {
                        debug!("round finished after its ticket was dropped");
                    }
                }
                debug!("sync worker drained");
            })?;

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            in_flight,
            tracked,
            policy,
            capacity,
        })
    }

    /// Requests a round over every tracked kind.
    ///
    /// # Errors
    ///
    /// See [`SyncWorker::request_round_for`].
    pub fn request_round(&self) -> SyncResult<RoundTicket> {
        self.submit(self.tracked.clone())
    }

    /// Requests a round over `kinds`.
    ///
    /// # Errors
    ///
    /// - `UnknownKind` if a kind is not tracked
    /// - `RoundInFlight` if a kind overlaps an in-flight round under
    ///   [`OverlapPolicy::Reject`]
    /// - `QueueFull` if the queue is at capacity
    /// - `WorkerStopped` after shutdown
    pub fn request_round_for(&self, kinds: &[EntityKind]) -> SyncResult<RoundTicket> {
        let mut unique: Vec<EntityKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !self.tracked.contains(kind) {
                return Err(SyncError::UnknownKind { kind: kind.clone() });
            }
            if !unique.contains(kind) {
                unique.push(kind.clone());
            }
        }
        self.submit(unique)
    }

    /// Returns true if a queued or running round covers `kind`.
    pub fn is_in_flight(&self, kind: &EntityKind) -> bool {
        self.in_flight.lock().contains_key(kind)
    }

    /// Stops accepting rounds, finishes the queued ones and joins the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn submit(&self, kinds: Vec<EntityKind>) -> SyncResult<RoundTicket> {
        let sender = self.sender.as_ref().ok_or(SyncError::WorkerStopped)?;

        // held across the send so the worker cannot release these kinds first
        let mut in_flight = self.in_flight.lock();
        if self.policy == OverlapPolicy::Reject {
            if let Some(kind) = kinds.iter().find(|kind| in_flight.contains_key(*kind)) {
                return Err(SyncError::RoundInFlight { kind: kind.clone() });
            }
        }

        let (reply, receiver) = oneshot::channel();
        match sender.try_send(Job {
            kinds: kinds.clone(),
            reply,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(SyncError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => return Err(SyncError::WorkerStopped),
        }

        for kind in kinds {
            *in_flight.entry(kind).or_insert(0) += 1;
        }
        Ok(RoundTicket { receiver })
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("sync worker panicked");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn release(in_flight: &InFlight, kinds: &[EntityKind]) {
    let mut in_flight = in_flight.lock();
    for kind in kinds {
        if let Some(count) = in_flight.get_mut(kind) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(kind);
            }
        }
    }
}
