//! Background delivery worker for async mode.
//!
//! A single task drains the bounded payload queue and hands each payload to
//! the delivery channel. The queue is the only state shared with the producer.

use crate::delivery::DeliveryChannel;
use crate::payload::TelemetryPayload;
use crate::stats::StatsCollector;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Lifecycle of the worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    WaitingForWork,
    Draining,
    Stopped,
}

/// Handle to a running background worker.
pub struct WorkerHandle {
    join: JoinHandle<()>,
    token: CancellationToken,
    state: Arc<RwLock<WorkerState>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Ask the worker to stop at its next poll. Payloads still queued are abandoned.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait up to `grace` for the worker to finish, then cancel and abort it.
    ///
    /// The queue sender must already be dropped for the worker to finish on
    /// its own once the queue is drained.
    pub async fn stop(mut self, grace: Duration) {
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => debug!("Background worker finished"),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Background worker did not drain in time, abandoning queued payloads"
                );
                self.token.cancel();
                self.join.abort();
                let _ = (&mut self.join).await;
                *self.state.write() = WorkerState::Stopped;
            }
        }
    }
}

/// Spawn the worker task on the current tokio runtime.
pub fn spawn(
    queue: mpsc::Receiver<TelemetryPayload>,
    channel: Arc<dyn DeliveryChannel>,
    stats: Arc<StatsCollector>,
    poll_timeout: Duration,
) -> WorkerHandle {
    let token = CancellationToken::new();
    let state = Arc::new(RwLock::new(WorkerState::WaitingForWork));

    let join = tokio::spawn(run(
        queue,
        channel,
        stats,
        poll_timeout,
        token.clone(),
        state.clone(),
    ));

    WorkerHandle { join, token, state }
}

#[instrument(skip_all, fields(poll_timeout_ms = poll_timeout.as_millis() as u64))]
async fn run(
    mut queue: mpsc::Receiver<TelemetryPayload>,
    channel: Arc<dyn DeliveryChannel>,
    stats: Arc<StatsCollector>,
    poll_timeout: Duration,
    token: CancellationToken,
    state: Arc<RwLock<WorkerState>>,
) {
    info!("Background worker started");

    loop {
        *state.write() = WorkerState::WaitingForWork;

        let next = tokio::select! {
            _ = token.cancelled() => {
                info!("Background worker cancelled");
                break;
            }
            next = tokio::time::timeout(poll_timeout, queue.recv()) => next,
        };

        match next {
            Ok(Some(payload)) => {
                *state.write() = WorkerState::Draining;
                let outcome = channel.deliver(&payload).await;
                stats.record_delivery(&outcome);
            }
            Ok(None) => {
                info!("Payload queue closed");
                break;
            }
            Err(_) => {
                trace!("No payload within poll timeout");
                if token.is_cancelled() {
                    break;
                }
            }
        }
    }

    *state.write() = WorkerState::Stopped;
    info!("Background worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryOutcome, MockDeliveryChannel};
    use crate::frame::{Frame, FrameEncoder};
    use crate::payload::{GpsLocation, PayloadBuilder};

    fn payload() -> TelemetryPayload {
        PayloadBuilder::new(GpsLocation { lat: 0.0, lon: 0.0 }, FrameEncoder::new(50))
            .build(&Frame::rgb(4, 4, vec![0u8; 48]), vec![])
            .unwrap()
    }

    #[tokio::test]
    async fn test_drains_queue_and_records_outcomes() {
        let mut mock = MockDeliveryChannel::new();
        let mut calls = 0;
        mock.expect_deliver().times(3).returning(move |_| {
            calls += 1;
            if calls == 2 {
                DeliveryOutcome::Rejected {
                    status: 503,
                    body: String::new(),
                }
            } else {
                DeliveryOutcome::Success
            }
        });

        let stats = Arc::new(StatsCollector::new());
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn(rx, Arc::new(mock), stats.clone(), Duration::from_millis(20));

        for _ in 0..3 {
            tx.try_send(payload()).unwrap();
        }
        drop(tx);

        handle.stop(Duration::from_secs(5)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_worker() {
        let mock = MockDeliveryChannel::new();
        let (_tx, rx) = mpsc::channel(1);
        let handle = spawn(
            rx,
            Arc::new(mock),
            Arc::new(StatsCollector::new()),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), WorkerState::WaitingForWork);

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handle.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_abandons_stuck_delivery() {
        struct Stuck;

        #[async_trait::async_trait]
        impl DeliveryChannel for Stuck {
            async fn deliver(&self, _payload: &TelemetryPayload) -> DeliveryOutcome {
                std::future::pending().await
            }
        }

        let stats = Arc::new(StatsCollector::new());
        let (tx, rx) = mpsc::channel(2);
        let handle = spawn(rx, Arc::new(Stuck), stats.clone(), Duration::from_millis(20));

        tx.try_send(payload()).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle.stop(Duration::from_millis(100)))
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent + snapshot.errors, 0);
    }
}
