//! Stream Task Runner
//!
//! Each stream is one tokio task with its own interval timer. The task
//! forwards events to its [`StreamHandle`] over a bounded channel and stops
//! as soon as the handle cancels, is dropped, or stops reading. Each step
//! runs on the blocking pool since it touches the store.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::engine::StreamDriver;
use super::events::StreamEvent;

/// Events buffered between a stream task and its consumer.
pub const EVENT_BUFFER: usize = 64;

/// Owning handle to a running stream.
///
/// Dropping the handle cancels the stream; [`StreamHandle::cancel`] also
/// waits for the task to exit.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Start `driver` ticking every `period`. The first tick fires after one period.
pub fn spawn_stream(mut driver: StreamDriver, period: Duration) -> StreamHandle {
    let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                // Resolves on an explicit cancel and when the handle is dropped.
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {
                    // Store reads and appends are blocking file I/O.
                    let step = tokio::task::spawn_blocking(move || {
                        let event = driver.step();
                        (driver, event)
                    });
                    let event = match step.await {
                        Ok((returned, event)) => {
                            driver = returned;
                            event
                        }
                        Err(e) => {
                            error!("Stream step failed: {}", e);
                            break;
                        }
                    };
                    tokio::select! {
                        biased;
                        _ = &mut cancel_rx => break,
                        sent = event_tx.send(event) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!("Stream loop stopped");
    });

    StreamHandle {
        events,
        cancel_tx: Some(cancel_tx),
        task: Some(task),
    }
}

impl StreamHandle {
    /// Next event, or `None` once the stream has stopped.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Ask the loop to stop without waiting for it.
    pub fn signal_cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        self.events.close();
    }

    /// Whether the stream task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the loop and wait for its task, discarding undelivered events.
    pub async fn cancel(mut self) {
        self.signal_cancel();
        while self.events.try_recv().is_ok() {}

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Stream task failed: {}", e);
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}
