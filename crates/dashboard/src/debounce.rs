//! Trailing-edge debouncer.  Every trigger restarts a single pending timer;
//! when the timer runs out without a new trigger the action runs once.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TRIGGER_BUFFER: usize = 16;

/// Cheap, cloneable handle to a running debouncer task.
#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::Sender<()>,
}

impl Debouncer {
    /// Spawn the debouncer task.  It stops when `cancel` fires or every
    /// handle has been dropped; a pending run is dropped on cancel.
    pub fn spawn<F, Fut>(
        delay: Duration,
        cancel: CancellationToken,
        action: F,
    ) -> (Self, JoinHandle<()>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);
        let task = tokio::spawn(run(delay, cancel, rx, action));
        (Self { tx }, task)
    }

    /// Never blocks.  If the buffer is full a run is already pending, so the
    /// extra trigger can be dropped.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

async fn run<F, Fut>(
    delay: Duration,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<()>,
    mut action: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        // Idle until the first trigger of a burst.
        tokio::select! {
            _ = cancel.cancelled() => return,
            msg = rx.recv() => {
                if msg.is_none() {
                    return;
                }
            }
        }

        let mut coalesced = 1usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => break,
                msg = rx.recv() => match msg {
                    Some(()) => coalesced += 1,
                    None => break,
                },
            }
        }

        debug!(coalesced, "debounce window elapsed");
        action().await;
    }
}
