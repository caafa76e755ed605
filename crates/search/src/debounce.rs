//! Value settling: emit the latest value once input has been quiet for `delay`.
//!
//! The initial value is the starting settled state and is never re-emitted.
//! A settled value equal to the current one is not emitted either, so each
//! quiescent period produces at most one change notification.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    out: watch::Receiver<T>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Spawn the settling task on the current runtime.
    pub fn spawn(initial: T, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, out) = watch::channel(initial);
        tokio::spawn(run(rx, out_tx, delay));
        Self { tx, out }
    }

    /// Feed a new value; restarts the quiet timer.
    pub fn push(&self, value: T) {
        let _ = self.tx.send(value);
    }

    pub fn settled(&self) -> T {
        self.out.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.out.clone()
    }

    /// Wait for the next emission. `None` once the settling task is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.out.changed().await.ok()?;
        Some(self.out.borrow_and_update().clone())
    }
}

async fn run<T: PartialEq>(mut rx: mpsc::UnboundedReceiver<T>, out: watch::Sender<T>, delay: Duration) {
    let mut pending: Option<T> = None;
    let mut open = true;
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            next = rx.recv(), if open => match next {
                Some(v) => {
                    pending = Some(v);
                    sleep.as_mut().reset(Instant::now() + delay);
                }
                None => {
                    // flush what is pending once its timer runs out
                    open = false;
                    if pending.is_none() {
                        break;
                    }
                }
            },
            () = &mut sleep, if pending.is_some() => {
                if let Some(v) = pending.take() {
                    out.send_if_modified(|cur| {
                        if *cur == v {
                            return false;
                        }
                        *cur = v;
                        true
                    });
                }
                if !open {
                    break;
                }
            },
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_emits_final_value_once() {
        let mut d = Debouncer::spawn(String::new(), DEFAULT_DEBOUNCE);
        for q in ["p", "pi", "pik", "pika"] {
            d.push(q.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last_change = Instant::now() - Duration::from_millis(100);
        assert_eq!(d.settled(), "");

        let v = d.changed().await.unwrap();
        assert_eq!(v, "pika");
        assert!(Instant::now() >= last_change + DEFAULT_DEBOUNCE);

        let extra = tokio::time::timeout(Duration::from_secs(5), d.changed()).await;
        assert!(extra.is_err(), "no second emission for the same quiet period");
    }

    #[tokio::test(start_paused = true)]
    async fn initial_value_is_not_emitted() {
        let mut d = Debouncer::spawn(7u32, Duration::from_millis(50));
        assert_eq!(d.settled(), 7);
        assert!(tokio::time::timeout(Duration::from_secs(1), d.changed()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn value_returning_to_settled_state_is_silent() {
        let mut d = Debouncer::spawn(String::new(), Duration::from_millis(400));
        d.push("a".into());
        tokio::time::sleep(Duration::from_millis(10)).await;
        d.push(String::new());
        assert!(tokio::time::timeout(Duration::from_secs(2), d.changed()).await.is_err());
        assert_eq!(d.settled(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_value_flushes_after_input_closes() {
        let d = Debouncer::spawn(0u32, Duration::from_millis(400));
        let mut rx = d.subscribe();
        d.push(3);
        let t0 = Instant::now();
        drop(d);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 3);
        assert!(Instant::now() >= t0 + Duration::from_millis(400));
    }
}
