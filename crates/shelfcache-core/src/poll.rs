//! Fixed-interval background refresh.
//!
//! A `Poller` owns one tokio task. Dropping the `Poller` aborts the task,
//! so a view that goes away stops its fetches with it. A fetch already in
//! flight is not interrupted other than by that abort.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cache::{CachedCollection, Loaded};

/// Buffer for poll results not yet picked up by the view.
const POLL_CHANNEL_CAPACITY: usize = 4;

pub struct Poller {
    handle: JoinHandle<()>,
}

impl Poller {
    /// Run `fetch` now and then every `interval`, sending each result to
    /// `sender`. Stops once the receiving side is dropped.
    pub fn spawn<F, Fut, T>(interval: Duration, mut fetch: F, sender: mpsc::Sender<T>) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let value = fetch().await;
                if sender.send(value).await.is_err() {
                    debug!("Poll receiver dropped, stopping");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll a collection through its fallback chain.
pub fn poll_collection<T>(
    collection: Arc<CachedCollection<T>>,
    interval: Duration,
) -> (Poller, mpsc::Receiver<Loaded<T>>)
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
    let poller = Poller::spawn(
        interval,
        move || {
            let collection = collection.clone();
            async move { collection.get_all_with_source().await }
        },
        tx,
    );
    (poller, rx)
}
