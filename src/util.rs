//! Common utilities shared by the engine tasks.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Outcome of one engine event-loop iteration.
#[derive(Debug)]
pub(crate) enum Running {
    Continue,
    Stop,
}

/// Tracks how long the peer has been silent. Reset on every inbound frame;
/// completing means the peer idle timeout elapsed.
#[derive(Debug)]
pub(crate) struct IdleTimeout {
    delay: Pin<Box<Sleep>>,
    duration: Duration,
}

impl IdleTimeout {
    pub fn new(duration: Duration) -> Self {
        let delay = Box::pin(tokio::time::sleep(duration));
        Self { delay, duration }
    }

    pub fn reset(&mut self) {
        let next = Instant::now() + self.duration;
        self.delay.as_mut().reset(next);
    }
}

impl Future for IdleTimeout {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        self.delay.as_mut().poll(cx)
    }
}

/// Generated names for links and containers, 40 alphanumeric characters like
/// the ones brokers are used to seeing.
pub(crate) fn random_name() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}
