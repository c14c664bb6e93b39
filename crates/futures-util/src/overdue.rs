use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;

/// A tick stream for periodic background sweeps (§4.5.2's session-expiry
/// checker, which the original source runs on a fixed-period
/// `SessionExpiryQueue::getWaitTime` loop). Wraps [`tokio::time::Interval`]
/// as a [`Stream`] so call sites can fold it into a `select!`/combinator
/// pipeline alongside `cancellation_watcher()` instead of a bare `loop`.
pub struct OverduePeriodic {
    interval: tokio::time::Interval,
}

impl OverduePeriodic {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Stream for OverduePeriodic {
    type Item = Instant;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.interval.poll_tick(cx).map(|instant| Some(instant.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_period() {
        let mut periodic = OverduePeriodic::new(Duration::from_millis(10));
        periodic.next().await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        periodic.next().await.unwrap();
    }
}
