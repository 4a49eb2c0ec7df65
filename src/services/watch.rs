// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live snapshot feeds.
//!
//! A feed yields the full result of a query, first immediately and then
//! again whenever it may have changed: after a local write publishes a change
//! event for the collection, or after the poll interval (to pick up writes
//! made by other instances). Unchanged results are not re-sent.

use crate::error::Result;
use futures_util::stream::{self, Stream};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A write happened in `collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: &'static str,
}

/// In-process fan-out of change events.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, collection: &'static str) {
        // No listeners is fine.
        let _ = self.sender.send(ChangeEvent { collection });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

struct FeedState<Q, T> {
    query: Q,
    collection: &'static str,
    changes: broadcast::Receiver<ChangeEvent>,
    poll: Interval,
    last: Option<T>,
    started: bool,
}

/// Build a snapshot feed over `query`.
///
/// The stream ends only when the change feed is dropped. Query failures are
/// yielded as errors and the feed keeps going.
pub fn snapshot_stream<T, Q, Fut>(
    feed: &ChangeFeed,
    collection: &'static str,
    poll_interval: Duration,
    query: Q,
) -> impl Stream<Item = Result<T>> + Send + 'static
where
    T: Clone + PartialEq + Send + 'static,
    Q: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut poll = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = FeedState {
        query,
        collection,
        changes: feed.subscribe(),
        poll,
        last: None,
        started: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.started {
                tokio::select! {
                    event = state.changes.recv() => match event {
                        Ok(event) if event.collection != state.collection => continue,
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return None,
                    },
                    _ = state.poll.tick() => {}
                }
            }
            state.started = true;

            match (state.query)().await {
                Ok(snapshot) if state.last.as_ref() == Some(&snapshot) => continue,
                Ok(snapshot) => {
                    state.last = Some(snapshot.clone());
                    return Some((Ok(snapshot), state));
                }
                Err(e) => {
                    tracing::warn!(collection = state.collection, error = %e, "Snapshot query failed");
                    return Some((Err(e), state));
                }
            }
        }
    })
}
