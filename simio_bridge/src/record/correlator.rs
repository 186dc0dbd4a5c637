//! Record-data correlator.
//!
//! The peer never accepts connections, so the controller side cannot push
//! a parameter request to it. Requests are queued per [`SubscriptionKey`]
//! instead, and the peer collects them by polling over the `/R` channel of
//! its existing connection.
//!
//! A key becomes *subscribed* on its first poll (read or write). Requests
//! issued for a key before that are dropped, never buffered. Subscriptions
//! do not expire and are not tied to a connection.

use bytes::Bytes;
use dashmap::DashMap;
use simio_common::record::{RecordDataRequest, RecordEvent, SubscriptionKey};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use super::wire::{RecordCommand, RecordMessage, RecordReply};

/// Pending work for one subscribed key.
#[derive(Debug, Default)]
struct RecordQueue {
    pending_reads: VecDeque<RecordDataRequest>,
    pending_writes: VecDeque<RecordDataRequest>,
}

/// Which queue a request goes to.
#[derive(Debug, Clone, Copy)]
enum Pending {
    Read,
    Write,
}

/// Matches controller-side record requests against peer polls.
#[derive(Debug)]
pub struct RecordCorrelator {
    /// An entry exists exactly for the subscribed keys.
    queues: DashMap<SubscriptionKey, RecordQueue>,
    events: broadcast::Sender<RecordEvent>,
}

impl RecordCorrelator {
    /// Correlator whose completion channel buffers `event_capacity` events.
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            queues: DashMap::new(),
            events,
        }
    }

    /// Queue a read for the peer. Returns `false` (dropped) if the key has
    /// never been polled.
    pub fn issue_read(&self, request: RecordDataRequest) -> bool {
        self.enqueue(request, Pending::Read)
    }

    /// Queue a write for the peer. Returns `false` (dropped) if the key has
    /// never been polled.
    pub fn issue_write(&self, request: RecordDataRequest) -> bool {
        self.enqueue(request, Pending::Write)
    }

    /// Receiver of read/write completions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }

    /// `true` once the peer has polled for `key`.
    pub fn is_subscribed(&self, key: SubscriptionKey) -> bool {
        self.queues.contains_key(&key)
    }

    /// Pending `(reads, writes)` for `key`.
    pub fn pending(&self, key: SubscriptionKey) -> (usize, usize) {
        self.queues
            .get(&key)
            .map(|q| (q.pending_reads.len(), q.pending_writes.len()))
            .unwrap_or((0, 0))
    }

    /// Handle one `/R` payload and return the reply payload.
    ///
    /// Malformed messages get the fallback reply.
    pub fn handle(&self, payload: &[u8]) -> Bytes {
        match RecordMessage::decode(payload) {
            Ok(message) => self.dispatch(message).encode(),
            Err(e) => {
                debug!("Malformed record message ({} bytes): {}", payload.len(), e);
                RecordReply::Fallback.encode()
            }
        }
    }

    /// Apply a decoded message.
    pub fn dispatch(&self, message: RecordMessage) -> RecordReply {
        match message {
            RecordMessage::PollRead(key) => {
                let next = self.subscribe(key).pending_reads.pop_front();
                match next {
                    Some(request) => {
                        trace!("Record read {}#{} handed to peer", key, request.index);
                        RecordReply::Read {
                            key,
                            index: request.index,
                            length: request.length,
                        }
                    }
                    None => RecordReply::Fallback,
                }
            }
            RecordMessage::PollWrite(key) => {
                let next = self.subscribe(key).pending_writes.pop_front();
                match next {
                    Some(request) if request.has_consistent_data() => {
                        trace!("Record write {}#{} handed to peer", key, request.index);
                        RecordReply::Write {
                            key,
                            index: request.index,
                            data: request.data.unwrap_or_default(),
                        }
                    }
                    Some(request) => {
                        debug!(
                            "Dropping record write {}#{}: data does not match declared length {}",
                            key, request.index, request.length
                        );
                        RecordReply::Fallback
                    }
                    None => RecordReply::Fallback,
                }
            }
            RecordMessage::ReadResult { key, index, data } => {
                trace!("Record read {}#{} completed ({} bytes)", key, index, data.len());
                self.emit(RecordEvent::ReadCompleted { key, index, data });
                RecordReply::Ack {
                    command: RecordCommand::ReadResult,
                    key,
                }
            }
            RecordMessage::WriteResult { key, index, length } => {
                trace!("Record write {}#{} completed", key, index);
                self.emit(RecordEvent::WriteCompleted { key, index, length });
                RecordReply::Ack {
                    command: RecordCommand::WriteResult,
                    key,
                }
            }
        }
    }

    fn subscribe(
        &self,
        key: SubscriptionKey,
    ) -> dashmap::mapref::one::RefMut<'_, SubscriptionKey, RecordQueue> {
        self.queues.entry(key).or_insert_with(|| {
            info!("Record key {} subscribed", key);
            RecordQueue::default()
        })
    }

    fn enqueue(&self, request: RecordDataRequest, pending: Pending) -> bool {
        let key = request.key();
        match self.queues.get_mut(&key) {
            Some(mut queue) => {
                match pending {
                    Pending::Read => queue.pending_reads.push_back(request),
                    Pending::Write => queue.pending_writes.push_back(request),
                }
                true
            }
            None => {
                debug!("Record {:?} for unsubscribed key {} dropped", pending, key);
                false
            }
        }
    }

    fn emit(&self, event: RecordEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }
}
