//! Notifications delivered to the observer loop
//!
//! Bus signal watchers, the dispatcher-facing client object and prepare tasks
//! never touch observer state. They turn what they see into a
//! [`Notification`] and push it through a [`NotificationSink`]; the observer
//! loop drains the matching receiver one notification at a time.

use tokio::sync::mpsc;

use crate::dispatch::DispatchBatch;
use crate::error::{ObserverError, ObserverResult};
use crate::types::{ContentSnapshot, ObjectPath, PropertyMap, StateReason, StreamSnapshot};

/// Lifecycle events of a call channel
///
/// Events carry only what the handler cannot re-read; state and members are
/// re-read live by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    ContentAdded(ObjectPath),
    ContentRemoved {
        content: ObjectPath,
        reason: StateReason,
    },
    StateChanged,
    MembersChanged,
    Invalidated {
        message: String,
    },
}

/// Lifecycle events of a content
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    StreamsAdded(Vec<ObjectPath>),
    StreamsRemoved {
        streams: Vec<ObjectPath>,
        reason: StateReason,
    },
}

/// Events of a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    LocalSendingStateChanged,
    RemoteMembersChanged,
}

/// Identifies which low-level property watcher a change came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    ContentMedia(ObjectPath),
    StreamMedia(ObjectPath),
    Endpoint {
        stream: ObjectPath,
        endpoint: ObjectPath,
    },
}

/// A `PropertiesChanged` signal, after the proxy cache has been updated
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyChange {
    pub changed: PropertyMap,
    pub invalidated: Vec<String>,
}

/// Everything the observer loop reacts to
#[derive(Debug)]
pub enum Notification {
    /// The dispatcher delivered a batch of channels
    Dispatch(DispatchBatch),
    Channel {
        channel: ObjectPath,
        event: ChannelEvent,
    },
    Content {
        content: ObjectPath,
        event: ContentEvent,
    },
    Stream {
        stream: ObjectPath,
        event: StreamEvent,
    },
    Properties {
        watch: WatchKey,
        change: PropertyChange,
    },
    /// Completion of an asynchronous content prepare
    ContentPrepared {
        channel: ObjectPath,
        content: ObjectPath,
        generation: u64,
        result: ObserverResult<ContentSnapshot>,
    },
    /// Completion of an asynchronous stream prepare
    StreamPrepared {
        content: ObjectPath,
        stream: ObjectPath,
        generation: u64,
        result: ObserverResult<StreamSnapshot>,
    },
}

/// Receiving side of the notification channel, owned by the observer loop
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Sending side of the notification channel
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    /// Queue a notification for the observer loop
    pub fn send(&self, notification: Notification) -> ObserverResult<()> {
        self.tx
            .send(notification)
            .map_err(|_| ObserverError::NotificationChannelClosed)
    }

    /// Whether the observer loop has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the channel between notification producers and the observer loop
pub fn notification_channel() -> (NotificationSink, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = notification_channel();
        sink.send(Notification::Channel {
            channel: "/c".into(),
            event: ChannelEvent::StateChanged,
        })
        .unwrap();
        sink.send(Notification::Stream {
            stream: "/s".into(),
            event: StreamEvent::RemoteMembersChanged,
        })
        .unwrap();

        assert!(matches!(rx.recv().await, Some(Notification::Channel { .. })));
        assert!(matches!(rx.recv().await, Some(Notification::Stream { .. })));
    }

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (sink, rx) = notification_channel();
        drop(rx);
        assert!(sink.is_closed());
        let result = sink.send(Notification::Channel {
            channel: "/c".into(),
            event: ChannelEvent::MembersChanged,
        });
        assert_eq!(result.unwrap_err(), ObserverError::NotificationChannelClosed);
    }
}
