//! Dispatch batches and the completion token
//!
//! The channel dispatcher hands the observer a batch of channels and waits for
//! the batch to be acknowledged. [`DispatchCompletion`] is that
//! acknowledgement: it is consumed by [`DispatchCompletion::accept`] or
//! [`DispatchCompletion::fail`], so it can be signalled at most once, and
//! dropping it unsignalled reports a failure instead of stalling the
//! dispatcher.

use std::fmt;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{ObserverError, ObserverResult};
use crate::types::{names, ChannelKind, HandleType, ObjectPath, ObjectRef};

/// The channel filter registered with the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFilter {
    pub channel_type: String,
    pub target_handle_type: HandleType,
}

impl ObserverFilter {
    /// Call channels targeting a single contact
    pub fn call_contacts() -> Self {
        Self {
            channel_type: names::CHANNEL_TYPE_CALL.to_string(),
            target_handle_type: HandleType::Contact,
        }
    }
}

impl Default for ObserverFilter {
    fn default() -> Self {
        Self::call_contacts()
    }
}

/// A channel as announced by the dispatcher, with its immutable properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub target: ObjectRef,
    pub channel_type: String,
    pub target_handle_type: Option<HandleType>,
    pub target_id: Option<String>,
    pub requested: Option<bool>,
}

impl ChannelDescriptor {
    pub fn new(target: ObjectRef, channel_type: impl Into<String>) -> Self {
        Self {
            target,
            channel_type: channel_type.into(),
            target_handle_type: None,
            target_id: None,
            requested: None,
        }
    }

    pub fn with_requested(mut self, requested: bool) -> Self {
        self.requested = Some(requested);
        self
    }

    pub fn with_target(mut self, handle_type: HandleType, target_id: impl Into<String>) -> Self {
        self.target_handle_type = Some(handle_type);
        self.target_id = Some(target_id.into());
        self
    }

    pub fn kind(&self) -> ChannelKind {
        ChannelKind::from_channel_type(&self.channel_type)
    }

    pub fn path(&self) -> &ObjectPath {
        &self.target.path
    }
}

/// One-shot acknowledgement of a dispatch batch
pub struct DispatchCompletion {
    tx: Option<oneshot::Sender<ObserverResult<()>>>,
}

/// Receiving end held by whoever delivered the batch
pub type DispatchReply = oneshot::Receiver<ObserverResult<()>>;

impl DispatchCompletion {
    pub fn new() -> (Self, DispatchReply) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Acknowledge the batch
    pub fn accept(mut self) {
        self.signal(Ok(()));
    }

    /// Reject the batch
    pub fn fail(mut self, error: ObserverError) {
        self.signal(Err(error));
    }

    fn signal(&mut self, result: ObserverResult<()>) {
        if let Some(tx) = self.tx.take() {
            if tx.send(result).is_err() {
                warn!("Dispatch completion signalled after the dispatcher stopped waiting");
            }
        }
    }
}

impl Drop for DispatchCompletion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("Dispatch completion dropped without being signalled");
            self.signal(Err(ObserverError::dispatch(
                "observer finished without completing the dispatch",
            )));
        }
    }
}

impl fmt::Debug for DispatchCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchCompletion")
            .field("pending", &self.tx.is_some())
            .finish()
    }
}

/// A batch of channels delivered by one `ObserveChannels` call
#[derive(Debug)]
pub struct DispatchBatch {
    pub account: ObjectPath,
    pub connection: ObjectPath,
    pub channels: Vec<ChannelDescriptor>,
    pub dispatch_operation: Option<ObjectPath>,
    pub requests_satisfied: Vec<ObjectPath>,
    pub completion: DispatchCompletion,
}

impl DispatchBatch {
    /// A batch with no dispatch operation and no satisfied requests
    pub fn new(
        account: impl Into<ObjectPath>,
        connection: impl Into<ObjectPath>,
        channels: Vec<ChannelDescriptor>,
    ) -> (Self, DispatchReply) {
        let (completion, reply) = DispatchCompletion::new();
        let batch = Self {
            account: account.into(),
            connection: connection.into(),
            channels,
            dispatch_operation: None,
            requests_satisfied: Vec::new(),
            completion,
        };
        (batch, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_signals_ok() {
        let (completion, reply) = DispatchCompletion::new();
        completion.accept();
        assert_eq!(reply.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_fail_signals_error() {
        let (completion, reply) = DispatchCompletion::new();
        completion.fail(ObserverError::dispatch("boom"));
        assert!(matches!(reply.await.unwrap(), Err(ObserverError::Dispatch { .. })));
    }

    #[tokio::test]
    async fn test_dropped_completion_reports_failure() {
        let (completion, reply) = DispatchCompletion::new();
        drop(completion);
        assert!(reply.await.unwrap().is_err());
    }

    #[test]
    fn test_descriptor_kind() {
        let target = ObjectRef::new("org.freedesktop.Telepathy.Connection.cm.proto.acct", "/chan");
        let call = ChannelDescriptor::new(target.clone(), names::CHANNEL_TYPE_CALL)
            .with_requested(false)
            .with_target(HandleType::Contact, "bob@example.com");
        assert_eq!(call.kind(), ChannelKind::Call);
        assert_eq!(call.target_id.as_deref(), Some("bob@example.com"));

        let text = ChannelDescriptor::new(target, "org.freedesktop.Telepathy.Channel.Type.Text");
        assert!(matches!(text.kind(), ChannelKind::Other(_)));
    }
}
