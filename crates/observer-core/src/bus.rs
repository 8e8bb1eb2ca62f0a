//! The bus seam: everything the observer needs from the middleware
//!
//! The observer core never talks D-Bus itself. It reads live properties and
//! sets up signal watches through [`CallBus`], and reads low-level property
//! caches through [`PropertyProxy`]. The production implementation lives in
//! the `callwatch-telepathy` crate; tests use the in-memory bus from
//! [`crate::testing`].
//!
//! # Contract
//!
//! - Getters (`channel_state`, `channel_members`, ...) read the live value on
//!   every call. The observer does not cache them.
//! - `prepare_*` may take arbitrarily long. The observer runs them in their own
//!   task and only uses the object once the completion has come back through
//!   the notification loop.
//! - `watch_*` forward every signal of the object as a [`Notification`]
//!   through the given sink until the returned [`Subscription`] is dropped.
//!
//! [`Notification`]: crate::notification::Notification

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ObserverResult;
use crate::notification::{NotificationSink, WatchKey};
use crate::subscription::Subscription;
use crate::types::{
    CallMemberFlags, CallStateSnapshot, ContentSnapshot, Member, ObjectPath, ObjectRef,
    PropertyMap, PropertyValue, SendingState, StreamSnapshot,
};

/// A low-level property proxy on one interface of one object
///
/// The cache is filled when the proxy is opened and kept current by the
/// proxy's own `PropertiesChanged` handling, before the change is forwarded to
/// the observer.
pub trait PropertyProxy: Send + Sync {
    fn target(&self) -> &ObjectRef;

    fn interface(&self) -> &str;

    /// Snapshot of every cached property, in name order
    fn cached_properties(&self) -> PropertyMap;

    fn cached_property(&self, name: &str) -> Option<PropertyValue> {
        self.cached_properties().remove(name)
    }
}

/// An opened property proxy together with its change subscription
pub struct PropertyWatch {
    pub proxy: Arc<dyn PropertyProxy>,
    pub subscription: Subscription,
}

impl std::fmt::Debug for PropertyWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyWatch")
            .field("target", self.proxy.target())
            .field("interface", &self.proxy.interface())
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// Access to Call channels, their contents and streams
#[async_trait]
pub trait CallBus: Send + Sync + 'static {
    // ===== Channel =====

    /// Whether the local user requested the channel (outgoing call)
    async fn channel_requested(&self, channel: &ObjectRef) -> ObserverResult<bool>;

    async fn channel_state(&self, channel: &ObjectRef) -> ObserverResult<CallStateSnapshot>;

    /// Call members in bus order
    async fn channel_members(
        &self,
        channel: &ObjectRef,
    ) -> ObserverResult<Vec<Member<CallMemberFlags>>>;

    async fn channel_contents(&self, channel: &ObjectRef) -> ObserverResult<Vec<ObjectPath>>;

    /// Watch content added/removed, state, members and invalidation
    async fn watch_channel(
        &self,
        channel: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription>;

    // ===== Content =====

    async fn prepare_content(&self, content: &ObjectRef) -> ObserverResult<ContentSnapshot>;

    /// Watch streams added/removed
    async fn watch_content(
        &self,
        content: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription>;

    // ===== Stream =====

    async fn prepare_stream(&self, stream: &ObjectRef) -> ObserverResult<StreamSnapshot>;

    async fn stream_local_sending_state(&self, stream: &ObjectRef) -> ObserverResult<SendingState>;

    /// Remote members in bus order
    async fn stream_remote_members(
        &self,
        stream: &ObjectRef,
    ) -> ObserverResult<Vec<Member<SendingState>>>;

    /// Watch local sending state and remote member changes
    async fn watch_stream(
        &self,
        stream: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription>;

    // ===== Low-level properties =====

    /// Open a fresh property proxy and forward its changes tagged with `key`
    async fn watch_properties(
        &self,
        object: &ObjectRef,
        interface: &str,
        key: WatchKey,
        sink: NotificationSink,
    ) -> ObserverResult<PropertyWatch>;
}
