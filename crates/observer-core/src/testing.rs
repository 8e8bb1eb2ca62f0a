//! In-memory bus and output capture for driving the observer in tests
//!
//! [`FakeCallBus`] serves channels, contents, streams and property bags from
//! plain maps, counts prepares, and tracks which subscriptions are still alive
//! so tests can check that removal releases everything below it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use crate::bus::{CallBus, PropertyProxy, PropertyWatch};
use crate::error::{ObserverError, ObserverResult};
use crate::notification::{NotificationSink, WatchKey};
use crate::subscription::Subscription;
use crate::types::{
    CallFlags, CallMemberFlags, CallState, CallStateSnapshot, ContentSnapshot, MediaType, Member,
    ObjectPath, ObjectRef, PropertyMap, PropertyValue, SendingState, StateReason, StreamSnapshot,
};

/// Cloneable in-memory writer
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A fake call channel
#[derive(Debug, Clone)]
pub struct FakeChannel {
    pub requested: bool,
    pub state: CallStateSnapshot,
    pub members: Vec<Member<CallMemberFlags>>,
    pub contents: Vec<ObjectPath>,
}

impl FakeChannel {
    pub fn new(requested: bool, state: CallState) -> Self {
        Self {
            requested,
            state: CallStateSnapshot {
                state,
                flags: CallFlags::default(),
                reason: StateReason::default(),
            },
            members: Vec::new(),
            contents: Vec::new(),
        }
    }

    pub fn with_member(mut self, handle: u32, identifier: &str, flags: u32) -> Self {
        self.members.push(Member::new(handle, identifier, CallMemberFlags(flags)));
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.contents.push(ObjectPath::from(content));
        self
    }
}

/// A fake stream
#[derive(Debug, Clone)]
pub struct FakeStream {
    pub snapshot: StreamSnapshot,
    pub local_sending_state: SendingState,
    pub remote_members: Vec<Member<SendingState>>,
}

impl FakeStream {
    pub fn new(local_sending_state: SendingState) -> Self {
        Self {
            snapshot: StreamSnapshot::default(),
            local_sending_state,
            remote_members: Vec::new(),
        }
    }

    pub fn with_remote(mut self, handle: u32, identifier: &str, state: SendingState) -> Self {
        self.remote_members.push(Member::new(handle, identifier, state));
        self
    }
}

#[derive(Default)]
struct FakeState {
    channels: HashMap<ObjectPath, FakeChannel>,
    contents: HashMap<ObjectPath, ContentSnapshot>,
    streams: HashMap<ObjectPath, FakeStream>,
    properties: HashMap<(ObjectPath, String), PropertyMap>,
    failing: HashSet<ObjectPath>,
    held: HashSet<ObjectPath>,
    prepares: HashMap<ObjectPath, usize>,
    live: BTreeMap<String, usize>,
    opened_proxies: Vec<(ObjectPath, String)>,
}

/// In-memory [`CallBus`]
#[derive(Clone, Default)]
pub struct FakeCallBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCallBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, path: &str, channel: FakeChannel) {
        self.state.lock().channels.insert(path.into(), channel);
    }

    pub fn add_content(&self, path: &str, name: &str, media_type: MediaType, streams: &[&str]) {
        self.state.lock().contents.insert(
            path.into(),
            ContentSnapshot {
                name: name.to_string(),
                media_type,
                interfaces: vec![crate::types::names::CALL_CONTENT_MEDIA.to_string()],
                streams: streams.iter().map(|s| ObjectPath::from(*s)).collect(),
            },
        );
    }

    pub fn add_stream(&self, path: &str, stream: FakeStream) {
        self.state.lock().streams.insert(path.into(), stream);
    }

    pub fn set_property(&self, path: &str, interface: &str, name: &str, value: PropertyValue) {
        self.state
            .lock()
            .properties
            .entry((path.into(), interface.to_string()))
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Drop a property, as a `PropertiesChanged` invalidation does to a cache
    pub fn remove_property(&self, path: &str, interface: &str, name: &str) {
        if let Some(properties) = self
            .state
            .lock()
            .properties
            .get_mut(&(path.into(), interface.to_string()))
        {
            properties.remove(name);
        }
    }

    pub fn set_call_state(&self, path: &str, state: CallState, flags: u32) {
        if let Some(channel) = self.state.lock().channels.get_mut(&ObjectPath::from(path)) {
            channel.state.state = state;
            channel.state.flags = CallFlags(flags);
        }
    }

    pub fn set_local_sending_state(&self, path: &str, state: SendingState) {
        if let Some(stream) = self.state.lock().streams.get_mut(&ObjectPath::from(path)) {
            stream.local_sending_state = state;
        }
    }

    /// Make every prepare of this object fail
    pub fn fail_prepare(&self, path: &str) {
        self.state.lock().failing.insert(path.into());
    }

    /// Make every prepare of this object wait forever
    pub fn hold_prepare(&self, path: &str) {
        self.state.lock().held.insert(path.into());
    }

    pub fn prepare_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .prepares
            .get(&ObjectPath::from(path))
            .copied()
            .unwrap_or(0)
    }

    /// Labels of subscriptions that have not been released, sorted
    pub fn live_subscriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .live
            .iter()
            .flat_map(|(label, count)| std::iter::repeat(label.clone()).take(*count))
            .collect()
    }

    /// Every property proxy opened so far, in order
    pub fn opened_proxies(&self) -> Vec<(ObjectPath, String)> {
        self.state.lock().opened_proxies.clone()
    }

    fn subscribe(&self, label: String) -> Subscription {
        *self.state.lock().live.entry(label.clone()).or_insert(0) += 1;
        let state = self.state.clone();
        let key = label.clone();
        Subscription::new(label, move || {
            let mut state = state.lock();
            if let Some(count) = state.live.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    state.live.remove(&key);
                }
            }
        })
    }

    async fn begin_prepare(&self, object: &ObjectRef) -> ObserverResult<()> {
        let (held, failing) = {
            let mut state = self.state.lock();
            *state.prepares.entry(object.path.clone()).or_insert(0) += 1;
            (
                state.held.contains(&object.path),
                state.failing.contains(&object.path),
            )
        };
        if held {
            std::future::pending::<()>().await;
        }
        if failing {
            return Err(ObserverError::prepare(object.path.as_str(), "prepare refused"));
        }
        Ok(())
    }

    fn missing(object: &ObjectRef, operation: &str) -> ObserverError {
        ObserverError::bus(object.path.as_str(), operation, "no such object")
    }

    fn channel(&self, object: &ObjectRef, operation: &str) -> ObserverResult<FakeChannel> {
        self.state
            .lock()
            .channels
            .get(&object.path)
            .cloned()
            .ok_or_else(|| Self::missing(object, operation))
    }

    fn stream(&self, object: &ObjectRef, operation: &str) -> ObserverResult<FakeStream> {
        self.state
            .lock()
            .streams
            .get(&object.path)
            .cloned()
            .ok_or_else(|| Self::missing(object, operation))
    }
}

struct FakePropertyProxy {
    target: ObjectRef,
    interface: String,
    state: Arc<Mutex<FakeState>>,
}

impl PropertyProxy for FakePropertyProxy {
    fn target(&self) -> &ObjectRef {
        &self.target
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn cached_properties(&self) -> PropertyMap {
        self.state
            .lock()
            .properties
            .get(&(self.target.path.clone(), self.interface.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CallBus for FakeCallBus {
    async fn channel_requested(&self, channel: &ObjectRef) -> ObserverResult<bool> {
        Ok(self.channel(channel, "Requested")?.requested)
    }

    async fn channel_state(&self, channel: &ObjectRef) -> ObserverResult<CallStateSnapshot> {
        Ok(self.channel(channel, "CallState")?.state)
    }

    async fn channel_members(
        &self,
        channel: &ObjectRef,
    ) -> ObserverResult<Vec<Member<CallMemberFlags>>> {
        Ok(self.channel(channel, "CallMembers")?.members)
    }

    async fn channel_contents(&self, channel: &ObjectRef) -> ObserverResult<Vec<ObjectPath>> {
        Ok(self.channel(channel, "Contents")?.contents)
    }

    async fn watch_channel(
        &self,
        channel: &ObjectRef,
        _sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        self.channel(channel, "watch")?;
        Ok(self.subscribe(format!("channel {}", channel.path)))
    }

    async fn prepare_content(&self, content: &ObjectRef) -> ObserverResult<ContentSnapshot> {
        self.begin_prepare(content).await?;
        self.state
            .lock()
            .contents
            .get(&content.path)
            .cloned()
            .ok_or_else(|| Self::missing(content, "prepare"))
    }

    async fn watch_content(
        &self,
        content: &ObjectRef,
        _sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        Ok(self.subscribe(format!("content {}", content.path)))
    }

    async fn prepare_stream(&self, stream: &ObjectRef) -> ObserverResult<StreamSnapshot> {
        self.begin_prepare(stream).await?;
        Ok(self.stream(stream, "prepare")?.snapshot)
    }

    async fn stream_local_sending_state(&self, stream: &ObjectRef) -> ObserverResult<SendingState> {
        Ok(self.stream(stream, "LocalSendingState")?.local_sending_state)
    }

    async fn stream_remote_members(
        &self,
        stream: &ObjectRef,
    ) -> ObserverResult<Vec<Member<SendingState>>> {
        Ok(self.stream(stream, "RemoteMembers")?.remote_members)
    }

    async fn watch_stream(
        &self,
        stream: &ObjectRef,
        _sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        Ok(self.subscribe(format!("stream {}", stream.path)))
    }

    async fn watch_properties(
        &self,
        object: &ObjectRef,
        interface: &str,
        _key: WatchKey,
        _sink: NotificationSink,
    ) -> ObserverResult<PropertyWatch> {
        self.state
            .lock()
            .opened_proxies
            .push((object.path.clone(), interface.to_string()));
        let proxy = FakePropertyProxy {
            target: object.clone(),
            interface: interface.to_string(),
            state: self.state.clone(),
        };
        Ok(PropertyWatch {
            proxy: Arc::new(proxy),
            subscription: self.subscribe(format!("properties {}", object.path)),
        })
    }
}
