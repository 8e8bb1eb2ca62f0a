//! [`CallBus`] over a zbus connection
//!
//! Every getter builds a proxy with property caching disabled and reads the
//! live value. Watches subscribe to the object's signals and forward them from
//! a spawned task; the task is aborted when the returned [`Subscription`] is
//! dropped, which also drops the signal streams and their match rules.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use zbus::proxy::{Builder, CacheProperties, ProxyDefault};
use zbus::fdo::DBusProxy;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::Connection;

use callwatch_observer_core::{
    CallBus, CallFlags, CallMemberFlags, CallState, CallStateSnapshot, ChannelEvent,
    ContentEvent, ContentSnapshot, MediaType, Member, Notification, NotificationSink, ObjectPath,
    ObjectRef, ObserverError, ObserverResult, PropertyChange, PropertyMap, PropertyProxy,
    PropertyWatch, SendingState, StateReason, StreamEvent, StreamSnapshot, Subscription, WatchKey,
};

use crate::error::BusResultExt;
use crate::proxies::{
    CallChannelProxy, CallContentProxy, CallStateReason, CallStreamProxy, ChannelProxy,
};
use crate::variant::property_map;

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

const CHANNEL_CLOSED: &str = "Channel was closed";
const OWNER_LOST: &str = "Name owner lost (service crashed?)";

/// Telepathy objects reached through a D-Bus connection
#[derive(Debug, Clone)]
pub struct TelepathyBus {
    connection: Connection,
}

impl TelepathyBus {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn proxy<T>(&self, object: &ObjectRef) -> zbus::Result<T>
    where
        T: ProxyDefault + From<zbus::Proxy<'static>>,
    {
        Builder::<T>::new(&self.connection)
            .destination(object.bus_name.clone())?
            .path(object.path.as_str().to_string())?
            .cache_properties(CacheProperties::No)
            .build()
            .await
    }
}

fn object_path(path: &OwnedObjectPath) -> ObjectPath {
    ObjectPath::from(path.as_str())
}

fn state_reason(reason: &CallStateReason) -> StateReason {
    let (actor, reason, dbus_reason, message) = reason.clone();
    StateReason {
        actor,
        reason,
        dbus_reason,
        message,
    }
}

/// Pair per-handle values with identifiers, in handle order
fn members<T>(
    values: HashMap<u32, u32>,
    identifiers: &HashMap<u32, String>,
    convert: impl Fn(u32) -> T,
) -> Vec<Member<T>> {
    let mut handles: Vec<(u32, u32)> = values.into_iter().collect();
    handles.sort_unstable_by_key(|(handle, _)| *handle);
    handles
        .into_iter()
        .map(|(handle, value)| {
            let identifier = identifiers
                .get(&handle)
                .cloned()
                .unwrap_or_else(|| format!("#{}", handle));
            Member::new(handle, identifier, convert(value))
        })
        .collect()
}

/// A `NameOwnerChanged` for the connection manager's name
///
/// Only losing the owner invalidates the channel; a new owner cannot revive it.
fn owner_change(has_new_owner: bool) -> Option<ChannelEvent> {
    if has_new_owner {
        return None;
    }
    Some(ChannelEvent::Invalidated {
        message: OWNER_LOST.to_string(),
    })
}

/// Forward until the observer loop goes away
fn forward(sink: &NotificationSink, notification: Notification) -> bool {
    if sink.send(notification).is_err() {
        debug!("Observer loop gone, stopping signal forwarding");
        return false;
    }
    true
}

#[async_trait]
impl CallBus for TelepathyBus {
    async fn channel_requested(&self, channel: &ObjectRef) -> ObserverResult<bool> {
        let proxy: ChannelProxy<'static> = self.proxy(channel).await.on(channel, "Channel")?;
        proxy.requested().await.on(channel, "Requested")
    }

    async fn channel_state(&self, channel: &ObjectRef) -> ObserverResult<CallStateSnapshot> {
        let proxy: CallChannelProxy<'static> = self.proxy(channel).await.on(channel, "Call1")?;
        let state = proxy.call_state().await.on(channel, "CallState")?;
        let flags = proxy.call_flags().await.on(channel, "CallFlags")?;
        let reason = proxy
            .call_state_reason()
            .await
            .on(channel, "CallStateReason")?;
        Ok(CallStateSnapshot {
            state: CallState::from_u32(state),
            flags: CallFlags(flags),
            reason: state_reason(&reason),
        })
    }

    async fn channel_members(
        &self,
        channel: &ObjectRef,
    ) -> ObserverResult<Vec<Member<CallMemberFlags>>> {
        let proxy: CallChannelProxy<'static> = self.proxy(channel).await.on(channel, "Call1")?;
        let flags = proxy.call_members().await.on(channel, "CallMembers")?;
        let identifiers = proxy
            .member_identifiers()
            .await
            .on(channel, "MemberIdentifiers")?;
        Ok(members(flags, &identifiers, CallMemberFlags))
    }

    async fn channel_contents(&self, channel: &ObjectRef) -> ObserverResult<Vec<ObjectPath>> {
        let proxy: CallChannelProxy<'static> = self.proxy(channel).await.on(channel, "Call1")?;
        let contents = proxy.contents().await.on(channel, "Contents")?;
        Ok(contents.iter().map(object_path).collect())
    }

    async fn watch_channel(
        &self,
        channel: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        let base: ChannelProxy<'static> = self.proxy(channel).await.on(channel, "Channel")?;
        let call: CallChannelProxy<'static> = self.proxy(channel).await.on(channel, "Call1")?;

        let mut closed = base.receive_closed().await.on(channel, "Closed")?;
        let mut added = call
            .receive_content_added()
            .await
            .on(channel, "ContentAdded")?;
        let mut removed = call
            .receive_content_removed()
            .await
            .on(channel, "ContentRemoved")?;
        let mut state = call
            .receive_call_state_signal()
            .await
            .on(channel, "CallStateChanged")?;
        let mut members = call
            .receive_call_members_signal()
            .await
            .on(channel, "CallMembersChanged")?;
        let dbus = DBusProxy::new(&self.connection).await.on(channel, "DBus")?;
        let mut owner = dbus
            .receive_name_owner_changed_with_args(&[(0, channel.bus_name.as_str())])
            .await
            .on(channel, "NameOwnerChanged")?;

        let path = channel.path.clone();
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(_) = closed.next() => ChannelEvent::Invalidated {
                        message: CHANNEL_CLOSED.to_string(),
                    },
                    Some(signal) = owner.next() => match signal.args() {
                        Ok(args) => match owner_change(args.new_owner().is_some()) {
                            Some(event) => event,
                            None => continue,
                        },
                        Err(e) => {
                            warn!("Malformed NameOwnerChanged for {}: {}", path, e);
                            continue;
                        }
                    },
                    Some(signal) = added.next() => match signal.args() {
                        Ok(args) => ChannelEvent::ContentAdded(object_path(args.content())),
                        Err(e) => {
                            warn!("Malformed ContentAdded on {}: {}", path, e);
                            continue;
                        }
                    },
                    Some(signal) = removed.next() => match signal.args() {
                        Ok(args) => ChannelEvent::ContentRemoved {
                            content: object_path(args.content()),
                            reason: state_reason(args.reason()),
                        },
                        Err(e) => {
                            warn!("Malformed ContentRemoved on {}: {}", path, e);
                            continue;
                        }
                    },
                    Some(_) = state.next() => ChannelEvent::StateChanged,
                    Some(_) = members.next() => ChannelEvent::MembersChanged,
                    else => break,
                };

                let notification = Notification::Channel {
                    channel: path.clone(),
                    event,
                };
                if !forward(&sink, notification) {
                    break;
                }
            }
        });

        Ok(Subscription::from_task(format!("channel {}", channel.path), task))
    }

    async fn prepare_content(&self, content: &ObjectRef) -> ObserverResult<ContentSnapshot> {
        let failed = |e: zbus::Error| ObserverError::prepare(content.path.as_str(), e.to_string());
        let proxy: CallContentProxy<'static> = self.proxy(content).await.map_err(failed)?;

        let name = proxy.name().await.map_err(failed)?;
        let media_type = proxy.media_type().await.map_err(failed)?;
        let interfaces = proxy.interfaces().await.map_err(failed)?;
        let streams = proxy.streams().await.map_err(failed)?;

        Ok(ContentSnapshot {
            name,
            media_type: MediaType::from_u32(media_type),
            interfaces,
            streams: streams.iter().map(object_path).collect(),
        })
    }

    async fn watch_content(
        &self,
        content: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        let proxy: CallContentProxy<'static> = self.proxy(content).await.on(content, "Content")?;
        let mut added = proxy
            .receive_streams_added()
            .await
            .on(content, "StreamsAdded")?;
        let mut removed = proxy
            .receive_streams_removed()
            .await
            .on(content, "StreamsRemoved")?;

        let path = content.path.clone();
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(signal) = added.next() => match signal.args() {
                        Ok(args) => ContentEvent::StreamsAdded(
                            args.streams().iter().map(object_path).collect(),
                        ),
                        Err(e) => {
                            warn!("Malformed StreamsAdded on {}: {}", path, e);
                            continue;
                        }
                    },
                    Some(signal) = removed.next() => match signal.args() {
                        Ok(args) => ContentEvent::StreamsRemoved {
                            streams: args.streams().iter().map(object_path).collect(),
                            reason: state_reason(args.reason()),
                        },
                        Err(e) => {
                            warn!("Malformed StreamsRemoved on {}: {}", path, e);
                            continue;
                        }
                    },
                    else => break,
                };

                let notification = Notification::Content {
                    content: path.clone(),
                    event,
                };
                if !forward(&sink, notification) {
                    break;
                }
            }
        });

        Ok(Subscription::from_task(format!("content {}", content.path), task))
    }

    async fn prepare_stream(&self, stream: &ObjectRef) -> ObserverResult<StreamSnapshot> {
        let failed = |e: zbus::Error| ObserverError::prepare(stream.path.as_str(), e.to_string());
        let proxy: CallStreamProxy<'static> = self.proxy(stream).await.map_err(failed)?;
        let interfaces = proxy.interfaces().await.map_err(failed)?;
        Ok(StreamSnapshot { interfaces })
    }

    async fn stream_local_sending_state(&self, stream: &ObjectRef) -> ObserverResult<SendingState> {
        let proxy: CallStreamProxy<'static> = self.proxy(stream).await.on(stream, "Stream")?;
        let state = proxy
            .local_sending_state()
            .await
            .on(stream, "LocalSendingState")?;
        Ok(SendingState::from_u32(state))
    }

    async fn stream_remote_members(
        &self,
        stream: &ObjectRef,
    ) -> ObserverResult<Vec<Member<SendingState>>> {
        let proxy: CallStreamProxy<'static> = self.proxy(stream).await.on(stream, "Stream")?;
        let states = proxy.remote_members().await.on(stream, "RemoteMembers")?;
        let identifiers = proxy
            .remote_member_identifiers()
            .await
            .on(stream, "RemoteMemberIdentifiers")?;
        Ok(members(states, &identifiers, SendingState::from_u32))
    }

    async fn watch_stream(
        &self,
        stream: &ObjectRef,
        sink: NotificationSink,
    ) -> ObserverResult<Subscription> {
        let proxy: CallStreamProxy<'static> = self.proxy(stream).await.on(stream, "Stream")?;
        let mut sending = proxy
            .receive_local_sending_state_signal()
            .await
            .on(stream, "LocalSendingStateChanged")?;
        let mut members = proxy
            .receive_remote_members_signal()
            .await
            .on(stream, "RemoteMembersChanged")?;

        let path = stream.path.clone();
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(_) = sending.next() => StreamEvent::LocalSendingStateChanged,
                    Some(_) = members.next() => StreamEvent::RemoteMembersChanged,
                    else => break,
                };

                let notification = Notification::Stream {
                    stream: path.clone(),
                    event,
                };
                if !forward(&sink, notification) {
                    break;
                }
            }
        });

        Ok(Subscription::from_task(format!("stream {}", stream.path), task))
    }

    async fn watch_properties(
        &self,
        object: &ObjectRef,
        interface: &str,
        key: WatchKey,
        sink: NotificationSink,
    ) -> ObserverResult<PropertyWatch> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            object.bus_name.clone(),
            object.path.as_str().to_string(),
            PROPERTIES_INTERFACE,
        )
        .await
        .on(object, "Properties")?;

        // Subscribe before the snapshot so no change falls in between
        let mut changes = proxy
            .receive_signal("PropertiesChanged")
            .await
            .on(object, "PropertiesChanged")?;
        let all: HashMap<String, OwnedValue> = proxy
            .call("GetAll", &(interface,))
            .await
            .on(object, "GetAll")?;

        let cache = Arc::new(Mutex::new(property_map(&all)));
        debug!(
            "Opened {} property proxy on {} with {} properties",
            interface,
            object.path,
            all.len()
        );

        let watched = interface.to_string();
        let task_cache = cache.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = changes.next().await {
                let body: zbus::Result<(String, HashMap<String, OwnedValue>, Vec<String>)> =
                    message.body().deserialize();
                let (changed_interface, changed, invalidated) = match body {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Malformed PropertiesChanged: {}", e);
                        continue;
                    }
                };
                if changed_interface != watched {
                    continue;
                }

                let change = PropertyChange {
                    changed: property_map(&changed),
                    invalidated,
                };
                {
                    let mut cache = task_cache.lock();
                    for (name, value) in &change.changed {
                        cache.insert(name.clone(), value.clone());
                    }
                    for name in &change.invalidated {
                        cache.remove(name);
                    }
                }

                let notification = Notification::Properties {
                    watch: key.clone(),
                    change,
                };
                if !forward(&sink, notification) {
                    break;
                }
            }
        });

        Ok(PropertyWatch {
            proxy: Arc::new(DbusPropertyProxy {
                target: object.clone(),
                interface: interface.to_string(),
                cache,
            }),
            subscription: Subscription::from_task(
                format!("properties {} {}", interface, object.path),
                task,
            ),
        })
    }
}

/// Property cache of one interface, kept current by its forwarding task
struct DbusPropertyProxy {
    target: ObjectRef,
    interface: String,
    cache: Arc<Mutex<PropertyMap>>,
}

impl PropertyProxy for DbusPropertyProxy {
    fn target(&self) -> &ObjectRef {
        &self.target
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn cached_properties(&self) -> PropertyMap {
        self.cache.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_are_sorted_by_handle() {
        let mut flags = HashMap::new();
        flags.insert(9, 0);
        flags.insert(2, CallMemberFlags::RINGING);
        flags.insert(5, CallMemberFlags::HELD);
        let mut identifiers = HashMap::new();
        identifiers.insert(2, "alice@example.com".to_string());
        identifiers.insert(9, "carol@example.com".to_string());

        let list = members(flags, &identifiers, CallMemberFlags);
        let rendered: Vec<String> = list
            .iter()
            .map(|m| format!("{}: {}", m.contact.identifier, m.value))
            .collect();
        assert_eq!(
            rendered,
            vec!["alice@example.com: ringing", "#5: held", "carol@example.com: --"]
        );
    }

    #[test]
    fn test_only_losing_the_owner_invalidates() {
        assert_eq!(owner_change(true), None);
        assert_eq!(
            owner_change(false),
            Some(ChannelEvent::Invalidated {
                message: "Name owner lost (service crashed?)".to_string(),
            })
        );
    }

    #[test]
    fn test_state_reason() {
        let reason = state_reason(&(
            3,
            2,
            "org.freedesktop.Telepathy.Error.Cancelled".to_string(),
            "hung up".to_string(),
        ));
        assert_eq!(reason.actor, 3);
        assert_eq!(reason.message, "hung up");
    }
}
