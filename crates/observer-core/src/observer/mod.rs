//! The observer engine
//!
//! [`Observer`] owns the registry and the console and reacts to one
//! [`Notification`] at a time. Every handler runs to completion before the
//! next notification is taken, so handlers never race each other. Work that
//! may take long (prepares) runs in its own task and reports back through the
//! same notification channel.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bus::CallBus;
use crate::dispatch::{ChannelDescriptor, DispatchBatch};
use crate::error::ObserverResult;
use crate::notification::{
    ChannelEvent, ContentEvent, Notification, NotificationReceiver, NotificationSink,
    PropertyChange, StreamEvent, WatchKey,
};
use crate::presentation::{Console, EntityTag};
use crate::registry::{
    ChannelRecord, ContentRecord, ContentRef, ObserverStats, Registry, StreamEntry, StreamRecord,
};
use crate::subscription::Subscription;
use crate::types::{
    names, ChannelKind, ContentSnapshot, Direction, ObjectPath, ObjectRef, PropertyMap,
    StreamSnapshot,
};


/// Process-wide observer state, owned by the notification loop
pub struct Observer {
    bus: Arc<dyn CallBus>,
    console: Console,
    sink: NotificationSink,
    registry: Registry,
}

impl Observer {
    /// Create an observer; `sink` must feed the receiver later passed to [`Observer::run`]
    pub fn new(bus: Arc<dyn CallBus>, console: Console, sink: NotificationSink) -> Self {
        Self {
            bus,
            console,
            sink,
            registry: Registry::new(),
        }
    }

    pub fn stats(&self) -> ObserverStats {
        self.registry.stats()
    }

    /// Process notifications until `shutdown` resolves or every sender is gone
    pub async fn run<F>(mut self, mut notifications: NotificationReceiver, shutdown: F) -> ObserverStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = notifications.recv() => match next {
                    Some(notification) => self.handle(notification).await,
                    None => {
                        debug!("Notification channel closed");
                        break;
                    }
                },
            }
        }
        self.shutdown()
    }

    /// Release everything still under observation
    pub fn shutdown(mut self) -> ObserverStats {
        let stats = self.registry.stats();
        info!(
            "Releasing {} channels, {} contents, {} streams",
            stats.channels, stats.contents, stats.streams
        );
        self.registry.clear();
        stats
    }

    /// React to a single notification
    pub async fn handle(&mut self, notification: Notification) {
        let result = match notification {
            Notification::Dispatch(batch) => {
                self.observe_channels(batch).await;
                Ok(())
            }
            Notification::Channel { channel, event } => self.on_channel_event(&channel, event).await,
            Notification::Content { content, event } => self.on_content_event(&content, event),
            Notification::Stream { stream, event } => self.on_stream_event(&stream, event).await,
            Notification::Properties { watch, change } => {
                self.on_properties_changed(watch, change).await
            }
            Notification::ContentPrepared {
                channel,
                content,
                generation,
                result,
            } => {
                self.on_content_prepared(&channel, content, generation, result)
                    .await
            }
            Notification::StreamPrepared {
                content,
                stream,
                generation,
                result,
            } => {
                self.on_stream_prepared(&content, stream, generation, result)
                    .await
            }
        };

        if let Err(e) = result {
            error!("{}", e);
        }
    }

    // ===== Dispatch =====

    async fn observe_channels(&mut self, batch: DispatchBatch) {
        let DispatchBatch {
            account,
            connection,
            channels,
            completion,
            ..
        } = batch;
        debug!(
            "ObserveChannels from {} on {}: {} channels",
            account,
            connection,
            channels.len()
        );

        for descriptor in channels {
            if let ChannelKind::Other(channel_type) = descriptor.kind() {
                debug!("Ignoring {} channel {}", channel_type, descriptor.path());
                continue;
            }
            if self.registry.has_channel(descriptor.path()) {
                debug!("Channel {} is already observed", descriptor.path());
                continue;
            }
            if let Err(e) = self.observe_channel(&descriptor).await {
                error!("Failed to observe channel {}: {}", descriptor.path(), e);
                self.registry.remove_channel(descriptor.path());
            }
        }

        completion.accept();
    }

    async fn observe_channel(&mut self, descriptor: &ChannelDescriptor) -> ObserverResult<()> {
        let target = descriptor.target.clone();
        let path = target.path.clone();
        self.console
            .print(EntityTag::Channel, format!("Observing channel {}", path));

        let requested = match descriptor.requested {
            Some(requested) => requested,
            None => self.bus.channel_requested(&target).await?,
        };
        self.console.print(
            EntityTag::Channel,
            format!(" -- {} --", Direction::from_requested(requested)),
        );
        self.print_channel_state(&target).await?;

        self.registry.insert_channel(ChannelRecord::new(target.clone()));
        let subscription = self.bus.watch_channel(&target, self.sink.clone()).await?;
        if let Some(record) = self.registry.channel_mut(&path) {
            record.subscription = Some(subscription);
        }

        for content in self.bus.channel_contents(&target).await? {
            self.add_content(&target, content);
        }
        self.print_channel_members(&target).await
    }

    // ===== Channel events =====

    async fn on_channel_event(
        &mut self,
        channel: &ObjectPath,
        event: ChannelEvent,
    ) -> ObserverResult<()> {
        let event = match event {
            ChannelEvent::Invalidated { message } => {
                self.console
                    .print(EntityTag::Channel, format!("Channel closed: {}", message));
                self.registry.remove_channel(channel);
                return Ok(());
            }
            other => other,
        };

        let Some(target) = self.registry.channel(channel).map(|r| r.target.clone()) else {
            warn!("Ignoring event for unobserved channel {}", channel);
            return Ok(());
        };

        match event {
            ChannelEvent::ContentAdded(content) => {
                self.add_content(&target, content);
                Ok(())
            }
            ChannelEvent::ContentRemoved { content, reason } => {
                debug!("Content {} removed: {:?}", content, reason);
                let (tag, name) = match self.registry.content(&content) {
                    Some(record) => (record.info.tag(), record.info.name.clone()),
                    None => (EntityTag::Other, content.to_string()),
                };
                self.console.print(tag, format!("Content removed: {}", name));
                self.registry.remove_content(&content);
                Ok(())
            }
            ChannelEvent::StateChanged => self.print_channel_state(&target).await,
            ChannelEvent::MembersChanged => self.print_channel_members(&target).await,
            ChannelEvent::Invalidated { .. } => Ok(()),
        }
    }

    async fn print_channel_state(&mut self, channel: &ObjectRef) -> ObserverResult<()> {
        let snapshot = self.bus.channel_state(channel).await?;
        self.console.print(
            EntityTag::Channel,
            format!(
                "State changed: {} (flags: {})",
                snapshot.state, snapshot.flags
            ),
        );
        Ok(())
    }

    async fn print_channel_members(&mut self, channel: &ObjectRef) -> ObserverResult<()> {
        let members = self.bus.channel_members(channel).await?;
        self.console.print_bold(EntityTag::Channel, "Channel members:");
        for member in members {
            self.console.print_bold(
                EntityTag::Channel,
                format!(" {}: {}", member.contact.identifier, member.value),
            );
        }
        Ok(())
    }

    // ===== Contents =====

    fn add_content(&mut self, channel: &ObjectRef, content: ObjectPath) {
        if self.registry.has_content(&content) {
            debug!("Content {} is already pending or attached", content);
            return;
        }

        let bus = self.bus.clone();
        let sink = self.sink.clone();
        let target = channel.sibling(content.clone());
        let channel_path = channel.path.clone();
        let generation = self.registry.next_prepare();
        let task = tokio::spawn(async move {
            let result = bus.prepare_content(&target).await;
            let _ = sink.send(Notification::ContentPrepared {
                channel: channel_path,
                content: target.path,
                generation,
                result,
            });
        });

        debug!("Preparing content {} (prepare #{})", content, generation);
        let prepare = Subscription::from_task(format!("prepare {}", content), task);
        self.registry
            .insert_pending_content(content, channel.path.clone(), generation, prepare);
    }

    async fn on_content_prepared(
        &mut self,
        channel: &ObjectPath,
        content: ObjectPath,
        generation: u64,
        result: ObserverResult<ContentSnapshot>,
    ) -> ObserverResult<()> {
        if self
            .registry
            .take_pending_content(&content, generation)
            .is_none()
        {
            debug!(
                "Discarding prepare #{} of content {} that is no longer pending",
                generation, content
            );
            return Ok(());
        }
        let snapshot = result?;
        let Some(channel_target) = self.registry.channel(channel).map(|r| r.target.clone()) else {
            debug!("Channel {} went away while content {} was prepared", channel, content);
            return Ok(());
        };

        let info = Arc::new(ContentRef {
            target: channel_target.sibling(content.clone()),
            channel: channel.clone(),
            name: snapshot.name,
            media_type: snapshot.media_type,
            interfaces: snapshot.interfaces,
        });
        if let Err(e) = self.attach_content(info, snapshot.streams).await {
            self.registry.remove_content(&content);
            return Err(e);
        }
        Ok(())
    }

    async fn attach_content(
        &mut self,
        info: Arc<ContentRef>,
        streams: Vec<ObjectPath>,
    ) -> ObserverResult<()> {
        let tag = info.tag();
        let path = info.path().clone();
        self.console
            .print(tag, format!("New content: {} ({})", info.name, path));
        self.console
            .print(tag, format!("  Media type: {}", info.media_type));
        self.console.print(tag, "  Interfaces:");
        for interface in &info.interfaces {
            self.console.print(tag, format!("   - {}", interface));
        }

        self.registry.attach_content(ContentRecord::new(info.clone()));
        let subscription = self.bus.watch_content(&info.target, self.sink.clone()).await?;
        if let Some(record) = self.registry.content_mut(&path) {
            record.subscription = Some(subscription);
        }

        for stream in streams {
            self.add_stream(&info, stream);
        }

        let media = self
            .bus
            .watch_properties(
                &info.target,
                names::CALL_CONTENT_MEDIA,
                WatchKey::ContentMedia(path.clone()),
                self.sink.clone(),
            )
            .await?;
        self.console
            .print(tag, format!("  Content ({}) media properties:", info.name));
        self.console
            .print_properties(tag, &media.proxy.cached_properties());
        if let Some(record) = self.registry.content_mut(&path) {
            record.media = Some(media);
        }
        Ok(())
    }

    fn on_content_event(&mut self, content: &ObjectPath, event: ContentEvent) -> ObserverResult<()> {
        match event {
            ContentEvent::StreamsAdded(streams) => {
                let Some(info) = self.registry.content(content).map(|r| r.info.clone()) else {
                    warn!("Ignoring streams added to unattached content {}", content);
                    return Ok(());
                };
                for stream in streams {
                    self.add_stream(&info, stream);
                }
            }
            ContentEvent::StreamsRemoved { streams, reason } => {
                debug!("Streams removed from {}: {:?}", content, reason);
                for stream in streams {
                    self.remove_stream(content, &stream);
                }
            }
        }
        Ok(())
    }

    // ===== Streams =====

    fn add_stream(&mut self, content: &Arc<ContentRef>, stream: ObjectPath) {
        if self.registry.has_stream(&stream) {
            debug!("Stream {} is already pending or attached", stream);
            return;
        }

        let bus = self.bus.clone();
        let sink = self.sink.clone();
        let target = content.target.sibling(stream.clone());
        let content_path = content.path().clone();
        let generation = self.registry.next_prepare();
        let task = tokio::spawn(async move {
            let result = bus.prepare_stream(&target).await;
            let _ = sink.send(Notification::StreamPrepared {
                content: content_path,
                stream: target.path,
                generation,
                result,
            });
        });

        debug!("Preparing stream {} (prepare #{})", stream, generation);
        let prepare = Subscription::from_task(format!("prepare {}", stream), task);
        self.registry
            .insert_pending_stream(stream, content.clone(), generation, prepare);
    }

    fn remove_stream(&mut self, content: &ObjectPath, stream: &ObjectPath) {
        let (tag, name) = match self.registry.remove_stream(stream) {
            Some(entry) => {
                let owner = entry.content();
                if matches!(entry, StreamEntry::Pending { .. }) {
                    debug!("Cancelled prepare of stream {}", stream);
                }
                (owner.stream_tag(), owner.name.clone())
            }
            None => match self.registry.content(content) {
                Some(record) => (record.info.stream_tag(), record.info.name.clone()),
                None => (EntityTag::Other, stream.to_string()),
            },
        };
        self.console.print(tag, format!("Stream ({}) removed", name));
    }

    async fn on_stream_prepared(
        &mut self,
        content: &ObjectPath,
        stream: ObjectPath,
        generation: u64,
        result: ObserverResult<StreamSnapshot>,
    ) -> ObserverResult<()> {
        let Some(owner) = self.registry.take_pending_stream(&stream, generation) else {
            debug!(
                "Discarding prepare #{} of stream {} on {} that is no longer pending",
                generation, stream, content
            );
            return Ok(());
        };
        let snapshot = result?;

        if let Err(e) = self.attach_stream(owner, stream.clone(), snapshot).await {
            self.registry.remove_stream(&stream);
            return Err(e);
        }
        Ok(())
    }

    async fn attach_stream(
        &mut self,
        owner: Arc<ContentRef>,
        path: ObjectPath,
        snapshot: StreamSnapshot,
    ) -> ObserverResult<()> {
        let record = StreamRecord::new(owner.target.sibling(path.clone()), owner.clone());
        let target = record.target.clone();
        let tag = record.tag();
        debug!(
            "Stream {} implements {} interfaces",
            path,
            snapshot.interfaces.len()
        );

        self.console
            .print(tag, format!("New stream on {} ({})", owner.name, path));
        self.console.print(tag, "  Interfaces:");
        for interface in &owner.interfaces {
            self.console.print(tag, format!("   - {}", interface));
        }

        self.registry.attach_stream(record);
        let subscription = self.bus.watch_stream(&target, self.sink.clone()).await?;
        if let Some(record) = self.registry.stream_mut(&path) {
            record.subscription = Some(subscription);
        }

        self.print_local_sending_state(&target, &owner).await?;
        self.print_stream_members(&target, &owner).await?;

        let media = self
            .bus
            .watch_properties(
                &target,
                names::CALL_STREAM_MEDIA,
                WatchKey::StreamMedia(path.clone()),
                self.sink.clone(),
            )
            .await?;
        let properties = media.proxy.cached_properties();
        self.print_stream_media(&owner, &properties);
        let endpoints = properties
            .get(names::ENDPOINTS)
            .map(|value| value.object_paths())
            .unwrap_or_default();
        if let Some(record) = self.registry.stream_mut(&path) {
            record.media = Some(media);
        }

        self.reconcile_endpoints(&path, endpoints).await
    }

    async fn on_stream_event(&mut self, stream: &ObjectPath, event: StreamEvent) -> ObserverResult<()> {
        let Some((target, owner)) = self
            .registry
            .stream(stream)
            .map(|r| (r.target.clone(), r.content.clone()))
        else {
            warn!("Ignoring event for unattached stream {}", stream);
            return Ok(());
        };

        match event {
            StreamEvent::LocalSendingStateChanged => {
                self.print_local_sending_state(&target, &owner).await
            }
            StreamEvent::RemoteMembersChanged => self.print_stream_members(&target, &owner).await,
        }
    }

    async fn print_local_sending_state(
        &mut self,
        stream: &ObjectRef,
        owner: &ContentRef,
    ) -> ObserverResult<()> {
        let state = self.bus.stream_local_sending_state(stream).await?;
        self.console.print_bold(
            owner.stream_tag(),
            format!("Stream ({}) local sending state: {}", owner.name, state),
        );
        Ok(())
    }

    async fn print_stream_members(
        &mut self,
        stream: &ObjectRef,
        owner: &ContentRef,
    ) -> ObserverResult<()> {
        let members = self.bus.stream_remote_members(stream).await?;
        let tag = owner.stream_tag();
        self.console
            .print_bold(tag, format!("Stream ({}) members:", owner.name));
        for member in members {
            self.console.print_bold(
                tag,
                format!(" {}: {}", member.contact.identifier, member.value),
            );
        }
        Ok(())
    }

    fn print_stream_media(&mut self, owner: &ContentRef, properties: &PropertyMap) {
        let tag = owner.stream_tag();
        self.console
            .print(tag, format!("Stream ({}) media properties:", owner.name));
        self.console.print_properties(tag, properties);
        self.console.print(tag, "---");
    }

    // ===== Endpoints =====

    /// Keep exactly one endpoint watcher per listed path
    async fn reconcile_endpoints(
        &mut self,
        stream: &ObjectPath,
        wanted: Vec<ObjectPath>,
    ) -> ObserverResult<()> {
        let Some(record) = self.registry.stream_mut(stream) else {
            return Ok(());
        };
        let owner = record.content.clone();
        let target = record.target.clone();

        let wanted_set: BTreeSet<ObjectPath> = wanted.iter().cloned().collect();
        record.endpoints.retain(|endpoint, _| {
            let keep = wanted_set.contains(endpoint);
            if !keep {
                debug!("Releasing endpoint watcher {}", endpoint);
            }
            keep
        });
        let mut fresh: Vec<ObjectPath> = Vec::new();
        for endpoint in wanted {
            if !record.endpoints.contains_key(&endpoint) && !fresh.contains(&endpoint) {
                fresh.push(endpoint);
            }
        }

        let tag = owner.stream_tag();
        for endpoint in fresh {
            let watch = self
                .bus
                .watch_properties(
                    &target.sibling(endpoint.clone()),
                    names::CALL_STREAM_ENDPOINT,
                    WatchKey::Endpoint {
                        stream: stream.clone(),
                        endpoint: endpoint.clone(),
                    },
                    self.sink.clone(),
                )
                .await?;
            self.console
                .print(tag, format!("Endpoint ({}) media properties:", owner.name));
            self.console
                .print_properties(tag, &watch.proxy.cached_properties());
            self.console.print(tag, "---");

            match self.registry.stream_mut(stream) {
                Some(record) => {
                    record.endpoints.insert(endpoint, watch);
                }
                None => return Ok(()),
            }
        }
        Ok(())
    }

    // ===== Low-level properties =====

    async fn on_properties_changed(
        &mut self,
        watch: WatchKey,
        change: PropertyChange,
    ) -> ObserverResult<()> {
        match watch {
            WatchKey::ContentMedia(content) => {
                let Some((info, properties)) = self.registry.content(&content).and_then(|r| {
                    let media = r.media.as_ref()?;
                    Some((r.info.clone(), media.proxy.cached_properties()))
                }) else {
                    debug!("Ignoring media change on released content {}", content);
                    return Ok(());
                };
                let tag = info.tag();
                self.console
                    .print(tag, format!("  Content ({}) media properties:", info.name));
                self.console.print_properties(tag, &properties);
            }
            WatchKey::StreamMedia(stream) => {
                let Some((owner, properties)) = self.registry.stream(&stream).and_then(|r| {
                    let media = r.media.as_ref()?;
                    Some((r.content.clone(), media.proxy.cached_properties()))
                }) else {
                    debug!("Ignoring media change on released stream {}", stream);
                    return Ok(());
                };
                self.print_stream_media(&owner, &properties);

                // An invalidated list is re-read from the refreshed cache
                let endpoints = match change.changed.get(names::ENDPOINTS) {
                    Some(endpoints) => Some(endpoints.object_paths()),
                    None if change.invalidated.iter().any(|n| n == names::ENDPOINTS) => Some(
                        properties
                            .get(names::ENDPOINTS)
                            .map(|value| value.object_paths())
                            .unwrap_or_default(),
                    ),
                    None => None,
                };
                if let Some(endpoints) = endpoints {
                    self.reconcile_endpoints(&stream, endpoints).await?;
                }
            }
            WatchKey::Endpoint { stream, endpoint } => {
                let Some((owner, properties)) = self.registry.stream(&stream).and_then(|r| {
                    let watch = r.endpoints.get(&endpoint)?;
                    Some((r.content.clone(), watch.proxy.cached_properties()))
                }) else {
                    debug!("Ignoring change on released endpoint {}", endpoint);
                    return Ok(());
                };
                let tag = owner.stream_tag();
                self.console
                    .print(tag, format!("Endpoint ({}) media properties:", owner.name));
                self.console.print_properties(tag, &properties);
                self.console.print(tag, "---");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("registry", &self.registry)
            .finish()
    }
}
