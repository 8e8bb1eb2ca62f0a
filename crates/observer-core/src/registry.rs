//! Records of everything under observation
//!
//! The registry is owned by the observer loop. Each record owns the
//! subscriptions of its entity, so removing a record (and the records below
//! it) releases every watcher of that subtree.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::bus::PropertyWatch;
use crate::presentation::EntityTag;
use crate::subscription::Subscription;
use crate::types::{MediaType, ObjectPath, ObjectRef};

/// Immutable description of an attached content, shared with its streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub target: ObjectRef,
    pub channel: ObjectPath,
    pub name: String,
    pub media_type: MediaType,
    pub interfaces: Vec<String>,
}

impl ContentRef {
    pub fn path(&self) -> &ObjectPath {
        &self.target.path
    }

    pub fn tag(&self) -> EntityTag {
        EntityTag::Content(self.media_type)
    }

    /// Tag for streams owned by this content
    pub fn stream_tag(&self) -> EntityTag {
        EntityTag::Stream(self.media_type)
    }
}

#[derive(Debug)]
pub struct ChannelRecord {
    pub target: ObjectRef,
    pub subscription: Option<Subscription>,
}

impl ChannelRecord {
    pub fn new(target: ObjectRef) -> Self {
        Self {
            target,
            subscription: None,
        }
    }
}

#[derive(Debug)]
pub struct ContentRecord {
    pub info: Arc<ContentRef>,
    pub subscription: Option<Subscription>,
    pub media: Option<PropertyWatch>,
}

impl ContentRecord {
    pub fn new(info: Arc<ContentRef>) -> Self {
        Self {
            info,
            subscription: None,
            media: None,
        }
    }
}

#[derive(Debug)]
pub struct StreamRecord {
    pub target: ObjectRef,
    /// The owning content, fixed for the lifetime of the stream
    pub content: Arc<ContentRef>,
    pub subscription: Option<Subscription>,
    pub media: Option<PropertyWatch>,
    pub endpoints: BTreeMap<ObjectPath, PropertyWatch>,
}

impl StreamRecord {
    pub fn new(target: ObjectRef, content: Arc<ContentRef>) -> Self {
        Self {
            target,
            content,
            subscription: None,
            media: None,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn tag(&self) -> EntityTag {
        self.content.stream_tag()
    }
}

/// A content that is being prepared or is attached
#[derive(Debug)]
pub enum ContentEntry {
    Pending {
        channel: ObjectPath,
        /// Matches the completion of the prepare that created this entry
        generation: u64,
        prepare: Subscription,
    },
    Attached(ContentRecord),
}

impl ContentEntry {
    pub fn channel(&self) -> &ObjectPath {
        match self {
            ContentEntry::Pending { channel, .. } => channel,
            ContentEntry::Attached(record) => &record.info.channel,
        }
    }
}

/// A stream that is being prepared or is attached
#[derive(Debug)]
pub enum StreamEntry {
    Pending {
        content: Arc<ContentRef>,
        generation: u64,
        prepare: Subscription,
    },
    Attached(StreamRecord),
}

impl StreamEntry {
    pub fn content(&self) -> &Arc<ContentRef> {
        match self {
            StreamEntry::Pending { content, .. } => content,
            StreamEntry::Attached(record) => &record.content,
        }
    }
}

/// Counts of what is currently observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    pub channels: usize,
    pub pending_contents: usize,
    pub contents: usize,
    pub pending_streams: usize,
    pub streams: usize,
    pub endpoint_watchers: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    channels: HashMap<ObjectPath, ChannelRecord>,
    contents: HashMap<ObjectPath, ContentEntry>,
    streams: HashMap<ObjectPath, StreamEntry>,
    prepares: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next prepare so a late completion cannot match a newer one
    pub fn next_prepare(&mut self) -> u64 {
        self.prepares += 1;
        self.prepares
    }

    // ===== Channels =====

    pub fn has_channel(&self, path: &ObjectPath) -> bool {
        self.channels.contains_key(path)
    }

    pub fn insert_channel(&mut self, record: ChannelRecord) {
        self.channels.insert(record.target.path.clone(), record);
    }

    pub fn channel(&self, path: &ObjectPath) -> Option<&ChannelRecord> {
        self.channels.get(path)
    }

    pub fn channel_mut(&mut self, path: &ObjectPath) -> Option<&mut ChannelRecord> {
        self.channels.get_mut(path)
    }

    /// Remove a channel together with its contents and their streams
    pub fn remove_channel(&mut self, path: &ObjectPath) -> Option<ChannelRecord> {
        let record = self.channels.remove(path)?;
        let contents: Vec<ObjectPath> = self
            .contents
            .iter()
            .filter(|(_, entry)| entry.channel() == path)
            .map(|(content, _)| content.clone())
            .collect();
        for content in contents {
            self.remove_content(&content);
        }
        Some(record)
    }

    // ===== Contents =====

    /// Whether the content is pending or attached
    pub fn has_content(&self, path: &ObjectPath) -> bool {
        self.contents.contains_key(path)
    }

    pub fn insert_pending_content(
        &mut self,
        path: ObjectPath,
        channel: ObjectPath,
        generation: u64,
        prepare: Subscription,
    ) {
        self.contents.insert(
            path,
            ContentEntry::Pending {
                channel,
                generation,
                prepare,
            },
        );
    }

    /// Take a pending content out of the registry, returning its channel
    ///
    /// Only the prepare numbered `generation` may take the entry.
    pub fn take_pending_content(
        &mut self,
        path: &ObjectPath,
        generation: u64,
    ) -> Option<ObjectPath> {
        if !matches!(
            self.contents.get(path),
            Some(ContentEntry::Pending { generation: pending, .. }) if *pending == generation
        ) {
            return None;
        }
        match self.contents.remove(path) {
            Some(ContentEntry::Pending { channel, .. }) => Some(channel),
            _ => None,
        }
    }

    pub fn attach_content(&mut self, record: ContentRecord) {
        self.contents
            .insert(record.info.path().clone(), ContentEntry::Attached(record));
    }

    pub fn content(&self, path: &ObjectPath) -> Option<&ContentRecord> {
        match self.contents.get(path) {
            Some(ContentEntry::Attached(record)) => Some(record),
            _ => None,
        }
    }

    pub fn content_mut(&mut self, path: &ObjectPath) -> Option<&mut ContentRecord> {
        match self.contents.get_mut(path) {
            Some(ContentEntry::Attached(record)) => Some(record),
            _ => None,
        }
    }

    /// Remove a content together with its streams
    pub fn remove_content(&mut self, path: &ObjectPath) -> Option<ContentEntry> {
        let entry = self.contents.remove(path)?;
        self.streams
            .retain(|_, stream| stream.content().path() != path);
        Some(entry)
    }

    // ===== Streams =====

    pub fn has_stream(&self, path: &ObjectPath) -> bool {
        self.streams.contains_key(path)
    }

    pub fn insert_pending_stream(
        &mut self,
        path: ObjectPath,
        content: Arc<ContentRef>,
        generation: u64,
        prepare: Subscription,
    ) {
        self.streams.insert(
            path,
            StreamEntry::Pending {
                content,
                generation,
                prepare,
            },
        );
    }

    /// Take a pending stream out of the registry, returning its owning content
    pub fn take_pending_stream(
        &mut self,
        path: &ObjectPath,
        generation: u64,
    ) -> Option<Arc<ContentRef>> {
        if !matches!(
            self.streams.get(path),
            Some(StreamEntry::Pending { generation: pending, .. }) if *pending == generation
        ) {
            return None;
        }
        match self.streams.remove(path) {
            Some(StreamEntry::Pending { content, .. }) => Some(content),
            _ => None,
        }
    }

    pub fn attach_stream(&mut self, record: StreamRecord) {
        self.streams
            .insert(record.target.path.clone(), StreamEntry::Attached(record));
    }

    pub fn stream(&self, path: &ObjectPath) -> Option<&StreamRecord> {
        match self.streams.get(path) {
            Some(StreamEntry::Attached(record)) => Some(record),
            _ => None,
        }
    }

    pub fn stream_mut(&mut self, path: &ObjectPath) -> Option<&mut StreamRecord> {
        match self.streams.get_mut(path) {
            Some(StreamEntry::Attached(record)) => Some(record),
            _ => None,
        }
    }

    pub fn remove_stream(&mut self, path: &ObjectPath) -> Option<StreamEntry> {
        self.streams.remove(path)
    }

    pub fn stats(&self) -> ObserverStats {
        let mut stats = ObserverStats {
            channels: self.channels.len(),
            ..ObserverStats::default()
        };
        for entry in self.contents.values() {
            match entry {
                ContentEntry::Pending { .. } => stats.pending_contents += 1,
                ContentEntry::Attached(_) => stats.contents += 1,
            }
        }
        for entry in self.streams.values() {
            match entry {
                StreamEntry::Pending { .. } => stats.pending_streams += 1,
                StreamEntry::Attached(record) => {
                    stats.streams += 1;
                    stats.endpoint_watchers += record.endpoints.len();
                }
            }
        }
        stats
    }

    /// Drop every record, releasing all subscriptions
    pub fn clear(&mut self) {
        self.streams.clear();
        self.contents.clear();
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(label: &str, released: &Arc<AtomicUsize>) -> Subscription {
        let released = released.clone();
        Subscription::new(label, move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn content_ref(path: &str, channel: &str) -> Arc<ContentRef> {
        Arc::new(ContentRef {
            target: ObjectRef::new("org.example.CM", path),
            channel: channel.into(),
            name: "audio".to_string(),
            media_type: MediaType::Audio,
            interfaces: Vec::new(),
        })
    }

    #[test]
    fn test_take_pending_only_matches_pending() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry.insert_pending_content("/c/1".into(), "/c".into(), 1, counted("p", &released));

        assert_eq!(registry.take_pending_content(&"/c/1".into(), 1), Some("/c".into()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(registry.take_pending_content(&"/c/1".into(), 1), None);

        registry.attach_content(ContentRecord::new(content_ref("/c/1", "/c")));
        assert_eq!(registry.take_pending_content(&"/c/1".into(), 1), None);
        assert!(registry.content(&"/c/1".into()).is_some());
    }

    #[test]
    fn test_removing_channel_cascades() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();

        let mut channel = ChannelRecord::new(ObjectRef::new("org.example.CM", "/c"));
        channel.subscription = Some(counted("channel", &released));
        registry.insert_channel(channel);

        let info = content_ref("/c/1", "/c");
        let mut content = ContentRecord::new(info.clone());
        content.subscription = Some(counted("content", &released));
        registry.attach_content(content);
        registry.insert_pending_content("/c/2".into(), "/c".into(), 1, counted("prepare", &released));

        let mut stream = StreamRecord::new(ObjectRef::new("org.example.CM", "/c/1/s"), info.clone());
        stream.subscription = Some(counted("stream", &released));
        registry.attach_stream(stream);
        registry.insert_pending_stream("/c/1/t".into(), info, 2, counted("prepare", &released));

        // Unrelated channel survives
        registry.insert_channel(ChannelRecord::new(ObjectRef::new("org.example.CM", "/d")));

        assert!(registry.remove_channel(&"/c".into()).is_some());
        assert_eq!(released.load(Ordering::SeqCst), 5);
        assert_eq!(
            registry.stats(),
            ObserverStats {
                channels: 1,
                ..ObserverStats::default()
            }
        );
    }

    #[test]
    fn test_stats_count_endpoints() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let info = content_ref("/c/1", "/c");
        registry.attach_content(ContentRecord::new(info.clone()));
        registry.attach_stream(StreamRecord::new(ObjectRef::new("org.example.CM", "/c/1/s"), info));
        registry.insert_pending_content("/c/2".into(), "/c".into(), 1, counted("prepare", &released));

        let stats = registry.stats();
        assert_eq!(stats.contents, 1);
        assert_eq!(stats.pending_contents, 1);
        assert_eq!(stats.streams, 1);
        assert_eq!(stats.endpoint_watchers, 0);
    }

    #[test]
    fn test_stale_prepare_does_not_take_newer_entry() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        let first = registry.next_prepare();
        registry.insert_pending_stream(
            "/c/1/s".into(),
            content_ref("/c/1", "/c"),
            first,
            counted("old", &released),
        );
        registry.remove_stream(&"/c/1/s".into());

        let second = registry.next_prepare();
        assert_ne!(first, second);
        registry.insert_pending_stream(
            "/c/1/s".into(),
            content_ref("/c/1", "/c"),
            second,
            counted("new", &released),
        );

        assert!(registry.take_pending_stream(&"/c/1/s".into(), first).is_none());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().pending_streams, 1);
        assert!(registry.take_pending_stream(&"/c/1/s".into(), second).is_some());
    }
}
