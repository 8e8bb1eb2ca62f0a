//! Domain types for observed Call channels
//!
//! Everything here is a plain value reported by the middleware. The observer
//! never validates transitions or flag combinations, it only names them.

use std::collections::BTreeMap;
use std::fmt;

/// Fully-qualified D-Bus interface and property names of the Telepathy Call API
pub mod names {
    pub const CHANNEL: &str = "org.freedesktop.Telepathy.Channel";
    pub const CHANNEL_TYPE_CALL: &str = "org.freedesktop.Telepathy.Channel.Type.Call1";
    pub const CALL_CONTENT: &str = "org.freedesktop.Telepathy.Call1.Content";
    pub const CALL_CONTENT_MEDIA: &str = "org.freedesktop.Telepathy.Call1.Content.Interface.Media";
    pub const CALL_STREAM: &str = "org.freedesktop.Telepathy.Call1.Stream";
    pub const CALL_STREAM_MEDIA: &str = "org.freedesktop.Telepathy.Call1.Stream.Interface.Media";
    pub const CALL_STREAM_ENDPOINT: &str = "org.freedesktop.Telepathy.Call1.Stream.Endpoint";

    pub const PROP_CHANNEL_TYPE: &str = "org.freedesktop.Telepathy.Channel.ChannelType";
    pub const PROP_TARGET_HANDLE_TYPE: &str = "org.freedesktop.Telepathy.Channel.TargetHandleType";
    pub const PROP_TARGET_ID: &str = "org.freedesktop.Telepathy.Channel.TargetID";
    pub const PROP_REQUESTED: &str = "org.freedesktop.Telepathy.Channel.Requested";

    /// Property of the stream media interface listing endpoint object paths
    pub const ENDPOINTS: &str = "Endpoints";
}

/// A D-Bus object path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Where an object lives: the owning bus name plus its path
///
/// Channels, contents, streams and endpoints of one call all share the bus
/// name of the connection manager that owns the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bus_name: String,
    pub path: ObjectPath,
}

impl ObjectRef {
    pub fn new(bus_name: impl Into<String>, path: impl Into<ObjectPath>) -> Self {
        Self {
            bus_name: bus_name.into(),
            path: path.into(),
        }
    }

    /// Another object owned by the same bus name
    pub fn sibling(&self, path: ObjectPath) -> Self {
        Self {
            bus_name: self.bus_name.clone(),
            path,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bus_name, self.path)
    }
}

/// Kind of a dispatched channel, resolved from its `ChannelType`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Call,
    Other(String),
}

impl ChannelKind {
    pub fn from_channel_type(channel_type: &str) -> Self {
        if channel_type == names::CHANNEL_TYPE_CALL {
            ChannelKind::Call
        } else {
            ChannelKind::Other(channel_type.to_string())
        }
    }
}

/// Telepathy handle types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    None,
    Contact,
    Room,
    Group,
    Unknown(u32),
}

impl HandleType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => HandleType::None,
            1 => HandleType::Contact,
            2 => HandleType::Room,
            4 => HandleType::Group,
            other => HandleType::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            HandleType::None => 0,
            HandleType::Contact => 1,
            HandleType::Room => 2,
            HandleType::Group => 4,
            HandleType::Unknown(other) => other,
        }
    }
}

/// Who initiated the call, from the channel's `Requested` property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn from_requested(requested: bool) -> Self {
        if requested {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        })
    }
}

/// Call channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unknown,
    PendingInitiator,
    Initialising,
    Initialised,
    Accepted,
    Active,
    Ended,
    /// A value this build does not know about
    Other(u32),
}

impl CallState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => CallState::Unknown,
            1 => CallState::PendingInitiator,
            2 => CallState::Initialising,
            3 => CallState::Initialised,
            4 => CallState::Accepted,
            5 => CallState::Active,
            6 => CallState::Ended,
            other => CallState::Other(other),
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Unknown => f.write_str("unknown"),
            CallState::PendingInitiator => f.write_str("pending-initiator"),
            CallState::Initialising => f.write_str("initialising"),
            CallState::Initialised => f.write_str("initialised"),
            CallState::Accepted => f.write_str("accepted"),
            CallState::Active => f.write_str("active"),
            CallState::Ended => f.write_str("ended"),
            CallState::Other(value) => write!(f, "unknown-state({})", value),
        }
    }
}

/// Render a flag word as comma-separated nicks, or `--` when empty
fn join_flags(bits: u32, table: &[(u32, &str)]) -> String {
    if bits == 0 {
        return "--".to_string();
    }

    let mut nicks: Vec<String> = Vec::new();
    let mut known = 0;
    for (bit, nick) in table {
        if bits & bit != 0 {
            nicks.push((*nick).to_string());
            known |= bit;
        }
    }
    let rest = bits & !known;
    if rest != 0 {
        nicks.push(format!("0x{:x}", rest));
    }
    nicks.join(", ")
}

/// Flags attached to the channel's call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags(pub u32);

impl CallFlags {
    pub const LOCALLY_HELD: u32 = 1;
    pub const LOCALLY_RINGING: u32 = 2;
    pub const LOCALLY_QUEUED: u32 = 4;
    pub const FORWARDED: u32 = 8;
    pub const CLEARING: u32 = 16;

    const NICKS: &'static [(u32, &'static str)] = &[
        (Self::LOCALLY_HELD, "locally-held"),
        (Self::LOCALLY_RINGING, "locally-ringing"),
        (Self::LOCALLY_QUEUED, "locally-queued"),
        (Self::FORWARDED, "forwarded"),
        (Self::CLEARING, "clearing"),
    ];
}

impl fmt::Display for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_flags(self.0, Self::NICKS))
    }
}

/// Per-member flags of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallMemberFlags(pub u32);

impl CallMemberFlags {
    pub const RINGING: u32 = 1;
    pub const HELD: u32 = 2;
    pub const CONFERENCE_HOST: u32 = 4;

    const NICKS: &'static [(u32, &'static str)] = &[
        (Self::RINGING, "ringing"),
        (Self::HELD, "held"),
        (Self::CONFERENCE_HOST, "conference-host"),
    ];
}

impl fmt::Display for CallMemberFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_flags(self.0, Self::NICKS))
    }
}

/// Media type of a content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    Other(u32),
}

impl MediaType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => MediaType::Audio,
            1 => MediaType::Video,
            other => MediaType::Other(other),
        }
    }

    pub fn is_audio(self) -> bool {
        self == MediaType::Audio
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => f.write_str("audio"),
            MediaType::Video => f.write_str("video"),
            MediaType::Other(value) => write!(f, "unknown({})", value),
        }
    }
}

/// Sending state of a stream, local or per remote member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendingState {
    None,
    PendingSend,
    Sending,
    PendingStopSending,
    Other(u32),
}

impl SendingState {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => SendingState::None,
            1 => SendingState::PendingSend,
            2 => SendingState::Sending,
            3 => SendingState::PendingStopSending,
            other => SendingState::Other(other),
        }
    }
}

impl fmt::Display for SendingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendingState::None => f.write_str("none"),
            SendingState::PendingSend => f.write_str("pending-send"),
            SendingState::Sending => f.write_str("sending"),
            SendingState::PendingStopSending => f.write_str("pending-stop-sending"),
            SendingState::Other(value) => write!(f, "unknown({})", value),
        }
    }
}

/// Why a state changed or an object went away (`(uuss)` on the bus)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateReason {
    pub actor: u32,
    pub reason: u32,
    pub dbus_reason: String,
    pub message: String,
}

/// Live call state as read from the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStateSnapshot {
    pub state: CallState,
    pub flags: CallFlags,
    pub reason: StateReason,
}

/// A contact as seen by the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub handle: u32,
    pub identifier: String,
}

/// A contact paired with a per-contact value (flags or sending state)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member<T> {
    pub contact: Contact,
    pub value: T,
}

impl<T> Member<T> {
    pub fn new(handle: u32, identifier: impl Into<String>, value: T) -> Self {
        Self {
            contact: Contact {
                handle,
                identifier: identifier.into(),
            },
            value,
        }
    }
}

/// Properties of a prepared content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSnapshot {
    pub name: String,
    pub media_type: MediaType,
    pub interfaces: Vec<String>,
    pub streams: Vec<ObjectPath>,
}

/// Properties of a prepared stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamSnapshot {
    pub interfaces: Vec<String>,
}

/// An opaque property value, kept only for display and endpoint discovery
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    List(Vec<PropertyValue>),
    Map(Vec<(PropertyValue, PropertyValue)>),
    Struct(Vec<PropertyValue>),
    /// Anything without a structured rendering (file descriptors, ...)
    Other(String),
}

impl PropertyValue {
    /// Object paths held by this value, for `ao` and `o` properties
    pub fn object_paths(&self) -> Vec<ObjectPath> {
        match self {
            PropertyValue::ObjectPath(path) => vec![ObjectPath::new(path.clone())],
            PropertyValue::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    PropertyValue::ObjectPath(path) => Some(ObjectPath::new(path.clone())),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[PropertyValue]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => write!(f, "{:?}", v),
            PropertyValue::ObjectPath(v) => f.write_str(v),
            PropertyValue::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            PropertyValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            PropertyValue::Struct(fields) => {
                f.write_str("(")?;
                join(f, fields)?;
                f.write_str(")")
            }
            PropertyValue::Other(v) => f.write_str(v),
        }
    }
}

/// Cached properties of one interface, in name order
pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_render_nicks_or_dashes() {
        assert_eq!(CallFlags(0).to_string(), "--");
        assert_eq!(
            CallFlags(CallFlags::LOCALLY_HELD | CallFlags::CLEARING).to_string(),
            "locally-held, clearing"
        );
        assert_eq!(CallMemberFlags(CallMemberFlags::HELD | 64).to_string(), "held, 0x40");
    }

    #[test]
    fn test_unknown_enum_values_are_kept() {
        assert_eq!(CallState::from_u32(4), CallState::Accepted);
        assert_eq!(CallState::from_u32(42).to_string(), "unknown-state(42)");
        assert_eq!(MediaType::from_u32(7).to_string(), "unknown(7)");
        assert_eq!(SendingState::from_u32(2).to_string(), "sending");
        assert_eq!(HandleType::from_u32(1), HandleType::Contact);
        assert_eq!(HandleType::Contact.as_u32(), 1);
    }

    #[test]
    fn test_channel_kind_and_direction() {
        assert_eq!(ChannelKind::from_channel_type(names::CHANNEL_TYPE_CALL), ChannelKind::Call);
        assert!(matches!(
            ChannelKind::from_channel_type("org.freedesktop.Telepathy.Channel.Type.Text"),
            ChannelKind::Other(_)
        ));
        assert_eq!(Direction::from_requested(false).to_string(), "incoming");
        assert_eq!(Direction::from_requested(true).to_string(), "outgoing");
    }

    #[test]
    fn test_property_value_rendering() {
        let value = PropertyValue::Map(vec![(
            PropertyValue::Str("codec".to_string()),
            PropertyValue::List(vec![PropertyValue::UInt(8), PropertyValue::Bool(true)]),
        )]);
        assert_eq!(value.to_string(), "{\"codec\": [8, true]}");

        let tuple = PropertyValue::Struct(vec![PropertyValue::Int(-1), PropertyValue::ObjectPath("/a".into())]);
        assert_eq!(tuple.to_string(), "(-1, /a)");
    }

    #[test]
    fn test_object_paths_from_values() {
        let endpoints = PropertyValue::List(vec![
            PropertyValue::ObjectPath("/e/1".to_string()),
            PropertyValue::ObjectPath("/e/2".to_string()),
        ]);
        assert_eq!(
            endpoints.object_paths(),
            vec![ObjectPath::from("/e/1"), ObjectPath::from("/e/2")]
        );
        assert!(PropertyValue::Str("/e/1".to_string()).object_paths().is_empty());
    }
}
