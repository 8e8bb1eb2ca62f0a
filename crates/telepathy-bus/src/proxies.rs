//! Typed proxies for the Telepathy Call1 object model
//!
//! Only what the observer reads is declared. Properties are never cached by
//! the proxies; callers build them with caching disabled and every getter is a
//! live `Get`.
//!
//! zbus derives `receive_<property>_changed` for every property, so signals
//! whose wire name ends in `Changed` are declared with a `_signal` suffix.

use std::collections::HashMap;
use zbus::proxy;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

/// `(actor, reason, dbus_reason, message)`
pub type CallStateReason = (u32, u32, String, String);

#[proxy(
    interface = "org.freedesktop.Telepathy.Channel",
    assume_defaults = false,
    gen_blocking = false
)]
pub trait Channel {
    #[zbus(property)]
    fn channel_type(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn requested(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn target_handle_type(&self) -> zbus::Result<u32>;

    #[zbus(property, name = "TargetID")]
    fn target_id(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn closed(&self) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.Telepathy.Channel.Type.Call1",
    assume_defaults = false,
    gen_blocking = false
)]
pub trait CallChannel {
    #[zbus(property)]
    fn contents(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn call_state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn call_flags(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn call_state_reason(&self) -> zbus::Result<CallStateReason>;

    #[zbus(property)]
    fn call_members(&self) -> zbus::Result<HashMap<u32, u32>>;

    #[zbus(property)]
    fn member_identifiers(&self) -> zbus::Result<HashMap<u32, String>>;

    #[zbus(signal)]
    fn content_added(&self, content: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn content_removed(
        &self,
        content: OwnedObjectPath,
        reason: CallStateReason,
    ) -> zbus::Result<()>;

    #[zbus(signal, name = "CallStateChanged")]
    fn call_state_signal(
        &self,
        call_state: u32,
        call_flags: u32,
        call_state_reason: CallStateReason,
        call_state_details: HashMap<String, OwnedValue>,
    ) -> zbus::Result<()>;

    #[zbus(signal, name = "CallMembersChanged")]
    fn call_members_signal(
        &self,
        flags_changed: HashMap<u32, u32>,
        identifiers: HashMap<u32, String>,
        removed: Vec<u32>,
        reason: CallStateReason,
    ) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.Telepathy.Call1.Content",
    assume_defaults = false,
    gen_blocking = false
)]
pub trait CallContent {
    #[zbus(property)]
    fn interfaces(&self) -> zbus::Result<Vec<String>>;

    #[zbus(property)]
    fn name(&self) -> zbus::Result<String>;

    #[zbus(property, name = "Type")]
    fn media_type(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn streams(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(signal)]
    fn streams_added(&self, streams: Vec<OwnedObjectPath>) -> zbus::Result<()>;

    #[zbus(signal)]
    fn streams_removed(
        &self,
        streams: Vec<OwnedObjectPath>,
        reason: CallStateReason,
    ) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.Telepathy.Call1.Stream",
    assume_defaults = false,
    gen_blocking = false
)]
pub trait CallStream {
    #[zbus(property)]
    fn interfaces(&self) -> zbus::Result<Vec<String>>;

    #[zbus(property)]
    fn remote_members(&self) -> zbus::Result<HashMap<u32, u32>>;

    #[zbus(property)]
    fn remote_member_identifiers(&self) -> zbus::Result<HashMap<u32, String>>;

    #[zbus(property)]
    fn local_sending_state(&self) -> zbus::Result<u32>;

    #[zbus(signal, name = "LocalSendingStateChanged")]
    fn local_sending_state_signal(
        &self,
        state: u32,
        reason: CallStateReason,
    ) -> zbus::Result<()>;

    #[zbus(signal, name = "RemoteMembersChanged")]
    fn remote_members_signal(
        &self,
        updates: HashMap<u32, u32>,
        identifiers: HashMap<u32, String>,
        removed: Vec<u32>,
        reason: CallStateReason,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::Stream;
    use zbus::Message;

    const CALL1: &str = "org.freedesktop.Telepathy.Channel.Type.Call1";
    const STREAM: &str = "org.freedesktop.Telepathy.Call1.Stream";
    const CHANNEL: &str = "/org/freedesktop/Telepathy/Connection/fake/sip/alice/Call0";

    fn is_signal_stream<S: Stream<Item = T>, T>() {}

    fn reason() -> CallStateReason {
        (2, 1, String::new(), "answered".to_string())
    }

    #[test]
    fn test_signal_streams_are_distinct_from_property_streams() {
        is_signal_stream::<CallStateChangedStream<'static>, CallStateChanged>();
        is_signal_stream::<CallMembersChangedStream<'static>, CallMembersChanged>();
        is_signal_stream::<LocalSendingStateChangedStream<'static>, LocalSendingStateChanged>();
        is_signal_stream::<RemoteMembersChangedStream<'static>, RemoteMembersChanged>();
    }

    #[test]
    fn test_call_state_signal_keeps_wire_name() {
        let details: HashMap<String, OwnedValue> = HashMap::new();
        let message = Message::signal(CHANNEL, CALL1, "CallStateChanged")
            .unwrap()
            .build(&(4u32, 0u32, reason(), details))
            .unwrap();

        let signal = CallStateChanged::from_message(message).unwrap();
        let args = signal.args().unwrap();
        assert_eq!(*args.call_state(), 4);
        assert_eq!(args.call_state_reason().3, "answered");
    }

    #[test]
    fn test_sending_state_signal_keeps_wire_name() {
        let path = format!("{}/Content0/Stream0", CHANNEL);
        let message = Message::signal(path.as_str(), STREAM, "LocalSendingStateChanged")
            .unwrap()
            .build(&(1u32, reason()))
            .unwrap();
        assert!(LocalSendingStateChanged::from_message(message.clone()).is_some());
        assert!(RemoteMembersChanged::from_message(message).is_none());

        let unrelated = Message::signal(CHANNEL, CALL1, "CallStateChanged")
            .unwrap()
            .build(&(4u32, 0u32, reason(), HashMap::<String, OwnedValue>::new()))
            .unwrap();
        assert!(LocalSendingStateChanged::from_message(unrelated).is_none());
    }
}
