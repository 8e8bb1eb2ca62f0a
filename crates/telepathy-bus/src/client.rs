//! The Observer client object exported to the channel dispatcher
//!
//! The dispatcher calls `ObserveChannels` for every batch of channels that
//! matches our filter and waits for the method reply. The handler turns the
//! call into a [`DispatchBatch`], queues it for the observer loop and only
//! replies once the loop has signalled the batch's completion.

use std::collections::HashMap;
use tracing::{debug, info};
use zbus::fdo;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{interface, Connection};

use callwatch_observer_core::{
    names as call_names, BusKind, ChannelDescriptor, DispatchBatch, HandleType, Notification,
    NotificationSink, ObjectPath, ObjectRef, ObserverFilter, PropertyValue,
};

use crate::error::{TelepathyError, TelepathyResult};
use crate::names;
use crate::variant::property_value;

/// Open a connection to the configured bus
pub async fn connect(kind: BusKind) -> TelepathyResult<Connection> {
    let connection = match kind {
        BusKind::Session => Connection::session().await?,
        BusKind::System => Connection::system().await?,
    };
    debug!(
        "Connected to the {:?} bus as {:?}",
        kind,
        connection.unique_name().map(|n| n.as_str().to_string())
    );
    Ok(connection)
}

/// `org.freedesktop.Telepathy.Client`
#[derive(Debug, Default)]
pub struct ClientInterface;

#[interface(name = "org.freedesktop.Telepathy.Client")]
impl ClientInterface {
    #[zbus(property)]
    fn interfaces(&self) -> Vec<String> {
        vec![names::CLIENT_OBSERVER.to_string()]
    }
}

/// `org.freedesktop.Telepathy.Client.Observer`
#[derive(Debug)]
pub struct ObserverInterface {
    filter: ObserverFilter,
    recover: bool,
    sink: NotificationSink,
}

impl ObserverInterface {
    pub fn new(filter: ObserverFilter, recover: bool, sink: NotificationSink) -> Self {
        Self {
            filter,
            recover,
            sink,
        }
    }
}

#[interface(name = "org.freedesktop.Telepathy.Client.Observer")]
impl ObserverInterface {
    #[zbus(property)]
    fn observer_channel_filter(&self) -> Vec<HashMap<String, Value<'static>>> {
        filter_dicts(&self.filter)
    }

    #[zbus(property)]
    fn recover(&self) -> bool {
        self.recover
    }

    #[zbus(property)]
    fn delay_approvers(&self) -> bool {
        false
    }

    async fn observe_channels(
        &self,
        account: OwnedObjectPath,
        connection: OwnedObjectPath,
        channels: Vec<(OwnedObjectPath, HashMap<String, OwnedValue>)>,
        dispatch_operation: OwnedObjectPath,
        requests_satisfied: Vec<OwnedObjectPath>,
        observer_info: HashMap<String, OwnedValue>,
    ) -> fdo::Result<()> {
        let bus_name = names::connection_bus_name(connection.as_str())
            .map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
        if let Some(PropertyValue::Bool(true)) =
            observer_info.get("recovering").map(|v| property_value(v))
        {
            debug!("Dispatcher is re-delivering existing channels");
        }

        let descriptors = channels
            .iter()
            .map(|(path, properties)| descriptor(&bus_name, path.as_str(), properties))
            .collect();
        let (mut batch, reply) =
            DispatchBatch::new(account.as_str(), connection.as_str(), descriptors);
        if dispatch_operation.as_str() != "/" {
            batch.dispatch_operation = Some(ObjectPath::from(dispatch_operation.as_str()));
        }
        batch.requests_satisfied = requests_satisfied
            .iter()
            .map(|p| ObjectPath::from(p.as_str()))
            .collect();

        self.sink
            .send(Notification::Dispatch(batch))
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;

        match reply.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(fdo::Error::Failed(e.to_string())),
            Err(_) => Err(fdo::Error::Failed(TelepathyError::ObserverGone.to_string())),
        }
    }
}

/// The filter as the `aa{sv}` the dispatcher expects
fn filter_dicts(filter: &ObserverFilter) -> Vec<HashMap<String, Value<'static>>> {
    let mut dict = HashMap::new();
    dict.insert(
        call_names::PROP_CHANNEL_TYPE.to_string(),
        Value::from(filter.channel_type.clone()),
    );
    dict.insert(
        call_names::PROP_TARGET_HANDLE_TYPE.to_string(),
        Value::from(filter.target_handle_type.as_u32()),
    );
    vec![dict]
}

/// Build a descriptor from the immutable properties sent with the channel
fn descriptor(
    bus_name: &str,
    path: &str,
    properties: &HashMap<String, OwnedValue>,
) -> ChannelDescriptor {
    let get = |name: &str| properties.get(name).map(|v| property_value(v));

    let channel_type = match get(call_names::PROP_CHANNEL_TYPE) {
        Some(PropertyValue::Str(channel_type)) => channel_type,
        _ => String::new(),
    };
    let mut descriptor = ChannelDescriptor::new(ObjectRef::new(bus_name, path), channel_type);

    if let Some(PropertyValue::Bool(requested)) = get(call_names::PROP_REQUESTED) {
        descriptor = descriptor.with_requested(requested);
    }
    if let Some(PropertyValue::UInt(handle_type)) = get(call_names::PROP_TARGET_HANDLE_TYPE) {
        descriptor.target_handle_type = u32::try_from(handle_type).ok().map(HandleType::from_u32);
    }
    if let Some(PropertyValue::Str(target_id)) = get(call_names::PROP_TARGET_ID) {
        descriptor.target_id = Some(target_id);
    }
    descriptor
}

/// How the observer presents itself to the dispatcher
#[derive(Debug, Clone)]
pub struct ObserverRegistration {
    pub name: String,
    pub uniquify: bool,
    pub recover: bool,
    pub filter: ObserverFilter,
}

impl ObserverRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uniquify: true,
            recover: false,
            filter: ObserverFilter::default(),
        }
    }

    pub fn with_uniquify(mut self, uniquify: bool) -> Self {
        self.uniquify = uniquify;
        self
    }

    pub fn with_recover(mut self, recover: bool) -> Self {
        self.recover = recover;
        self
    }

    pub fn with_filter(mut self, filter: ObserverFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Export the client objects and claim the well-known name
    ///
    /// Returns the bus name that was claimed.
    pub async fn register(
        self,
        connection: &Connection,
        sink: NotificationSink,
    ) -> TelepathyResult<String> {
        let unique = if self.uniquify {
            connection.unique_name().map(|n| n.as_str().to_string())
        } else {
            None
        };
        let client = names::client_name(&self.name, unique.as_deref());
        let path = names::client_object_path(&client);
        let bus_name = names::client_bus_name(&client);

        let server = connection.object_server();
        server.at(path.as_str(), ClientInterface).await?;
        server
            .at(
                path.as_str(),
                ObserverInterface::new(self.filter, self.recover, sink),
            )
            .await?;
        connection.request_name(bus_name.as_str()).await?;

        info!("Registered observer {} at {}", bus_name, path);
        Ok(bus_name)
    }
}
