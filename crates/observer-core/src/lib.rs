//! # callwatch observer core
//!
//! Watches Telepathy Call channels and everything below them, and prints what
//! happens to a terminal.
//!
//! The observation tree has four layers, each discovered lazily from the one
//! above it:
//!
//! ```text
//! dispatch batch ──► channel ──► content ──► stream ──► endpoint
//!                      │           │           │           │
//!                  state/members  media     sending     media
//!                  contents       props     members     props
//!                                           media props
//! ```
//!
//! The core never speaks D-Bus directly. It goes through the [`CallBus`] trait,
//! implemented over zbus in `callwatch-telepathy` and in memory by
//! [`testing::FakeCallBus`]. Everything that happens on the bus is turned into a
//! [`Notification`] and handled by the single [`Observer`] loop.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callwatch_observer_core::{notification_channel, CallBus, ColourMode, Console, Observer};
//!
//! async fn observe(bus: Arc<dyn CallBus>) {
//!     let (sink, notifications) = notification_channel();
//!     // hand `sink` to whatever delivers dispatch batches and bus signals
//!     let observer = Observer::new(bus, Console::stdout(ColourMode::Auto), sink);
//!     observer
//!         .run(notifications, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//! }
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod observer;
pub mod presentation;
pub mod registry;
pub mod subscription;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bus::{CallBus, PropertyProxy, PropertyWatch};
pub use config::{BusKind, ObserverConfig, DEFAULT_CLIENT_NAME};
pub use dispatch::{
    ChannelDescriptor, DispatchBatch, DispatchCompletion, DispatchReply, ObserverFilter,
};
pub use error::{ObserverError, ObserverResult};
pub use notification::{
    notification_channel, ChannelEvent, ContentEvent, Notification, NotificationReceiver,
    NotificationSink, PropertyChange, StreamEvent, WatchKey,
};
pub use observer::Observer;
pub use presentation::{colour_for, ColourMode, Console, EntityTag};
pub use registry::ObserverStats;
pub use subscription::Subscription;
pub use types::*;
