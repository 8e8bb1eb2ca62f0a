//! # callwatch Telepathy bus layer
//!
//! zbus implementation of the observer core's [`CallBus`] trait, plus the
//! `org.freedesktop.Telepathy.Client.Observer` object the channel dispatcher
//! calls into.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callwatch_observer_core::{notification_channel, BusKind, ColourMode, Console, Observer};
//! use callwatch_telepathy::{connect, ObserverRegistration, TelepathyBus};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = connect(BusKind::Session).await?;
//! let (sink, notifications) = notification_channel();
//! let bus_name = ObserverRegistration::new("CallObserver")
//!     .register(&connection, sink.clone())
//!     .await?;
//! println!("Observing calls as {}", bus_name);
//!
//! let observer = Observer::new(
//!     Arc::new(TelepathyBus::new(connection)),
//!     Console::stdout(ColourMode::Auto),
//!     sink,
//! );
//! observer.run(notifications, std::future::pending()).await;
//! # Ok(())
//! # }
//! ```
//!
//! [`CallBus`]: callwatch_observer_core::CallBus

pub mod backend;
pub mod client;
pub mod error;
pub mod names;
pub mod proxies;
pub mod variant;

pub use backend::TelepathyBus;
pub use client::{connect, ClientInterface, ObserverInterface, ObserverRegistration};
pub use error::{TelepathyError, TelepathyResult};
