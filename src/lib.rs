//! UOF feed client
//!
//! A WebSocket client for the UOF odds feed backend. It keeps one connection
//! open (reconnecting at a fixed interval), replays the current subscription
//! filters on every connect, and fans each inbound message out to listeners
//! by name: `"message"` for everything, plus the message's own `type` and
//! `message_type` values.
//!
//! # Example
//!
//! ```no_run
//! use uof_client::{UofClient, UofConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UofConfig::from_origin("https://feed.example.com")?;
//!     let client = UofClient::new(config);
//!
//!     client.listen("odds_change", |event| {
//!         if let Some(msg) = event.as_message() {
//!             println!("odds change for {:?}", msg.event_id());
//!         }
//!     });
//!
//!     client.subscribe(["odds_change", "bet_stop"], Vec::<String>::new());
//!     client.connect();
//!
//!     let stats = client.get_stats().await?;
//!     println!("{} messages stored", stats.total_messages);
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod api;
mod client;
mod config;
mod error;
pub mod events;
pub mod messages;
mod router;
mod subscription;

pub use api::{ApiClient, MessageQuery};
pub use client::{ConnectionState, UofClient};
pub use config::{UofConfig, DEFAULT_ORIGIN, DEFAULT_RECONNECT_INTERVAL};
pub use error::{Result, UofError};
pub use events::{listener, Event, EventDispatcher, Listener};
pub use messages::{ControlFrame, FeedMessage, MessageKind};
pub use router::MessageRouter;
pub use subscription::SubscriptionState;
