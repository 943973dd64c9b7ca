//! # Shared Bus - Internal Router and Gateway Events
//!
//! Two channels connect the gateway components to each other and to the
//! platform behind them.
//!
//! ```text
//! ┌──────────────────┐   submit(signal)   ┌──────────────────┐
//! │ Dispatch Pipeline│ ─────────────────→ │  SignalRouter    │ ──→ platform
//! │ Streaming Gateway│                    └──────────────────┘
//! └──────────────────┘
//!          │ publish(GatewayEvent)        ┌──────────────────┐
//!          └────────────────────────────→ │ InMemoryEventBus │ ──→ subscribe()
//!                                         └──────────────────┘
//! ```
//!
//! - **Router**: fire-and-forget signal submission, there is no synchronous
//!   reply contract.
//! - **Event bus**: notifications such as `ResponsePublished` or connection
//!   status changes, filtered by topic on the subscriber side.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod router;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, GatewayEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use router::{
    ChannelSignalRouter, InMemorySignalRouter, RouterError, SignalRouter, SignalSubscription,
};
pub use subscriber::{Subscription, SubscriptionError};

/// Messages buffered per subscriber. A full event subscription lags; a full
/// router subscription holds back `submit`.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
