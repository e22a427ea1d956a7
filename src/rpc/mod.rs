//! Node transports.
//!
//! # Provider Types
//!
//! - **HTTP** ([`http`]): request/response calls for blocks and receipts
//! - **WebSocket** ([`websocket`]): the `newHeads` push subscription
//!
//! ```text
//!    ┌───────────┐  newHeads   ┌────────────┐
//!    │    WS     │────────────▶│  watch     │
//!    │ Provider  │             │  loop      │
//!    └───────────┘             └─────┬──────┘
//!                                    │ eth_getBlockByNumber
//!                              ┌─────▼──────┐ eth_getTransactionReceipt
//!                              │   HTTP     │
//!                              │ Provider   │
//!                              └────────────┘
//! ```

pub mod http;
pub mod websocket;

// Re-export commonly used types
pub use http::{create_provider, HttpChainSource, Provider};
pub use websocket::{ConnectBackoff, ReconnectingWebSocket, WebSocketProvider};
