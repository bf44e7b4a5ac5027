//! # bridge-gateway
//!
//! HTTP gateway for the MQTT bridge. Exposes broker-configuration CRUD, a
//! publish endpoint, and an SSE streaming endpoint over the core components,
//! with the status mapping described in the handlers module: input problems
//! are 4xx, transport problems are 5xx, and stream failures are terminal
//! `error` events inside a successful response.

pub mod handlers;
pub mod routes;
pub mod settings;
pub mod sse;

pub use handlers::AppContext;
pub use routes::{handle_rejection, routes};
pub use settings::Settings;
