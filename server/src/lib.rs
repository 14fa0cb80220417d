//! # Tank Arena Server Library
//!
//! Authoritative server for a top-down tank arena. Clients connect over TCP,
//! introduce themselves with a name, then stream control commands; the server
//! simulates the arena at a fixed tick rate and broadcasts every entity to
//! every player once per tick.
//!
//! ## Architecture
//!
//! ### Networking on the async runtime
//! The [`network`] module wraps tokio sockets in a small set of operations
//! (`listen`, `connect`, `receive`, `send`, `send_and_close`) whose outcomes are
//! all delivered as [`network::NetworkEvent`]s on one channel. The
//! [`session::SessionManager`] consumes that channel and drives a state
//! machine per connection: handshake first, then control commands.
//!
//! ### Simulation on its own thread
//! The [`simulation`] thread locks the [`world::World`] once per tick, runs
//! [`game::step`], serializes the frame, releases the lock and only then sends
//! the frame to every joined player. Control commands that arrive between
//! ticks are queued in the world and applied at the start of the next tick,
//! so a tick always sees a consistent snapshot.
//!
//! ### Locking
//! There are exactly two locks: the world mutex and the client registry
//! read-write lock. No code path holds both at once.
//!
//! ## Wire format
//!
//! Newline-delimited JSON; see the `shared` crate for the entity types and
//! line framing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{host, settings::Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("settings.json")?;
//!     let server = host::start(&settings, "0.0.0.0:11000".parse()?)?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod error;
pub mod game;
pub mod host;
pub mod network;
pub mod physics;
pub mod session;
pub mod settings;
pub mod simulation;
pub mod world;

pub use error::{NetworkError, ServerError, ServerResult};
