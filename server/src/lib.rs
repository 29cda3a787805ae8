//! # Relay Server Library
//!
//! This library provides the multiplayer relay for the sky platformer. It keeps
//! the list of connected players and their last reported transforms, and pushes
//! a complete snapshot of that list to every client whenever it changes.
//!
//! ## Core Responsibilities
//!
//! ### Player Registry
//! Clients pick their own player id and announce it with `JOIN`. The server
//! records which connection speaks for which player so that a player disappears
//! exactly once, whether the client says `LEAVE`, closes the socket, or (when
//! enabled) goes silent past the idle timeout.
//!
//! ### State Broadcasting
//! Every accepted `JOIN`, `MOVE`, `APPEARANCE` or `LEAVE`, and every disconnect
//! of a joined client, is followed by one `GAME_STATE` message carrying the whole
//! player set. The same payload goes to every open connection, so a client that
//! misses one snapshot is corrected by the next.
//!
//! ### No Authority
//! The server does not simulate or validate movement. Positions are relayed as
//! reported, and malformed or stale messages are dropped without a reply.
//!
//! ## Architecture Design
//!
//! ### Single Session Loop
//! Each connection runs a reader task and a writer task, but neither touches
//! shared state. Readers forward frames over a channel to one session loop,
//! which applies each event and fans out the resulting snapshot before it looks
//! at the next event. Mutations are therefore strictly serialized and every
//! snapshot reflects all events applied before it.
//!
//! ### Non-blocking Fan-out
//! Snapshots are serialized once and queued on each connection's outbound
//! channel. Queuing never waits on the socket; a connection whose writer has
//! already gone away is skipped.
//!
//! ## Module Organization
//!
//! ### Connection Registry (`connection_registry`)
//! Open connections, their outbound queues, and the connection -> player id
//! association.
//!
//! ### Game Module (`game`)
//! The player map and its mutations.
//!
//! ### Session Module (`session`)
//! Message dispatch, disconnect cleanup, idle eviction and snapshot fan-out.
//!
//! ### Network Module (`network`)
//! WebSocket accept loop, per-connection tasks and the session loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_address: "127.0.0.1:3001".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Clients connect to ws://127.0.0.1:3001/ws
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection_registry;
pub mod error;
pub mod game;
pub mod network;
pub mod session;
