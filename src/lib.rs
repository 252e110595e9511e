//! # rsroyale
//!
//! Client crate for the Clash Royale game-statistics API: player profiles,
//! battle logs, clans, tournaments and game constants, behind an optional
//! SQLite response cache and a client-side rate-limit gate.
//!
//! ## Usage
//!
//! First, create a [`Client`][client::Client] with your API token:
//!
//! ```no_run
//! # use rsroyale::client::Client;
//! # fn main() -> rsroyale::error::Result<()> {
//! let client = Client::new("my api token")?;
//! # Ok(()) }
//! ```
//!
//! Then fetch what you need. Responses come back as typed models whose
//! untyped fields stay reachable through [`Entity::get`][model::Entity::get],
//! accepting both `snake_case` and `camelCase` key spellings:
//!
//! ```no_run
//! # use rsroyale::client::Client;
//! # use rsroyale::model::Model;
//! # async fn run() -> rsroyale::error::Result<()> {
//! # let client = Client::new("my api token")?;
//! let player = client.get_player("#2P0LYQ").await?;
//!
//! println!("{:?} has {:?} trophies", player.name(), player.trophies());
//! println!("best: {:?}", player.entity().get("best_trophies"));
//! # Ok(()) }
//! ```
//!
//! Paginated listings fetch lazily; see [`PagedList`][paging::PagedList] for
//! both the explicit `advance` loop and the [`Stream`][futures::Stream]
//! interface. For synchronous callers there is a [`blocking`] facade.
//!
//! ## Caching
//!
//! With [`ClientBuilder::cache`][client::ClientBuilder::cache] set, every
//! successful response is written to a SQLite database keyed by its
//! canonical URL, and equal requests within the TTL are answered locally.
//! When a request fails and a fresh cached copy exists, the cached copy is
//! returned instead of the error.

mod cache;
mod utils;

pub mod blocking;
pub mod clan;
pub mod client;
pub mod error;
pub mod model;
pub mod paging;
pub mod player;
pub mod tag;
pub mod tournament;
