//! Game sessions and where they live.
//!
//! - [`GameSession`]: the entity every game operation reads and mutates.
//! - [`VolatileStore`]: sharded in-process map, truth for live sessions,
//!   with participant pointers and the active-session index.
//! - [`DurableStore`]: checkpoint target ([`MemoryDurableStore`],
//!   [`JsonFileDurableStore`]).
//! - [`SessionStore`]: cache-aside glue with crash-time rebuild and a
//!   retry set for failed checkpoints.
//!
//! # How it fits in the stack
//!
//! ```text
//! Game core (above)  ← moves, clocks, reconnection, draws
//!     ↕
//! Session layer (this crate)  ← session entity and its stores
//!     ↕
//! Protocol layer (below)  ← ids, colors, clocks, results
//! ```

mod config;
mod durable;
mod error;
mod session;
mod store;
mod time;
mod volatile;

pub use config::StoreConfig;
pub use durable::{DurableStore, JsonFileDurableStore, MemoryDurableStore};
pub use error::StoreError;
pub use session::{GameSession, MoveSource, Seat};
pub use store::{SessionStore, rebuild};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use volatile::VolatileStore;
