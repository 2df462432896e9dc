//! Epoch-based safe memory reclamation for single-writer, multi-reader
//! concurrent data structures.
//!
//! Readers ([`Reference`]) observe a proxy's published [`Epoch`] with a
//! relaxed load, a relaxed store into their own slot, and an acquire fence
//! — no atomic read-modify-write on the hot path. A writer retires an
//! obsolete object into a [`Proxy`]; a background reclaimer (or an explicit
//! call to [`Proxy::reclaim_now`]) destroys it once every reader's observed
//! epoch has moved past its expiry.
//!
//! ```
//! use smr_proxy::{Config, Proxy};
//!
//! let proxy = Proxy::create(Some(Config {
//!     polltime_ms: 0, // drive reclamation manually in this example
//!     ..Config::default()
//! })).unwrap();
//!
//! let reader = proxy.create_reference();
//! reader.acquire();
//! proxy.retire(Box::new(String::from("stale")));
//! reader.release();
//! proxy.reclaim_now();
//! ```
//!
//! Grounded throughout on `jseigh/smrproxy`, a C SMR library, reworked here
//! into the idioms of the pack's concurrency-primitive crates.

mod config;
mod epoch;
mod error;
mod membarrier;
mod platform;
mod proxy;
mod queue;
mod reference;
mod sync;

pub use config::Config;
pub use epoch::Epoch;
pub use error::{CreateError, RetireError};
pub use proxy::Proxy;
pub use reference::{Pin, Reference};
