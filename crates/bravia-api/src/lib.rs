//! Core library for driving Sony Bravia panels over their local control
//! endpoints: JSON-RPC over HTTP for the modern services, SOAP for the
//! legacy IRCC infrared channel.
//!
//! The pieces compose bottom-up: a [`storage::KvStore`] persists
//! [`profiles::Profile`] entries, an [`client::RpcClient`] shapes and sends
//! requests for the active profile, and a [`session::Session`] ties them to
//! a capability table and a periodic status poller that republishes
//! [`session::StatusSnapshot`] values to subscribers.

pub mod capabilities;
pub mod client;
pub mod config;
pub mod error;
pub mod platform;
pub mod profiles;
pub mod protocol;
pub mod session;
pub mod storage;

pub use capabilities::IrCodeMap;
pub use client::{CallOptions, RpcClient};
pub use config::Config;
pub use error::{Error, Result};
pub use profiles::{Profile, ProfileSet, ProfileStore};
pub use protocol::{PowerState, ServicePath};
pub use session::{Session, StatusSnapshot};
pub use storage::{FileStore, KvStore, MemoryStore};
