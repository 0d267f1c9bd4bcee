pub mod clients;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod identity;
pub mod jid;
pub mod media;
pub mod models;
pub mod query;
pub mod render;
pub mod store;
pub mod topic;
mod migrations;
mod notices;

pub use config::BridgeConfig;
pub use db::{open_in_memory, open_store, StoreDb};
pub use dispatcher::{BridgeContext, Dispatcher};
pub use error::CoreError;
pub use event::Event;
pub use jid::Jid;
pub use store::CorrelationStore;
