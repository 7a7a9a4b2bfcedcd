mod api;
mod capability;
mod command;
mod config;
mod device_store;
mod entity_mapping;
mod error;
mod event;
mod model;
#[cfg(feature = "rest-client")]
mod rest_client;
mod retry;
mod session;
mod snapshot;
mod translator;
mod worker;

pub use api::*;
pub use capability::*;
pub use command::*;
pub use config::*;
pub use device_store::*;
pub use entity_mapping::*;
pub use error::*;
pub use event::*;
pub use model::*;
#[cfg(feature = "rest-client")]
pub use rest_client::*;
pub use retry::*;
pub use session::*;
pub use snapshot::*;
pub use translator::*;
pub use worker::*;
