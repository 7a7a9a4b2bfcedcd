mod device_store;
mod entity;
mod ids;
mod snapshot;
mod translator;
mod value;

pub use device_store::*;
pub use entity::*;
pub use ids::*;
pub use snapshot::*;
pub use translator::*;
pub use value::*;
