//! @ai:module:intent Native module boundary: loading artifacts and calling their entry points
//! @ai:module:layer infrastructure
//! @ai:module:public_api load, LoadedModule, EntryPointSignature, ArgKind, ScalarType, CallArgs, ArgValue, BoundCall

pub mod adapter;
pub mod loader;
pub mod signature;

pub use adapter::{ArgValue, BoundCall, CallArgs};
pub use loader::{load, LoadedModule};
pub use signature::{ArgKind, EntryPointSignature, ScalarType, DEFAULT_ENTRY_SYMBOL};
