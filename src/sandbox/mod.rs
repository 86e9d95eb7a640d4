//! @ai:module:intent Process-isolated execution with an ordered, deadline-bounded event stream
//! @ai:module:layer infrastructure
//! @ai:module:public_api run, RunEvents, RunEvent, TerminalReason, EventSink, WorkFailure

pub mod event;
pub mod runner;
pub mod wire;

pub use event::{RunEvent, TerminalReason};
pub use runner::{run, RunEvents, PANIC_STAGE};
pub use wire::{EventSink, WorkFailure};
