//! # Ftrace events
//!
//! This crate contains the definition of the event produced from the kernel
//! trace pipe, as well as the parser turning a raw trace line into an event.

pub mod event;
pub use event::*;

pub mod parser;
pub use parser::*;
