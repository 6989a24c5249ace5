//! Track-based sequencing and crossfade mixing for 2D skeletal animation.
//!
//! This crate is the sequencing core only: it evaluates keyframed timelines
//! against a skeleton pose and layers animation tracks with crossfades,
//! queuing and lifecycle events. Loading animation data and rendering the
//! posed skeleton are left to the caller.

#![forbid(unsafe_code)]

mod error;
mod model;
mod runtime;

pub use error::*;
pub use model::*;
pub use runtime::*;
