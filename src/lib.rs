//! Topology, layout, forward propagation and animation planning for small
//! feed-forward networks, kept consistent under interactive edits by a single
//! session task.

pub mod animation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod layout;
pub mod model;
pub mod session;
pub mod simulation;
pub mod topology;
pub mod training;

pub use error::{Result, VisErr};
