//! Protocol implementations.
//!
//! - `echo`: line-delimited integer echo served to every accepted connection

pub mod echo;
