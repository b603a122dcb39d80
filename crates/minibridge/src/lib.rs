#![doc = include_str!("../README.md")]

mod client;
mod config;
mod engine;
mod error;
mod handler;
mod id;
mod minifier;
mod output;
mod table;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::handler::{Completion, CompletionHandler};
pub use crate::id::*;
pub use crate::minifier::*;
pub use crate::output::*;
pub use crate::table::*;
