#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod agent;
mod error;
pub mod extract;
pub mod provider;
pub mod relay;
mod service;
pub mod tool;
pub mod usage;

pub use error::{Error, Result};
pub use service::{ChatConfig, ChatService, ChunkStream};

/// Tracing target for the main library.
pub const TRACING_TARGET: &str = "studylab_rig";
