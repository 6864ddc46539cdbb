//! ideahub: notification fan-out service for the idea sharing platform.
//!
//! Every domain action that concerns another user goes through one
//! pipeline: the notification is persisted, then pushed to the user's
//! device, then signalled to any live WebSocket connection.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod store;

use std::sync::Arc;

use notification::pipeline::EventPipeline;
use notification::push::PushDispatcher;
use notification::realtime::{ConnectionRegistry, RealtimeFanout};
use store::memory::MemoryStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub pipeline: EventPipeline,
    pub config: config::Config,
}

impl AppState {
    pub fn new(pipeline: EventPipeline, config: config::Config) -> Self {
        Self { pipeline, config }
    }

    /// Single-process state: in-memory store, local realtime, push disabled.
    pub fn in_memory(config: config::Config) -> Self {
        let store = MemoryStore::new();
        let pipeline = EventPipeline::new(
            Arc::new(store.clone()),
            PushDispatcher::new(Arc::new(store), None),
            RealtimeFanout::local(Arc::new(ConnectionRegistry::new())),
        );
        Self::new(pipeline, config)
    }
}
