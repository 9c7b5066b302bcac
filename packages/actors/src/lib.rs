//! Actor system for the job dashboard.
//!
//! This crate provides the Ractor-based actors behind the dashboard:
//!
//! # Architecture
//!
//! - `SimulatorActor` - In-process job backend with a believable lifecycle
//! - `StoreActor` - Owns the job collection and reconciles events into it
//! - `JobStore` - Handle the rendering side talks to
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobStore, SimulationConfig, create_job_service};
//! use client::ServiceConfig;
//!
//! let service = create_job_service(&ServiceConfig::from_env()?, SimulationConfig::default()).await?;
//! let store = JobStore::start(service).await?;
//! println!("{} jobs", store.snapshot().counts.total());
//! ```

mod collection;
mod factory;
pub mod generator;
mod messages;
mod notifications;
mod simulated;
mod simulation;
mod simulator;
mod store;
mod store_actor;

pub use collection::JobCollection;
pub use factory::create_job_service;
pub use messages::{SimulatorMessage, StoreMessage};
pub use notifications::{
    AUTO_DISMISS_AFTER, Command, Notification, NotificationCenter, NotificationId,
    NotificationKind,
};
pub use simulated::SimulatedJobService;
pub use simulation::{
    CANNOT_RESTART, CANNOT_STOP, JOB_NOT_FOUND, SimulationConfig, SimulationState, Stage,
};
pub use simulator::{SimulatorActor, SimulatorArgs};
pub use store::{JobStore, StoreError, StoreSnapshot};
pub use store_actor::{StoreActor, StoreArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
