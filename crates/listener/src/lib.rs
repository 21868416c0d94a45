//! Basic Builder intake and task queue.
//!
//! Receives webhooks over HTTP, verifies their signatures, and queues one task
//! per delivery for a pool of workers that run each through a [`JobHandler`]
//! (in production, [`nodes::PipelineExecutor`]).
//!
//! ```text
//! POST /event/{hook_type} ──► TaskQueue ──► WorkerPool ──► JobHandler
//!            │                    │                            │
//!            └── 202 {task_id}    └──── TaskRegistry ◄─────────┘
//!                                           ▲
//!                       GET /task/{id} ─────┘
//! ```
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details, signature formats and queueing all
//! live here. The [`pipeline`] crate sees only [`pipeline::WebhookEnvelope`].

pub mod queue;
pub mod server;
pub mod signature;
pub mod worker;

pub use queue::{channel, Job, QueueError, TaskQueue, TaskRecord, TaskRegistry, TaskStatus};
pub use server::{build_router, serve, AppState, IntakeError};
pub use signature::SignatureError;
pub use worker::{JobHandler, WorkerPool};
