// Core types and functionality for the 0perator action orchestration engine

pub mod action;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod recipe;
pub mod registry;
pub mod schema;
pub mod types;

pub use action::{Action, ActionBuilder, ActionContext, ActionFailure, ActionHandler, FnHandler};
pub use cache::Cache;
pub use config::{CacheConfig, ExecutionConfig, FailurePolicy, OperatorConfig};
pub use engine::{DependencyGraph, Executor, Operator};
pub use error::{OperatorError, OperatorResult};
pub use recipe::{ParsedInput, Recipe};
pub use registry::Registry;
pub use types::*;
