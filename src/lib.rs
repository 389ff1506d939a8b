//! Weft - capability composition and unit-of-work toolkit
//!
//! Building blocks for CQRS applications: an explicit capability manifest,
//! a decorator composer that wraps command handlers and pipeline steps in
//! transaction management, a unit of work over pluggable datastores, and
//! typed command/query dispatch.

pub mod cache;
pub mod composition;
pub mod config;
pub mod contract;
pub mod cqrs;
pub mod data;
pub mod step;
pub mod uow;

pub use composition::{Composer, CompositionError, Container, Manifest, ResolveError, Scope};
pub use config::Config;
pub use contract::{ContractId, ImplId, Lifetime, OpenContract};
pub use cqrs::{
    Command, CommandHandler, CommandResponse, CommandSender, DispatchError, HandlerError, Query,
    QueryHandler, QuerySender,
};
pub use data::{Datastore, Entity, Repository};
pub use step::{Cancellation, CancellationSource, Pipeline, Step, StepContext};
pub use uow::{TransactionPolicy, UnitOfWork, UnitOfWorkExt};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the WEFT_LOG environment variable.
///
/// Defaults to "info" level if WEFT_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(config::LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
