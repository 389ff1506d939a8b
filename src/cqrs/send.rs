//! Command and query dispatch.
//!
//! Senders resolve the capability registered for a request's concrete
//! contract closure and invoke it. Each send opens a fresh scope, so scoped
//! services (the unit of work in particular) belong to exactly that one
//! logical operation.

use std::sync::Arc;

use tracing::debug;

use crate::composition::{Container, ResolveError, ServiceKey};
use crate::cqrs::{
    command_handler_contract, query_handler_contract, Command, CommandHandler, CommandResponse,
    HandlerError, Query, QueryHandler,
};

/// Dispatch failures.
///
/// An unregistered contract is a configuration error, reported distinctly
/// from anything the handler itself raises.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No capability is registered for the request's contract.
    #[error("no handler registered for {0}")]
    Unregistered(String),

    /// Resolution found a registration but could not produce the handler.
    #[error("resolution failed: {0}")]
    Resolution(ResolveError),

    /// The handler itself failed; opaque to the dispatch layer.
    #[error(transparent)]
    Handler(HandlerError),
}

fn map_resolve(err: ResolveError) -> DispatchError {
    match err {
        ResolveError::Unregistered(key) => DispatchError::Unregistered(key),
        other => DispatchError::Resolution(other),
    }
}

/// Resolves and invokes command handlers.
#[derive(Clone)]
pub struct CommandSender {
    container: Arc<Container>,
}

impl CommandSender {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    /// Dispatch `command` to its registered handler.
    pub async fn send<C: Command>(&self, command: C) -> Result<CommandResponse, DispatchError> {
        let scope = self.container.scope();
        let key = ServiceKey::Contract(command_handler_contract::<C>());
        let handler: Arc<dyn CommandHandler<C>> =
            scope.resolve(&key).map_err(map_resolve)?;
        debug!(contract = %key, "dispatching command");
        handler.handle(command).await.map_err(DispatchError::Handler)
    }
}

/// Resolves and invokes query handlers.
#[derive(Clone)]
pub struct QuerySender {
    container: Arc<Container>,
}

impl QuerySender {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    /// Dispatch `query` to its registered handler and return its typed output.
    pub async fn send<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        let scope = self.container.scope();
        let key = ServiceKey::Contract(query_handler_contract::<Q>());
        let handler: Arc<dyn QueryHandler<Q>> = scope.resolve(&key).map_err(map_resolve)?;
        debug!(contract = %key, "dispatching query");
        handler.handle(query).await.map_err(DispatchError::Handler)
    }
}
