//! Command and query contracts.
//!
//! Commands are handled by exactly one `CommandHandler<C>` and return a
//! uniform [`CommandResponse`] envelope; queries are typed end to end
//! through [`Query::Output`]. Handlers are registered on the [`Manifest`]
//! and resolved through the senders in [`send`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::composition::{Manifest, Provider, ResolveError, Scope, Shared};
use crate::contract::{
    CapabilityDescriptor, Cardinality, ContractId, ImplId, Lifetime, OpenContract, TypeParam,
};
use crate::data::StoreError;

mod send;

pub use send::{CommandSender, DispatchError, QuerySender};

/// Open contract for command handlers: single-bound, one type parameter.
pub const COMMAND_HANDLER: OpenContract =
    OpenContract::new("CommandHandler", 1, Cardinality::Single);

/// Open contract for query handlers.
pub const QUERY_HANDLER: OpenContract = OpenContract::new("QueryHandler", 1, Cardinality::Single);

/// The closed command-handler contract for command `C`.
pub fn command_handler_contract<C: Command>() -> ContractId {
    ContractId::close(COMMAND_HANDLER, vec![TypeParam::of::<C>()])
}

/// The closed query-handler contract for query `Q`.
pub fn query_handler_contract<Q: Query>() -> ContractId {
    ContractId::close(QUERY_HANDLER, vec![TypeParam::of::<Q>()])
}

/// Marker for dispatchable commands.
pub trait Command: Send + Sync + 'static {}

/// A query with a typed result.
pub trait Query: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
}

/// An opaque business error raised by a handler.
///
/// Decorators and dispatch never inspect or transform this; it is observed
/// only to decide rollback and then re-raised unchanged.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct HandlerError(Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    /// Wrap any error as an opaque handler failure.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }

    /// A handler failure from a plain message.
    pub fn msg(msg: impl fmt::Display) -> Self {
        Self(msg.to_string().into())
    }

    /// Attempt to view the underlying error as `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self(Box::new(err))
    }
}

/// Uniform type-erased response envelope returned by command handlers.
pub struct CommandResponse {
    result: Option<Box<dyn Any + Send + Sync>>,
}

impl CommandResponse {
    /// A response carrying no result.
    pub fn empty() -> Self {
        Self { result: None }
    }

    /// A response carrying `value`.
    pub fn with_result<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            result: Some(Box::new(value)),
        }
    }

    /// Whether the envelope carries a result.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// View the result as `T`, if present and of that type.
    pub fn result<T: Any>(&self) -> Option<&T> {
        self.result.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandResponse")
            .field("has_result", &self.has_result())
            .finish()
    }
}

/// Handles one command type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C) -> Result<CommandResponse, HandlerError>;
}

/// Handles one query type.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(&self, query: Q) -> Result<Q::Output, HandlerError>;
}

impl Manifest {
    /// Register a command handler for `C`, built by `factory` per scope.
    ///
    /// The handler carries the transactional wrapper binding; whether the
    /// wrapper is applied is the composer's decision.
    pub fn command_handler<C, H, F>(&mut self, factory: F) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
        F: Fn(&Scope) -> Result<H, ResolveError> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |scope| {
            let handler: Arc<dyn CommandHandler<C>> = Arc::new(factory(scope)?);
            Ok(Arc::new(handler) as Shared)
        });
        self.capability(
            CapabilityDescriptor {
                contract: command_handler_contract::<C>(),
                implementation: ImplId::of::<H>(),
                lifetime: Lifetime::Scoped,
                decorator: false,
            },
            provider,
            Some(crate::uow::decorators::transactional_handler_binder::<C>()),
        )
    }

    /// Register a query handler for `Q`, built by `factory` per scope.
    ///
    /// Query handlers are never transactionally wrapped; reads do not open
    /// a unit of work.
    pub fn query_handler<Q, H, F>(&mut self, factory: F) -> &mut Self
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
        F: Fn(&Scope) -> Result<H, ResolveError> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |scope| {
            let handler: Arc<dyn QueryHandler<Q>> = Arc::new(factory(scope)?);
            Ok(Arc::new(handler) as Shared)
        });
        self.capability(
            CapabilityDescriptor {
                contract: query_handler_contract::<Q>(),
                implementation: ImplId::of::<H>(),
                lifetime: Lifetime::Scoped,
                decorator: false,
            },
            provider,
            None,
        )
    }
}
