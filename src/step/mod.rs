//! Ordered step pipelines.
//!
//! A step family is a multi-bound contract: any number of `Step<C>`
//! implementations may be registered for one context type. The pipeline
//! resolves them all, sorts by order ascending, and runs them sequentially,
//! checking for cancellation before each step.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::composition::{Manifest, Provider, ResolveError, Scope, ServiceKey, Shared};
use crate::contract::{
    CapabilityDescriptor, Cardinality, ContractId, ImplId, Lifetime, OpenContract, TypeParam,
};
use crate::cqrs::HandlerError;
use crate::uow::decorators::transactional_step_binder;

/// Open contract for pipeline steps: multi-bound, one type parameter.
pub const STEP: OpenContract = OpenContract::new("Step", 1, Cardinality::Many);

/// The closed step contract for context `C`.
pub fn step_contract<C: StepContext>() -> ContractId {
    ContractId::close(STEP, vec![TypeParam::of::<C>()])
}

/// Marker for pipeline context types.
pub trait StepContext: Send + Sync + 'static {}

/// One unit of work-flow in a pipeline over context `C`.
///
/// `order` is fixed metadata: lower runs earlier, ties run in registration
/// order, zero and negative values are ordinary.
#[async_trait]
pub trait Step<C: StepContext>: Send + Sync {
    fn order(&self) -> i32;

    async fn execute(&self, context: &C, cancellation: &Cancellation) -> Result<(), HandlerError>;
}

/// Cooperative cancellation signal observed between steps.
#[derive(Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// A signal that can never fire.
    pub fn none() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested. Pends forever if the source is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Owner side of a [`Cancellation`] signal.
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    /// A signal tied to this source.
    pub fn token(&self) -> Cancellation {
        Cancellation {
            receiver: self.sender.subscribe(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The resolved, ordered steps for one context type.
pub struct Pipeline<C: StepContext> {
    steps: Vec<Arc<dyn Step<C>>>,
}

impl<C: StepContext> Pipeline<C> {
    /// A pipeline over the given steps, sorted by order ascending. The sort
    /// is stable, so equal orders keep their given sequence.
    pub fn new(mut steps: Vec<Arc<dyn Step<C>>>) -> Self {
        steps.sort_by_key(|step| step.order());
        Self { steps }
    }

    /// Resolve every step registered for `C` in `scope`.
    pub fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
        let steps: Vec<Arc<dyn Step<C>>> =
            scope.resolve_all(&ServiceKey::Contract(step_contract::<C>()))?;
        Ok(Self::new(steps))
    }

    /// The steps, in execution order.
    pub fn steps(&self) -> &[Arc<dyn Step<C>>] {
        &self.steps
    }

    /// Run the steps in order.
    ///
    /// Cancellation is checked before each step; a cancelled pipeline stops
    /// without error. The first step failure stops the run and is returned
    /// unchanged.
    pub async fn run(&self, context: &C, cancellation: &Cancellation) -> Result<(), HandlerError> {
        for step in &self.steps {
            if cancellation.is_cancelled() {
                debug!("pipeline cancelled, skipping remaining steps");
                return Ok(());
            }
            step.execute(context, cancellation).await?;
        }
        Ok(())
    }
}

impl Manifest {
    /// Register a pipeline step for context `C`, built by `factory` per
    /// scope. Steps carry the transactional wrapper binding, same as
    /// command handlers.
    pub fn step<C, S, F>(&mut self, factory: F) -> &mut Self
    where
        C: StepContext,
        S: Step<C> + 'static,
        F: Fn(&Scope) -> Result<S, ResolveError> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |scope| {
            let step: Arc<dyn Step<C>> = Arc::new(factory(scope)?);
            Ok(Arc::new(step) as Shared)
        });
        self.capability(
            CapabilityDescriptor {
                contract: step_contract::<C>(),
                implementation: ImplId::of::<S>(),
                lifetime: Lifetime::Scoped,
                decorator: false,
            },
            provider,
            Some(transactional_step_binder::<C>()),
        )
    }
}
