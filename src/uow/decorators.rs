//! Transactional wrappers for command handlers and pipeline steps.
//!
//! A wrapper owns the scope's unit of work and the raw implementation it
//! closes over. When enabled it brackets the inner call with
//! start/commit/rollback; when disabled it is pure pass-through and never
//! touches the unit of work. The enabled flag is captured at construction,
//! so the decision is visible at composition time and immutable afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::composition::{BindFn, DecoratorBinder, ResolveError, Scope, Shared};
use crate::contract::ImplId;
use crate::cqrs::{
    command_handler_contract, Command, CommandHandler, CommandResponse, HandlerError,
};
use crate::step::{step_contract, Cancellation, Step, StepContext};
use crate::uow::UnitOfWork;

/// Transactional wrapper around a [`CommandHandler`].
pub struct TransactionalHandler<C: Command> {
    unit_of_work: Arc<dyn UnitOfWork>,
    inner: Arc<dyn CommandHandler<C>>,
    enabled: bool,
}

impl<C: Command> TransactionalHandler<C> {
    pub fn new(
        unit_of_work: Arc<dyn UnitOfWork>,
        inner: Arc<dyn CommandHandler<C>>,
        enabled: bool,
    ) -> Self {
        Self {
            unit_of_work,
            inner,
            enabled,
        }
    }

    pub fn is_transaction_enabled(&self) -> bool {
        self.enabled
    }

    async fn handle_in_transaction(&self, command: C) -> Result<CommandResponse, HandlerError> {
        self.unit_of_work.start_transaction().await?;
        match self.inner.handle(command).await {
            Ok(response) => {
                self.unit_of_work.commit_transaction().await?;
                Ok(response)
            }
            Err(err) => {
                error!(error = %err, "command handler failed, rolling back");
                self.unit_of_work.rollback_transaction().await?;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C: Command> CommandHandler<C> for TransactionalHandler<C> {
    async fn handle(&self, command: C) -> Result<CommandResponse, HandlerError> {
        if !self.enabled {
            return self.inner.handle(command).await;
        }
        self.handle_in_transaction(command).await
    }
}

/// Transactional wrapper around a pipeline [`Step`].
///
/// The inner step's order is copied out at construction; ordering metadata
/// never changes after the wrapper exists.
pub struct TransactionalStep<C: StepContext> {
    unit_of_work: Arc<dyn UnitOfWork>,
    inner: Arc<dyn Step<C>>,
    enabled: bool,
    order: i32,
}

impl<C: StepContext> TransactionalStep<C> {
    pub fn new(unit_of_work: Arc<dyn UnitOfWork>, inner: Arc<dyn Step<C>>, enabled: bool) -> Self {
        let order = inner.order();
        Self {
            unit_of_work,
            inner,
            enabled,
            order,
        }
    }

    pub fn is_transaction_enabled(&self) -> bool {
        self.enabled
    }

    async fn execute_in_transaction(
        &self,
        context: &C,
        cancellation: &Cancellation,
    ) -> Result<(), HandlerError> {
        self.unit_of_work.start_transaction().await?;
        match self.inner.execute(context, cancellation).await {
            Ok(()) => {
                self.unit_of_work.commit_transaction().await?;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, order = self.order, "step failed, rolling back");
                self.unit_of_work.rollback_transaction().await?;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C: StepContext> Step<C> for TransactionalStep<C> {
    fn order(&self) -> i32 {
        self.order
    }

    async fn execute(&self, context: &C, cancellation: &Cancellation) -> Result<(), HandlerError> {
        if !self.enabled {
            return self.inner.execute(context, cancellation).await;
        }
        self.execute_in_transaction(context, cancellation).await
    }
}

/// Binder closing [`TransactionalHandler`] over command type `C`.
pub fn transactional_handler_binder<C: Command>() -> DecoratorBinder {
    let bind: BindFn = Arc::new(|inner: Shared, scope: &Scope, enabled: bool| {
        let inner = inner
            .downcast_ref::<Arc<dyn CommandHandler<C>>>()
            .cloned()
            .ok_or_else(|| ResolveError::TypeMismatch {
                key: command_handler_contract::<C>().to_string(),
                expected: std::any::type_name::<Arc<dyn CommandHandler<C>>>(),
            })?;
        let unit_of_work = scope.unit_of_work()?;
        let wrapped: Arc<dyn CommandHandler<C>> =
            Arc::new(TransactionalHandler::new(unit_of_work, inner, enabled));
        Ok(Arc::new(wrapped) as Shared)
    });
    DecoratorBinder::new(ImplId::of::<TransactionalHandler<C>>(), true, bind)
}

/// Binder closing [`TransactionalStep`] over context type `C`.
pub fn transactional_step_binder<C: StepContext>() -> DecoratorBinder {
    let bind: BindFn = Arc::new(|inner: Shared, scope: &Scope, enabled: bool| {
        let inner = inner
            .downcast_ref::<Arc<dyn Step<C>>>()
            .cloned()
            .ok_or_else(|| ResolveError::TypeMismatch {
                key: step_contract::<C>().to_string(),
                expected: std::any::type_name::<Arc<dyn Step<C>>>(),
            })?;
        let unit_of_work = scope.unit_of_work()?;
        let wrapped: Arc<dyn Step<C>> =
            Arc::new(TransactionalStep::new(unit_of_work, inner, enabled));
        Ok(Arc::new(wrapped) as Shared)
    });
    DecoratorBinder::new(ImplId::of::<TransactionalStep<C>>(), true, bind)
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::data::{Datastore, MemoryDatastore, RecordStore, Result as StoreResult, StoreError};

    #[derive(Default)]
    struct RecordingUnitOfWork {
        starts: AtomicUsize,
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
        open: Mutex<bool>,
        store: MemoryDatastore,
    }

    #[async_trait]
    impl UnitOfWork for RecordingUnitOfWork {
        async fn start_transaction(&self) -> StoreResult<()> {
            let mut open = self.open.lock().unwrap();
            if !*open {
                self.starts.fetch_add(1, Ordering::SeqCst);
                *open = true;
            }
            Ok(())
        }

        async fn commit_transaction(&self) -> StoreResult<()> {
            let mut open = self.open.lock().unwrap();
            if *open {
                self.commits.fetch_add(1, Ordering::SeqCst);
                *open = false;
            }
            Ok(())
        }

        async fn rollback_transaction(&self) -> StoreResult<()> {
            let mut open = self.open.lock().unwrap();
            if *open {
                self.rollbacks.fetch_add(1, Ordering::SeqCst);
                *open = false;
            }
            Ok(())
        }

        async fn in_transaction(&self) -> bool {
            *self.open.lock().unwrap()
        }

        fn record_store(&self, _entity: TypeId, kind: &'static str) -> Arc<dyn RecordStore> {
            self.store.records(kind)
        }
    }

    struct Ping;
    impl Command for Ping {}

    struct OkHandler;

    #[async_trait]
    impl CommandHandler<Ping> for OkHandler {
        async fn handle(&self, _command: Ping) -> Result<CommandResponse, HandlerError> {
            Ok(CommandResponse::empty())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("out of stock")]
    struct OutOfStock;

    struct FailingHandler;

    #[async_trait]
    impl CommandHandler<Ping> for FailingHandler {
        async fn handle(&self, _command: Ping) -> Result<CommandResponse, HandlerError> {
            Err(HandlerError::new(OutOfStock))
        }
    }

    #[tokio::test]
    async fn success_commits_exactly_once() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        let handler = TransactionalHandler::new(uow.clone(), Arc::new(OkHandler), true);

        handler.handle(Ping).await.unwrap();

        assert_eq!(uow.starts.load(Ordering::SeqCst), 1);
        assert_eq!(uow.commits.load(Ordering::SeqCst), 1);
        assert_eq!(uow.rollbacks.load(Ordering::SeqCst), 0);
        assert!(!uow.in_transaction().await);
    }

    #[tokio::test]
    async fn failure_rolls_back_and_preserves_the_error() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        let handler = TransactionalHandler::new(uow.clone(), Arc::new(FailingHandler), true);

        let err = handler.handle(Ping).await.unwrap_err();

        assert!(err.downcast_ref::<OutOfStock>().is_some());
        assert_eq!(uow.starts.load(Ordering::SeqCst), 1);
        assert_eq!(uow.commits.load(Ordering::SeqCst), 0);
        assert_eq!(uow.rollbacks.load(Ordering::SeqCst), 1);
        assert!(!uow.in_transaction().await);
    }

    #[tokio::test]
    async fn disabled_wrapper_never_touches_the_unit_of_work() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        let handler = TransactionalHandler::new(uow.clone(), Arc::new(FailingHandler), false);
        assert!(!handler.is_transaction_enabled());

        let err = handler.handle(Ping).await.unwrap_err();

        assert!(err.downcast_ref::<OutOfStock>().is_some());
        assert_eq!(uow.starts.load(Ordering::SeqCst), 0);
        assert_eq!(uow.commits.load(Ordering::SeqCst), 0);
        assert_eq!(uow.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[derive(Default)]
    struct FlakyUnitOfWork {
        fail_commit: bool,
        fail_rollback: bool,
        rollback_attempts: AtomicUsize,
    }

    #[async_trait]
    impl UnitOfWork for FlakyUnitOfWork {
        async fn start_transaction(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn commit_transaction(&self) -> StoreResult<()> {
            if self.fail_commit {
                return Err(StoreError::Transaction("commit failed".to_string()));
            }
            Ok(())
        }

        async fn rollback_transaction(&self) -> StoreResult<()> {
            self.rollback_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_rollback {
                return Err(StoreError::Transaction("rollback failed".to_string()));
            }
            Ok(())
        }

        async fn in_transaction(&self) -> bool {
            false
        }

        fn record_store(&self, _entity: TypeId, kind: &'static str) -> Arc<dyn RecordStore> {
            MemoryDatastore::new().records(kind)
        }
    }

    #[tokio::test]
    async fn a_commit_failure_surfaces_the_store_error() {
        let uow = Arc::new(FlakyUnitOfWork {
            fail_commit: true,
            ..Default::default()
        });
        let handler = TransactionalHandler::new(uow, Arc::new(OkHandler), true);

        let err = handler.handle(Ping).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Transaction(_))
        ));
    }

    #[tokio::test]
    async fn a_rollback_failure_propagates_without_retry() {
        let uow = Arc::new(FlakyUnitOfWork {
            fail_rollback: true,
            ..Default::default()
        });
        let handler = TransactionalHandler::new(uow.clone(), Arc::new(FailingHandler), true);

        let err = handler.handle(Ping).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Transaction(_))
        ));
        assert_eq!(uow.rollback_attempts.load(Ordering::SeqCst), 1);
    }

    struct Ctx;
    impl StepContext for Ctx {}

    struct FixedOrderStep(i32);

    #[async_trait]
    impl Step<Ctx> for FixedOrderStep {
        fn order(&self) -> i32 {
            self.0
        }

        async fn execute(
            &self,
            _context: &Ctx,
            _cancellation: &Cancellation,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn step_wrapper_reports_the_inner_order() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        for order in [i32::MIN, -5, 0, 7] {
            let step =
                TransactionalStep::new(uow.clone(), Arc::new(FixedOrderStep(order)), true);
            assert_eq!(step.order(), order);
        }
    }

    #[tokio::test]
    async fn step_success_commits() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        let step = TransactionalStep::new(uow.clone(), Arc::new(FixedOrderStep(1)), true);

        step.execute(&Ctx, &Cancellation::none()).await.unwrap();

        assert_eq!(uow.starts.load(Ordering::SeqCst), 1);
        assert_eq!(uow.commits.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("step blew up")]
    struct StepBoom;

    struct FailingStep;

    #[async_trait]
    impl Step<Ctx> for FailingStep {
        fn order(&self) -> i32 {
            2
        }

        async fn execute(
            &self,
            _context: &Ctx,
            _cancellation: &Cancellation,
        ) -> Result<(), HandlerError> {
            Err(HandlerError::new(StepBoom))
        }
    }

    #[tokio::test]
    async fn step_failure_rolls_back_and_preserves_the_error() {
        let uow = Arc::new(RecordingUnitOfWork::default());
        let step = TransactionalStep::new(uow.clone(), Arc::new(FailingStep), true);

        let err = step.execute(&Ctx, &Cancellation::none()).await.unwrap_err();

        assert!(err.downcast_ref::<StepBoom>().is_some());
        assert_eq!(uow.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(uow.commits.load(Ordering::SeqCst), 0);
    }
}
