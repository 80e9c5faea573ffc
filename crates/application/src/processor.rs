//! Sequential stage processing
//!
//! An operation runs its preprocessors, then its stages, one after the
//! other. The first failure ends the operation; nothing runs in parallel and
//! nothing is retried here. A stage may push a stage to the front of the
//! queue to retry itself or insert a follow-up.
//!
//! Aborting is cooperative: [`AbortHandle::abort`] signals the cancellation
//! receiver every stage can watch and runs the abort callbacks stages
//! registered. The running stage finishes whatever it is doing; the
//! operation then ends as cancelled.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ports::{CancellationReceiver, CancellationToken, Clock};
use crate::{ApplicationError, ApplicationResult};

/// Callback run when an operation is aborted.
pub type AbortCallback = Box<dyn FnOnce() + Send>;

/// Receiver of stage status events.
pub type StatusCallback = Arc<dyn Fn(&StageEvent) + Send + Sync>;

/// One step of an operation over a context `C`.
#[async_trait]
pub trait Stage<C>: Send + Sync {
    /// Name used in events and logs.
    fn name(&self) -> &str;

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Any error ends the operation.
    async fn run(&self, ctx: &mut StageContext<'_, C>) -> ApplicationResult<()>;
}

/// Phase of a stage reported in a [`StageEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum StagePhase {
    /// The stage started.
    Started,
    /// The stage reported progress.
    Progress(String),
    /// The stage completed.
    Completed,
    /// The stage failed with the given message.
    Failed(String),
}

/// Status event of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageEvent {
    /// Operation id.
    pub op_id: String,
    /// Stage name.
    pub stage: String,
    /// What happened.
    #[serde(flatten)]
    pub phase: StagePhase,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// An operation: a context plus the steps to run over it.
pub struct StageOperation<C> {
    id: String,
    context: C,
    preprocessors: VecDeque<Arc<dyn Stage<C>>>,
    stages: VecDeque<Arc<dyn Stage<C>>>,
}

impl<C: Send> StageOperation<C> {
    /// Creates an operation without steps.
    pub fn new(id: impl Into<String>, context: C) -> Self {
        Self {
            id: id.into(),
            context,
            preprocessors: VecDeque::new(),
            stages: VecDeque::new(),
        }
    }

    /// Appends a preprocessor.
    #[must_use]
    pub fn preprocessor(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.preprocessors.push_back(Arc::new(stage));
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.stages.push_back(Arc::new(stage));
        self
    }

    /// Operation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// What a stage can see and do while it runs.
pub struct StageContext<'a, C> {
    op_id: &'a str,
    stage: &'a str,
    context: &'a mut C,
    queue: &'a mut VecDeque<Arc<dyn Stage<C>>>,
    aborts: &'a Mutex<Vec<AbortCallback>>,
    cancel: CancellationReceiver,
    emitter: &'a Emitter,
}

impl<C> StageContext<'_, C> {
    /// Operation id.
    #[must_use]
    pub const fn op_id(&self) -> &str {
        self.op_id
    }

    /// The operation context.
    #[must_use]
    pub const fn context(&self) -> &C {
        &*self.context
    }

    /// Mutable access to the operation context.
    pub const fn context_mut(&mut self) -> &mut C {
        &mut *self.context
    }

    /// A receiver signalled when the operation is aborted.
    #[must_use]
    pub fn cancellation(&self) -> CancellationReceiver {
        self.cancel.clone()
    }

    /// Registers a callback run if the operation is aborted. Runs it at once
    /// when the operation already was.
    pub fn on_abort(&self, callback: impl FnOnce() + Send + 'static) {
        let mut aborts = self.aborts.lock();
        if self.cancel.is_cancelled() {
            drop(aborts);
            callback();
            return;
        }
        aborts.push(Box::new(callback));
    }

    /// Runs `stage` next, before the remaining ones.
    pub fn run_next(&mut self, stage: Arc<dyn Stage<C>>) {
        self.queue.push_front(stage);
    }

    /// Reports progress of the running stage.
    pub fn report(&self, detail: impl Into<String>) {
        self.emitter
            .emit(self.op_id, self.stage, StagePhase::Progress(detail.into()));
    }
}

struct Emitter {
    clock: Arc<dyn Clock>,
    status: Option<StatusCallback>,
}

impl Emitter {
    fn emit(&self, op_id: &str, stage: &str, phase: StagePhase) {
        let Some(status) = &self.status else {
            return;
        };
        status(&StageEvent {
            op_id: op_id.to_string(),
            stage: stage.to_string(),
            phase,
            at: self.clock.now(),
        });
    }
}

/// Aborts a running operation.
#[derive(Clone)]
pub struct AbortHandle {
    token: CancellationToken,
    aborts: Arc<Mutex<Vec<AbortCallback>>>,
}

impl AbortHandle {
    /// Signals cancellation and runs every registered abort callback.
    pub fn abort(&self) {
        self.token.cancel();
        let callbacks = std::mem::take(&mut *self.aborts.lock());
        debug!(callbacks = callbacks.len(), "running abort callbacks");
        for callback in callbacks {
            callback();
        }
    }

    /// Whether [`abort`](Self::abort) was called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The context of a finished operation and how it ended.
pub struct Processed<C> {
    /// The operation context, as the last stage left it.
    pub context: C,
    /// `Ok` if every step succeeded.
    pub result: ApplicationResult<()>,
}

/// Runs stage operations, reporting status events.
pub struct StageProcessor {
    clock: Arc<dyn Clock>,
    status: Option<StatusCallback>,
}

impl StageProcessor {
    /// Creates a processor stamping events with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, status: None }
    }

    /// Sets the receiver of status events.
    #[must_use]
    pub fn with_status(mut self, status: StatusCallback) -> Self {
        self.status = Some(status);
        self
    }

    /// Starts `operation`: returns its abort handle and the future running it.
    pub fn start<C: Send + 'static>(
        &self,
        operation: StageOperation<C>,
    ) -> (AbortHandle, impl Future<Output = Processed<C>> + Send + 'static) {
        let (token, cancel) = CancellationToken::new();
        let handle = AbortHandle {
            token,
            aborts: Arc::new(Mutex::new(Vec::new())),
        };
        let emitter = Emitter {
            clock: Arc::clone(&self.clock),
            status: self.status.clone(),
        };
        let aborts = Arc::clone(&handle.aborts);
        (handle, run(operation, emitter, aborts, cancel))
    }
}

async fn run<C: Send + 'static>(
    operation: StageOperation<C>,
    emitter: Emitter,
    aborts: Arc<Mutex<Vec<AbortCallback>>>,
    cancel: CancellationReceiver,
) -> Processed<C> {
    let StageOperation {
        id,
        mut context,
        mut preprocessors,
        mut stages,
    } = operation;
    info!(op_id = %id, stages = stages.len(), "operation started");

    let mut result = drain(&id, &mut context, &mut preprocessors, &emitter, &aborts, &cancel).await;
    if result.is_ok() {
        result = drain(&id, &mut context, &mut stages, &emitter, &aborts, &cancel).await;
    }

    match &result {
        Ok(()) => info!(op_id = %id, "operation completed"),
        Err(ApplicationError::Cancelled) => info!(op_id = %id, "operation cancelled"),
        Err(e) => warn!(op_id = %id, error = %e, "operation failed"),
    }
    Processed { context, result }
}

async fn drain<C: Send>(
    op_id: &str,
    context: &mut C,
    queue: &mut VecDeque<Arc<dyn Stage<C>>>,
    emitter: &Emitter,
    aborts: &Mutex<Vec<AbortCallback>>,
    cancel: &CancellationReceiver,
) -> ApplicationResult<()> {
    while let Some(stage) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(ApplicationError::Cancelled);
        }
        let name = stage.name().to_string();
        debug!(op_id, stage = %name, "stage started");
        emitter.emit(op_id, &name, StagePhase::Started);

        let mut ctx = StageContext {
            op_id,
            stage: &name,
            context: &mut *context,
            queue: &mut *queue,
            aborts,
            cancel: cancel.clone(),
            emitter,
        };
        if let Err(e) = stage.run(&mut ctx).await {
            emitter.emit(op_id, &name, StagePhase::Failed(e.to_string()));
            return Err(e);
        }
        emitter.emit(op_id, &name, StagePhase::Completed);
    }

    if cancel.is_cancelled() {
        return Err(ApplicationError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    /// Appends its name to the context log.
    struct Record(&'static str);

    #[async_trait]
    impl Stage<Vec<String>> for Record {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, ctx: &mut StageContext<'_, Vec<String>>) -> ApplicationResult<()> {
            ctx.context_mut().push(self.0.to_string());
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl Stage<Vec<String>> for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn run(&self, _ctx: &mut StageContext<'_, Vec<String>>) -> ApplicationResult<()> {
            Err(ApplicationError::Http("401".into()))
        }
    }

    /// Schedules one retry of itself.
    struct RetryOnce;

    #[async_trait]
    impl Stage<Vec<String>> for RetryOnce {
        fn name(&self) -> &str {
            "retry"
        }

        async fn run(&self, ctx: &mut StageContext<'_, Vec<String>>) -> ApplicationResult<()> {
            let first = !ctx.context().iter().any(|entry| entry == "retry");
            ctx.context_mut().push("retry".into());
            if first {
                ctx.run_next(Arc::new(Self));
            }
            Ok(())
        }
    }

    /// Waits for the abort signal.
    struct WaitForAbort;

    #[async_trait]
    impl Stage<Vec<String>> for WaitForAbort {
        fn name(&self) -> &str {
            "wait"
        }

        async fn run(&self, ctx: &mut StageContext<'_, Vec<String>>) -> ApplicationResult<()> {
            let flag = Arc::new(Mutex::new(false));
            let seen = Arc::clone(&flag);
            ctx.on_abort(move || *seen.lock() = true);
            ctx.report("waiting");
            ctx.cancellation().cancelled().await;
            ctx.context_mut().push(format!("aborted={}", *flag.lock()));
            Ok(())
        }
    }

    /// Registers its abort callback only after the abort.
    struct LateCallback;

    #[async_trait]
    impl Stage<Vec<String>> for LateCallback {
        fn name(&self) -> &str {
            "late"
        }

        async fn run(&self, ctx: &mut StageContext<'_, Vec<String>>) -> ApplicationResult<()> {
            ctx.report("waiting");
            ctx.cancellation().cancelled().await;
            let flag = Arc::new(Mutex::new(false));
            let seen = Arc::clone(&flag);
            ctx.on_abort(move || *seen.lock() = true);
            ctx.context_mut().push(format!("late={}", *flag.lock()));
            Ok(())
        }
    }

    fn processor() -> (StageProcessor, Arc<Mutex<Vec<StageEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let processor = StageProcessor::new(Arc::new(FixedClock))
            .with_status(Arc::new(move |event: &StageEvent| sink.lock().push(event.clone())));
        (processor, events)
    }

    #[tokio::test]
    async fn preprocessors_run_before_stages_in_order() {
        let (processor, events) = processor();
        let operation = StageOperation::new("op-1", Vec::new())
            .stage(Record("fetch"))
            .preprocessor(Record("resolve"))
            .stage(Record("render"));

        let (_, running) = processor.start(operation);
        let processed = running.await;

        assert!(processed.result.is_ok());
        assert_eq!(processed.context, vec!["resolve", "fetch", "render"]);
        let phases: Vec<_> = events.lock().iter().map(|e| (e.stage.clone(), e.phase.clone())).collect();
        assert_eq!(phases.len(), 6);
        assert_eq!(phases[0], ("resolve".to_string(), StagePhase::Started));
        assert_eq!(phases[5], ("render".to_string(), StagePhase::Completed));
    }

    #[tokio::test]
    async fn failing_preprocessor_skips_every_stage() {
        let (processor, events) = processor();
        let operation = StageOperation::new("op-2", Vec::new())
            .preprocessor(Fail)
            .stage(Record("fetch"));

        let processed = processor.start(operation).1.await;

        assert!(matches!(processed.result, Err(ApplicationError::Http(_))));
        assert!(processed.context.is_empty());
        assert_eq!(
            events.lock().last().map(|e| e.phase.clone()),
            Some(StagePhase::Failed("HTTP error: 401".into()))
        );
    }

    #[tokio::test]
    async fn failing_stage_stops_the_queue() {
        let (processor, _) = processor();
        let operation = StageOperation::new("op-3", Vec::new())
            .stage(Record("a"))
            .stage(Fail)
            .stage(Record("b"));

        let processed = processor.start(operation).1.await;

        assert!(processed.result.is_err());
        assert_eq!(processed.context, vec!["a"]);
    }

    #[tokio::test]
    async fn stage_can_schedule_itself_again() {
        let (processor, _) = processor();
        let operation = StageOperation::new("op-4", Vec::new())
            .stage(RetryOnce)
            .stage(Record("done"));

        let processed = processor.start(operation).1.await;

        assert_eq!(processed.context, vec!["retry", "retry", "done"]);
    }

    #[tokio::test]
    async fn abort_runs_callbacks_and_cancels() {
        let (processor, events) = processor();
        let operation = StageOperation::new("op-5", Vec::new())
            .stage(WaitForAbort)
            .stage(Record("never"));

        let (handle, running) = processor.start(operation);
        let task = tokio::spawn(running);
        while !events
            .lock()
            .iter()
            .any(|e| e.phase == StagePhase::Progress("waiting".into()))
        {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let processed = task.await.unwrap();

        assert!(handle.is_aborted());
        assert!(matches!(processed.result, Err(ApplicationError::Cancelled)));
        assert_eq!(processed.context, vec!["aborted=true"]);
    }

    #[tokio::test]
    async fn callback_registered_after_abort_runs_immediately() {
        let (processor, events) = processor();
        let operation = StageOperation::new("op-6", Vec::new()).stage(LateCallback);

        let (handle, running) = processor.start(operation);
        let task = tokio::spawn(running);
        while !events
            .lock()
            .iter()
            .any(|e| e.phase == StagePhase::Progress("waiting".into()))
        {
            tokio::task::yield_now().await;
        }
        handle.abort();
        let processed = task.await.unwrap();

        assert!(matches!(processed.result, Err(ApplicationError::Cancelled)));
        assert_eq!(processed.context, vec!["late=true"]);
    }
}
