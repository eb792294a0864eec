//! Engine: command entry, transactions, lifecycles
//!
//! One command executes at a time per workflow family: the engine holds an
//! async mutex per root and runs the whole command synchronously against a
//! loaded snapshot, then commits with optimistic concurrency. Activity
//! hooks run inline; deferred jobs arm only after the commit succeeds.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::command::{ChildTarget, Command, CommandOutcome};
use super::registry::{resolve_definition, DefinitionRegistry};
use super::txn::CommandTxn;
use super::{enabling, firing};
use crate::activity::{run_hook, ActivityContext, ActivityError, ActivityRequest};
use crate::audit::{SpanAttributes, TraceReader};
use crate::definition::{TaskDef, TaskKind, WorkItemAction, WorkflowDefinition};
use crate::error::EngineError;
use crate::model::{
    Actor, Claim, Offer, OfferScope, PayloadEnvelope, TaskRecord, TaskState, WorkItemRecord,
    WorkItemState, WorkflowRecord, WorkflowState,
};
use crate::persistence::{EngineStore, FamilySnapshot, StoreError};
use crate::scheduler::{JobFire, JobScheduler, ScheduledKey, TokioJobScheduler};

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times a conflicting command reloads and retries
    pub max_conflict_retries: u32,

    /// Stats shard count for tasks that do not override it
    pub default_stats_shards: u32,

    /// Hard limit on cascade depth (nested workflows, chained completions)
    pub max_cascade_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            default_stats_shards: 4,
            max_cascade_depth: 32,
        }
    }
}

struct EngineInner<S> {
    store: Arc<S>,
    registry: Arc<DefinitionRegistry>,
    scheduler: Arc<dyn JobScheduler>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    config: EngineConfig,
}

/// The workflow execution engine
///
/// Cheap to clone; all state lives behind the store. Create with
/// [`Engine::start`] inside a Tokio runtime — the engine spawns the
/// deferred-job dispatch loop on construction.
///
/// # Example
///
/// ```ignore
/// let registry = DefinitionRegistry::new();
/// registry.register(definition)?;
///
/// let engine = Engine::start(InMemoryEngineStore::new(), registry);
/// let handle = engine.handle("order", "v1")?;
/// let workflow_id = handle.initialize_root(json!({ "sku": "A-17" })).await?;
/// ```
pub struct Engine<S: EngineStore> {
    inner: Arc<EngineInner<S>>,
}

impl<S: EngineStore> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: EngineStore> Engine<S> {
    /// Start an engine with the default configuration
    pub fn start(store: S, registry: DefinitionRegistry) -> Self {
        Self::start_with_config(store, registry, EngineConfig::default())
    }

    /// Start an engine with a custom configuration
    pub fn start_with_config(store: S, registry: DefinitionRegistry, config: EngineConfig) -> Self {
        let (scheduler, mut fires) = TokioJobScheduler::channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                store: Arc::new(store),
                registry: Arc::new(registry),
                scheduler,
                locks: DashMap::new(),
                config,
            }),
        };

        let dispatcher = engine.clone();
        tokio::spawn(async move {
            while let Some(fire) = fires.recv().await {
                dispatcher.dispatch_fire(fire).await;
            }
        });

        engine
    }

    /// The underlying store
    pub fn store(&self) -> Arc<S> {
        self.inner.store.clone()
    }

    /// The definition registry
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.inner.registry
    }

    /// Audit reader over this engine's store
    pub fn reader(&self) -> TraceReader<S> {
        TraceReader::new(self.inner.store.clone())
    }

    /// Command surface bound to one registered definition
    pub fn handle(&self, name: &str, version: &str) -> Result<DefinitionHandle<S>, EngineError> {
        if !self.inner.registry.contains(name, version) {
            return Err(EngineError::UnknownDefinition {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        Ok(DefinitionHandle {
            engine: self.clone(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Execute a command
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, EngineError> {
        self.execute_with_job(command, None).await
    }

    // =========================================================================
    // Read API
    // =========================================================================

    /// Load a family snapshot
    pub async fn family(&self, root_id: Uuid) -> Result<FamilySnapshot, EngineError> {
        Ok(self.inner.store.load_family(root_id).await?)
    }

    /// Load a workflow record
    pub async fn workflow(&self, workflow_id: Uuid) -> Result<WorkflowRecord, EngineError> {
        let root = self.inner.store.root_of_workflow(workflow_id).await?;
        let snap = self.inner.store.load_family(root).await?;
        snap.workflow(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::Store(StoreError::WorkflowNotFound(workflow_id)))
    }

    /// Load a task record
    pub async fn task(&self, workflow_id: Uuid, name: &str) -> Result<TaskRecord, EngineError> {
        let root = self.inner.store.root_of_workflow(workflow_id).await?;
        let snap = self.inner.store.load_family(root).await?;
        snap.task(workflow_id, name).cloned().ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "task {name} does not exist in workflow {workflow_id}"
            ))
        })
    }

    /// Load a work item record
    pub async fn work_item(&self, work_item_id: Uuid) -> Result<WorkItemRecord, EngineError> {
        let root = self.inner.store.root_of_work_item(work_item_id).await?;
        let snap = self.inner.store.load_family(root).await?;
        snap.work_items
            .get(&work_item_id)
            .cloned()
            .ok_or_else(|| EngineError::Store(StoreError::WorkItemNotFound(work_item_id)))
    }

    /// Read a condition's marking
    pub async fn marking(&self, workflow_id: Uuid, condition: &str) -> Result<u32, EngineError> {
        let root = self.inner.store.root_of_workflow(workflow_id).await?;
        let snap = self.inner.store.load_family(root).await?;
        snap.condition(workflow_id, condition)
            .map(|c| c.marking)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "condition {condition} does not exist in workflow {workflow_id}"
                ))
            })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn dispatch_fire(&self, fire: JobFire) {
        let operation = fire.command.operation();
        match self.execute_with_job(fire.command, Some(fire.job_id)).await {
            Ok(CommandOutcome::Noop) => {
                debug!(job_id = %fire.job_id, operation, "deferred job dropped (entry reaped or target terminal)");
            }
            Ok(_) => {
                debug!(job_id = %fire.job_id, operation, "deferred job applied");
            }
            Err(
                EngineError::NotEnabled { .. } | EngineError::IllegalStateTransition { .. },
            ) => {
                debug!(job_id = %fire.job_id, operation, "deferred job target no longer actionable");
            }
            Err(e) => {
                warn!(job_id = %fire.job_id, operation, error = %e, "deferred job failed");
            }
        }
    }

    async fn root_of_command(&self, command: &Command) -> Result<Uuid, EngineError> {
        let store = &self.inner.store;
        let root = match command {
            Command::InitializeRoot { .. } => Uuid::now_v7(),
            Command::CancelRoot { workflow_id } | Command::CancelWorkflow { workflow_id } => {
                store.root_of_workflow(*workflow_id).await?
            }
            Command::InitializeWorkflow { target, .. } => {
                store.root_of_workflow(target.parent_workflow_id).await?
            }
            Command::InitializeWorkItem { workflow_id, .. } => {
                store.root_of_workflow(*workflow_id).await?
            }
            Command::StartWorkItem { work_item_id, .. }
            | Command::CompleteWorkItem { work_item_id, .. }
            | Command::FailWorkItem { work_item_id, .. }
            | Command::CancelWorkItem { work_item_id, .. } => {
                store.root_of_work_item(*work_item_id).await?
            }
        };
        Ok(root)
    }

    #[instrument(skip(self, command), fields(operation = command.operation()))]
    async fn execute_with_job(
        &self,
        command: Command,
        consumed_job: Option<Uuid>,
    ) -> Result<CommandOutcome, EngineError> {
        let root_id = self.root_of_command(&command).await?;

        // Single command at a time per family root.
        let lock = self
            .inner
            .locks
            .entry(root_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock_owned().await;

        let is_create = matches!(command, Command::InitializeRoot { .. });
        let mut attempt = 0;
        loop {
            let mut txn = if is_create {
                CommandTxn::create(root_id, self.inner.config.default_stats_shards)
            } else {
                CommandTxn::load(
                    self.inner.store.load_family(root_id).await?,
                    self.inner.config.default_stats_shards,
                )
            };

            if let Some(job_id) = consumed_job {
                if !txn.consume_scheduled(job_id) {
                    return Ok(CommandOutcome::Noop);
                }
            }

            let exec = ExecCtx {
                registry: &self.inner.registry,
                config: &self.inner.config,
            };
            let outcome = exec.apply(&mut txn, &command)?;

            if !txn.is_dirty() {
                // Idempotent no-op: nothing written, no spans emitted.
                return Ok(outcome);
            }

            let finished = txn.finish();
            match self
                .inner
                .store
                .commit_family(finished.snapshot, finished.expected_revision, finished.spans)
                .await
            {
                Ok(_) => {
                    for job in finished.pending_jobs {
                        self.inner
                            .scheduler
                            .schedule(job.job_id, job.delay, job.command);
                    }
                    for job_id in finished.canceled_jobs {
                        self.inner.scheduler.cancel(job_id);
                    }
                    return Ok(outcome);
                }
                Err(StoreError::RevisionConflict { .. })
                    if attempt < self.inner.config.max_conflict_retries =>
                {
                    attempt += 1;
                    debug!(%root_id, attempt, "commit conflict, retrying");
                    continue;
                }
                Err(StoreError::RevisionConflict { .. }) => {
                    return Err(EngineError::Conflict { root_id });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Command surface bound to one registered definition
///
/// Mirrors the definition-parameterized command set: root lifecycle, child
/// workflow lifecycle, and the work-item lifecycle.
pub struct DefinitionHandle<S: EngineStore> {
    engine: Engine<S>,
    name: String,
    version: String,
}

impl<S: EngineStore> DefinitionHandle<S> {
    /// Create a new root workflow instance
    pub async fn initialize_root(
        &self,
        payload: serde_json::Value,
    ) -> Result<Uuid, EngineError> {
        let outcome = self
            .engine
            .execute(Command::InitializeRoot {
                definition: self.name.clone(),
                version: self.version.clone(),
                payload,
            })
            .await?;
        match outcome {
            CommandOutcome::Workflow { workflow_id } => Ok(workflow_id),
            other => Err(EngineError::InvariantViolation(format!(
                "unexpected outcome {other:?} from initializeRoot"
            ))),
        }
    }

    /// Cancel a root workflow and everything under it
    pub async fn cancel_root(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        self.engine
            .execute(Command::CancelRoot { workflow_id })
            .await
            .map(|_| ())
    }

    /// Initialize a child workflow under a dynamic composite task
    pub async fn initialize_workflow(
        &self,
        definition: &str,
        target: ChildTarget,
        payload: serde_json::Value,
    ) -> Result<Uuid, EngineError> {
        let outcome = self
            .engine
            .execute(Command::InitializeWorkflow {
                definition: definition.to_string(),
                target,
                payload,
            })
            .await?;
        match outcome {
            CommandOutcome::Workflow { workflow_id } => Ok(workflow_id),
            other => Err(EngineError::InvariantViolation(format!(
                "unexpected outcome {other:?} from initializeWorkflow"
            ))),
        }
    }

    /// Cancel a (child) workflow
    pub async fn cancel_workflow(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        self.engine
            .execute(Command::CancelWorkflow { workflow_id })
            .await
            .map(|_| ())
    }

    /// Initialize a work item on an enabled task
    pub async fn initialize_work_item(
        &self,
        workflow_id: Uuid,
        task: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, EngineError> {
        self.initialize_work_item_with(workflow_id, task, payload, None)
            .await
    }

    /// Initialize an offered (human) work item on an enabled task
    pub async fn initialize_offered_work_item(
        &self,
        workflow_id: Uuid,
        task: &str,
        payload: serde_json::Value,
        offer: Offer,
    ) -> Result<Uuid, EngineError> {
        self.initialize_work_item_with(workflow_id, task, payload, Some(offer))
            .await
    }

    async fn initialize_work_item_with(
        &self,
        workflow_id: Uuid,
        task: &str,
        payload: serde_json::Value,
        offer: Option<Offer>,
    ) -> Result<Uuid, EngineError> {
        let outcome = self
            .engine
            .execute(Command::InitializeWorkItem {
                workflow_id,
                task: task.to_string(),
                payload,
                offer,
                work_item_id: None,
            })
            .await?;
        match outcome {
            CommandOutcome::WorkItem { work_item_id } => Ok(work_item_id),
            other => Err(EngineError::InvariantViolation(format!(
                "unexpected outcome {other:?} from initializeWorkItem"
            ))),
        }
    }

    /// Start an initialized work item
    pub async fn start_work_item(
        &self,
        work_item_id: Uuid,
        actor: Actor,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.engine
            .execute(Command::StartWorkItem {
                work_item_id,
                actor,
                payload,
            })
            .await
            .map(|_| ())
    }

    /// Complete a started work item
    pub async fn complete_work_item(
        &self,
        work_item_id: Uuid,
        actor: Actor,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.engine
            .execute(Command::CompleteWorkItem {
                work_item_id,
                actor,
                payload,
            })
            .await
            .map(|_| ())
    }

    /// Fail a started work item
    pub async fn fail_work_item(
        &self,
        work_item_id: Uuid,
        actor: Actor,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.engine
            .execute(Command::FailWorkItem {
                work_item_id,
                actor,
                payload,
            })
            .await
            .map(|_| ())
    }

    /// Cancel a work item (never cascades to the task)
    pub async fn cancel_work_item(
        &self,
        work_item_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.engine
            .execute(Command::CancelWorkItem {
                work_item_id,
                payload,
            })
            .await
            .map(|_| ())
    }
}

/// Borrowed execution context: all command logic is synchronous over the
/// transaction, so one command's cascade is a plain call tree.
pub(crate) struct ExecCtx<'a> {
    pub(crate) registry: &'a DefinitionRegistry,
    pub(crate) config: &'a EngineConfig,
}

impl ExecCtx<'_> {
    pub(crate) fn apply(
        &self,
        txn: &mut CommandTxn,
        command: &Command,
    ) -> Result<CommandOutcome, EngineError> {
        let resource_id = match command {
            Command::InitializeRoot { .. } => txn.snap.root_id.to_string(),
            Command::CancelRoot { workflow_id } | Command::CancelWorkflow { workflow_id } => {
                workflow_id.to_string()
            }
            Command::InitializeWorkflow { target, .. } => {
                target.parent_workflow_id.to_string()
            }
            Command::InitializeWorkItem { workflow_id, .. } => workflow_id.to_string(),
            Command::StartWorkItem { work_item_id, .. }
            | Command::CompleteWorkItem { work_item_id, .. }
            | Command::FailWorkItem { work_item_id, .. }
            | Command::CancelWorkItem { work_item_id, .. } => work_item_id.to_string(),
        };

        let operation = command.operation();
        let scope = txn.open_scope(
            None,
            resource_id,
            operation.to_string(),
            operation,
            SpanAttributes::Custom {
                data: serde_json::json!({ "command": operation }),
            },
        );

        let outcome = self.dispatch(txn, command)?;
        txn.close_scope(scope);
        Ok(outcome)
    }

    fn dispatch(
        &self,
        txn: &mut CommandTxn,
        command: &Command,
    ) -> Result<CommandOutcome, EngineError> {
        match command {
            Command::InitializeRoot {
                definition,
                version,
                payload,
            } => self.initialize_root(txn, definition, version, payload),

            Command::CancelRoot { workflow_id } | Command::CancelWorkflow { workflow_id } => {
                self.handle_cancel_workflow(txn, *workflow_id)
            }

            Command::InitializeWorkflow {
                definition,
                target,
                payload,
            } => self.handle_initialize_workflow(txn, definition, target, payload),

            Command::InitializeWorkItem {
                workflow_id,
                task,
                payload,
                offer,
                work_item_id,
            } => self.handle_initialize_work_item(
                txn,
                *workflow_id,
                task,
                payload,
                offer.clone(),
                *work_item_id,
            ),

            Command::StartWorkItem {
                work_item_id,
                actor,
                payload,
            } => self.handle_start_work_item(txn, *work_item_id, actor, payload),

            Command::CompleteWorkItem {
                work_item_id,
                actor,
                payload,
            } => self.handle_complete_work_item(txn, *work_item_id, actor, payload),

            Command::FailWorkItem {
                work_item_id,
                actor,
                payload,
            } => self.handle_fail_work_item(txn, *work_item_id, actor, payload),

            Command::CancelWorkItem {
                work_item_id,
                payload,
            } => self.handle_cancel_work_item(txn, *work_item_id, payload),
        }
    }

    pub(crate) fn depth_guard(&self, depth: u32) -> Result<(), EngineError> {
        if depth > self.config.max_cascade_depth {
            return Err(EngineError::InvariantViolation(format!(
                "cascade depth exceeded {}",
                self.config.max_cascade_depth
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    fn initialize_root(
        &self,
        txn: &mut CommandTxn,
        definition: &str,
        version: &str,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let def = self
            .registry
            .get(definition, version)
            .ok_or_else(|| EngineError::UnknownDefinition {
                name: definition.to_string(),
                version: version.to_string(),
            })?;

        if let Some(schema) = def.root_schema() {
            schema.validate(payload).map_err(EngineError::validation)?;
        }

        let workflow_id = txn.snap.root_id;
        info!(%workflow_id, definition, version, "initializing root workflow");
        self.instantiate_workflow(txn, &def, workflow_id, None, payload, 0)?;
        Ok(CommandOutcome::Workflow { workflow_id })
    }

    fn handle_initialize_workflow(
        &self,
        txn: &mut CommandTxn,
        definition: &str,
        target: &ChildTarget,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let parent_wf = target.parent_workflow_id;
        let def = resolve_definition(self.registry, &txn.snap, parent_wf)?;
        let task_def = def.task(&target.parent_task_name).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "task {} does not exist in definition {}",
                target.parent_task_name,
                def.name()
            ))
        })?;

        if !matches!(task_def.kind(), TaskKind::Dynamic { .. }) {
            return Err(EngineError::InvariantViolation(format!(
                "task {} is not a dynamic composite",
                task_def.name()
            )));
        }

        let task_record = txn.task(parent_wf, task_def.name())?.clone();
        if !task_record.state.is_active() {
            return Err(EngineError::NotEnabled {
                workflow_id: parent_wf,
                task: task_def.name().to_string(),
            });
        }

        let child_def = task_def
            .kind()
            .child_named(definition)
            .ok_or_else(|| EngineError::UnknownDefinition {
                name: definition.to_string(),
                version: def.version().to_string(),
            })?
            .clone();

        if let Some(schema) = child_def.root_schema() {
            schema.validate(payload).map_err(EngineError::validation)?;
        }

        let child_id = self.initialize_child_workflow(
            txn,
            parent_wf,
            task_def,
            task_record.generation,
            &child_def,
            payload,
            0,
        )?;
        Ok(CommandOutcome::Workflow {
            workflow_id: child_id,
        })
    }

    fn handle_cancel_workflow(
        &self,
        txn: &mut CommandTxn,
        workflow_id: Uuid,
    ) -> Result<CommandOutcome, EngineError> {
        let record = txn.workflow(workflow_id)?.clone();
        if record.state.is_terminal() {
            return Ok(CommandOutcome::Noop);
        }

        self.cancel_workflow_cascade(txn, workflow_id, 0)?;
        if record.parent.is_some() {
            self.mirror_child_transition(txn, workflow_id, 1)?;
        }
        Ok(CommandOutcome::Applied)
    }

    fn handle_initialize_work_item(
        &self,
        txn: &mut CommandTxn,
        workflow_id: Uuid,
        task: &str,
        payload: &serde_json::Value,
        offer: Option<Offer>,
        work_item_id: Option<Uuid>,
    ) -> Result<CommandOutcome, EngineError> {
        let record = txn.workflow(workflow_id)?.clone();
        if record.state.is_terminal() {
            return Err(EngineError::IllegalStateTransition {
                element: format!("workflow {workflow_id}"),
                from: record.state.to_string(),
                requested: "initializeWorkItem".to_string(),
            });
        }

        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        let task_def = def.task(task).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "task {task} does not exist in definition {}",
                def.name()
            ))
        })?;

        let id = self.initialize_work_item_internal(
            txn,
            &def,
            workflow_id,
            task_def,
            payload,
            offer,
            work_item_id,
            0,
        )?;
        Ok(CommandOutcome::WorkItem { work_item_id: id })
    }

    fn handle_start_work_item(
        &self,
        txn: &mut CommandTxn,
        work_item_id: Uuid,
        actor: &Actor,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let item = txn.work_item(work_item_id)?.clone();
        if item.state != WorkItemState::Initialized {
            return Err(EngineError::IllegalStateTransition {
                element: format!("workItem {work_item_id}"),
                from: item.state.to_string(),
                requested: WorkItemState::Started.to_string(),
            });
        }

        let workflow_id = item.workflow_id;
        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        let task_def = self.require_task(&def, &item.task_name)?;
        let task_record = txn.task(workflow_id, &item.task_name)?.clone();

        if !task_record.state.is_active() {
            return Err(EngineError::NotEnabled {
                workflow_id,
                task: item.task_name.clone(),
            });
        }
        if item.task_generation != task_record.generation {
            return Err(EngineError::InvariantViolation(format!(
                "work item {work_item_id} belongs to generation {}, task is at {}",
                item.task_generation, task_record.generation
            )));
        }

        task_def
            .schemas()
            .validate(WorkItemAction::Start, payload)
            .map_err(EngineError::validation)?;

        // Offered items are claimed by the starting participant.
        if let Some(offer) = &item.offer {
            match (&offer.scope, actor) {
                (OfferScope::Participant { id }, Actor::Participant { id: starter })
                    if starter != id =>
                {
                    return Err(EngineError::InvariantViolation(format!(
                        "work item {work_item_id} is offered to participant {id}"
                    )));
                }
                _ => {}
            }
            if let Actor::Participant { id } = actor {
                txn.set_work_item_claim(
                    work_item_id,
                    Claim {
                        participant: id.clone(),
                        claimed_at: Utc::now(),
                    },
                )?;
            }
        }

        txn.set_work_item_payload(work_item_id, WorkItemAction::Start, payload.clone())?;
        txn.set_work_item_state(work_item_id, WorkItemState::Started, "workItem.start")?;

        let item = txn.work_item(work_item_id)?.clone();
        self.work_item_hook(
            txn,
            &def,
            task_def,
            &item,
            "workItem.onStarted",
            payload.clone(),
            |acts, ctx, record| acts.on_started(ctx, record),
            0,
        )?;
        self.notify_work_item_observer(txn, &def, workflow_id, task_def, &item, 0)?;

        // First start of the cycle fires the task.
        if task_record.state == TaskState::Enabled {
            firing::consume_inputs(txn, workflow_id, task_def)?;
            txn.set_task_state(workflow_id, task_def.name(), TaskState::Started)?;
            self.task_hook(
                txn,
                &def,
                workflow_id,
                task_def,
                task_record.generation,
                "task.onStarted",
                |acts, ctx| acts.on_started(ctx),
                0,
            )?;
            // Consumption may withdraw siblings sharing an input token.
            let consumed = task_def.inputs().to_vec();
            self.propagate_marking_changes(txn, &def, workflow_id, &consumed, 1)?;
        }

        Ok(CommandOutcome::Applied)
    }

    fn handle_complete_work_item(
        &self,
        txn: &mut CommandTxn,
        work_item_id: Uuid,
        actor: &Actor,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let item = self.settle_work_item(
            txn,
            work_item_id,
            actor,
            payload,
            WorkItemAction::Complete,
            WorkItemState::Completed,
            "workItem.complete",
        )?;

        let workflow_id = item.workflow_id;
        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        let task_def = self.require_task(&def, &item.task_name)?;

        self.work_item_hook(
            txn,
            &def,
            task_def,
            &item,
            "workItem.onCompleted",
            payload.clone(),
            |acts, ctx, record| acts.on_completed(ctx, record),
            0,
        )?;
        self.notify_work_item_observer(txn, &def, workflow_id, task_def, &item, 0)?;
        self.evaluate_policy(txn, &def, workflow_id, task_def, 0)?;
        Ok(CommandOutcome::Applied)
    }

    fn handle_fail_work_item(
        &self,
        txn: &mut CommandTxn,
        work_item_id: Uuid,
        actor: &Actor,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let item = self.settle_work_item(
            txn,
            work_item_id,
            actor,
            payload,
            WorkItemAction::Fail,
            WorkItemState::Failed,
            "workItem.fail",
        )?;

        let workflow_id = item.workflow_id;
        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        let task_def = self.require_task(&def, &item.task_name)?;

        self.work_item_hook(
            txn,
            &def,
            task_def,
            &item,
            "workItem.onFailed",
            payload.clone(),
            |acts, ctx, record| acts.on_failed(ctx, record),
            0,
        )?;
        self.notify_work_item_observer(txn, &def, workflow_id, task_def, &item, 0)?;
        self.evaluate_policy(txn, &def, workflow_id, task_def, 0)?;
        Ok(CommandOutcome::Applied)
    }

    fn handle_cancel_work_item(
        &self,
        txn: &mut CommandTxn,
        work_item_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<CommandOutcome, EngineError> {
        let item = txn.work_item(work_item_id)?.clone();
        if item.state.is_terminal() {
            return Ok(CommandOutcome::Noop);
        }

        let workflow_id = item.workflow_id;
        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        let task_def = self.require_task(&def, &item.task_name)?;

        task_def
            .schemas()
            .validate(WorkItemAction::Cancel, payload)
            .map_err(EngineError::validation)?;
        txn.set_work_item_payload(work_item_id, WorkItemAction::Cancel, payload.clone())?;
        txn.set_work_item_state(work_item_id, WorkItemState::Canceled, "workItem.cancel")?;
        txn.reap_work_item_jobs(work_item_id);

        let item = txn.work_item(work_item_id)?.clone();
        self.work_item_hook(
            txn,
            &def,
            task_def,
            &item,
            "workItem.onCanceled",
            payload.clone(),
            |acts, ctx, record| acts.on_canceled(ctx, record),
            0,
        )?;
        self.notify_work_item_observer(txn, &def, workflow_id, task_def, &item, 0)?;
        // A canceled work item may settle the task, but never fails it.
        self.evaluate_policy(txn, &def, workflow_id, task_def, 0)?;
        Ok(CommandOutcome::Applied)
    }

    /// Shared validation and state write for complete/fail
    #[allow(clippy::too_many_arguments)]
    fn settle_work_item(
        &self,
        txn: &mut CommandTxn,
        work_item_id: Uuid,
        actor: &Actor,
        payload: &serde_json::Value,
        action: WorkItemAction,
        state: WorkItemState,
        operation: &str,
    ) -> Result<WorkItemRecord, EngineError> {
        let item = txn.work_item(work_item_id)?.clone();
        if item.state != WorkItemState::Started {
            return Err(EngineError::IllegalStateTransition {
                element: format!("workItem {work_item_id}"),
                from: item.state.to_string(),
                requested: state.to_string(),
            });
        }
        if !item.permits(actor) {
            return Err(EngineError::InvariantViolation(format!(
                "work item {work_item_id} is claimed by another participant"
            )));
        }

        let def = resolve_definition(self.registry, &txn.snap, item.workflow_id)?;
        let task_def = self.require_task(&def, &item.task_name)?;
        task_def
            .schemas()
            .validate(action, payload)
            .map_err(EngineError::validation)?;

        txn.set_work_item_payload(work_item_id, action, payload.clone())?;
        txn.set_work_item_state(work_item_id, state, operation)?;
        txn.reap_work_item_jobs(work_item_id);
        Ok(txn.work_item(work_item_id)?.clone())
    }

    // =========================================================================
    // Shared Lifecycle Machinery
    // =========================================================================

    pub(crate) fn require_task<'d>(
        &self,
        def: &'d WorkflowDefinition,
        name: &str,
    ) -> Result<&'d TaskDef, EngineError> {
        def.task(name).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "task {name} does not exist in definition {}",
                def.name()
            ))
        })
    }

    /// Create a workflow instance: records, start token, enablement wave,
    /// then the initialize/start activities — in exactly that order
    pub(crate) fn instantiate_workflow(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        parent: Option<crate::model::ParentRef>,
        payload: &serde_json::Value,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let root_id = txn.snap.root_id;
        let now = Utc::now();
        let record = match parent {
            None => WorkflowRecord::new_root(workflow_id, def.name(), def.version(), now),
            Some(parent) => WorkflowRecord::new_child(
                workflow_id,
                root_id,
                def.name(),
                def.version(),
                parent,
                now,
            ),
        };
        txn.insert_workflow(record);

        for condition in def.conditions() {
            txn.insert_condition(workflow_id, condition);
        }
        for task in def.tasks() {
            txn.insert_task(workflow_id, task.name());
        }

        txn.increment_condition(workflow_id, def.start_condition(), 1)?;

        // Tasks enabled by the start token fire onEnabled before the
        // workflow's own onInitialized. Definitions rely on this to seed
        // their first work items.
        self.propagate_marking_changes(
            txn,
            def,
            workflow_id,
            &[def.start_condition().to_string()],
            depth + 1,
        )?;

        self.workflow_hook(
            txn,
            def,
            workflow_id,
            "workflow.onInitialized",
            payload.clone(),
            |acts, ctx| acts.on_initialized(ctx),
            depth,
        )?;

        txn.set_workflow_state(workflow_id, WorkflowState::Started, "workflow.start")?;
        self.workflow_hook(
            txn,
            def,
            workflow_id,
            "workflow.onStarted",
            payload.clone(),
            |acts, ctx| acts.on_started(ctx),
            depth,
        )?;

        Ok(())
    }

    /// Re-evaluate enabling of every task depending on changed conditions
    pub(crate) fn propagate_marking_changes(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        changed: &[String],
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let affected: Vec<String> = enabling::affected_tasks(def, changed)
            .into_iter()
            .map(|t| t.name().to_string())
            .collect();

        for name in affected {
            let task_def = self.require_task(def, &name)?;
            let state = txn.task(workflow_id, &name)?.state;
            let satisfied = enabling::is_join_satisfied(&txn.snap, def, workflow_id, task_def);

            match (state, satisfied) {
                (TaskState::Disabled, true) => {
                    self.enable_task(txn, def, workflow_id, task_def, depth)?;
                }
                (TaskState::Enabled, false) => {
                    self.disable_task(txn, def, workflow_id, task_def, depth)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn enable_task(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        let generation =
            txn.bump_generation(workflow_id, task.name(), task.stats_shards)?;
        txn.set_task_state(workflow_id, task.name(), TaskState::Enabled)?;
        debug!(%workflow_id, task = task.name(), generation, "task enabled");

        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            generation,
            "task.onEnabled",
            |acts, ctx| acts.on_enabled(ctx),
            depth,
        )?;

        if let TaskKind::Composite { child } = task.kind() {
            let child = child.clone();
            self.initialize_child_workflow(
                txn,
                workflow_id,
                task,
                generation,
                &child,
                &serde_json::Value::Null,
                depth + 1,
            )?;
        }
        Ok(())
    }

    fn disable_task(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        let generation = txn.task(workflow_id, task.name())?.generation;

        // Withdraw the offers of this cycle.
        let pending: Vec<Uuid> = txn
            .snap
            .work_items_of(workflow_id, task.name(), generation)
            .into_iter()
            .filter(|i| i.state == WorkItemState::Initialized)
            .map(|i| i.id)
            .collect();
        for item_id in pending {
            self.cancel_work_item_internal(txn, def, workflow_id, task, item_id, true, depth)?;
        }

        txn.set_task_state(workflow_id, task.name(), TaskState::Disabled)?;
        debug!(%workflow_id, task = task.name(), generation, "task disabled");

        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            generation,
            "task.onDisabled",
            |acts, ctx| acts.on_disabled(ctx),
            depth,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn initialize_work_item_internal(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        payload: &serde_json::Value,
        offer: Option<Offer>,
        explicit_id: Option<Uuid>,
        depth: u32,
    ) -> Result<Uuid, EngineError> {
        let record = txn.task(workflow_id, task.name())?.clone();
        if record.state != TaskState::Enabled {
            return Err(EngineError::NotEnabled {
                workflow_id,
                task: task.name().to_string(),
            });
        }

        task.schemas()
            .validate(WorkItemAction::Initialize, payload)
            .map_err(EngineError::validation)?;

        let now = Utc::now();
        let id = explicit_id.unwrap_or_else(Uuid::now_v7);
        txn.insert_work_item(WorkItemRecord {
            id,
            workflow_id,
            task_name: task.name().to_string(),
            task_generation: record.generation,
            state: WorkItemState::Initialized,
            payload: PayloadEnvelope {
                initialize: payload.clone(),
                ..PayloadEnvelope::default()
            },
            offer,
            claim: None,
            created_at: now,
            updated_at: now,
        })?;

        let item = txn.work_item(id)?.clone();
        self.work_item_hook(
            txn,
            def,
            task,
            &item,
            "workItem.onInitialized",
            payload.clone(),
            |acts, ctx, record| acts.on_initialized(ctx, record),
            depth,
        )?;
        self.notify_work_item_observer(txn, def, workflow_id, task, &item, depth)?;
        Ok(id)
    }

    /// Consult the completion policy after a work item settled
    fn evaluate_policy(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        let record = txn.task(workflow_id, task.name())?.clone();
        if !record.state.is_active() {
            return Ok(());
        }

        let totals = txn.totals(workflow_id, task.name(), record.generation);
        match task.policy.evaluate(&totals) {
            super::policy::PolicyDecision::Complete => {
                self.complete_task(txn, def, workflow_id, task, depth)
            }
            super::policy::PolicyDecision::Fail => {
                debug!(%workflow_id, task = task.name(), "completion policy failed the task");
                self.fail_task(txn, def, workflow_id, task, depth)
            }
            super::policy::PolicyDecision::Continue => Ok(()),
        }
    }

    /// Complete a task: route, clear its cancellation region, produce
    /// tokens, cascade
    pub(crate) fn complete_task(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let record = txn.task(workflow_id, task.name())?.clone();
        if record.state.is_terminal() {
            return Ok(());
        }

        // Routing runs before any completion mutation so an error can fail
        // the transition instead of leaving tokens half-produced.
        let targets = match firing::plan_outputs(txn, workflow_id, task) {
            Ok(targets) => targets,
            Err(e) => {
                warn!(%workflow_id, task = task.name(), error = %e, "routing failed, failing task");
                return self.fail_task(txn, def, workflow_id, task, depth);
            }
        };

        txn.set_task_state(workflow_id, task.name(), TaskState::Completed)?;
        txn.reap_task_jobs(workflow_id, task.name(), record.generation);

        let mut changed = self.apply_region(txn, def, workflow_id, task, depth)?;
        firing::produce_outputs(txn, workflow_id, &targets)?;

        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            record.generation,
            "task.onCompleted",
            |acts, ctx| acts.on_completed(ctx),
            depth,
        )?;

        for target in targets {
            if !changed.contains(&target) {
                changed.push(target);
            }
        }
        self.propagate_marking_changes(txn, def, workflow_id, &changed, depth + 1)?;
        self.maybe_complete_workflow(txn, def, workflow_id, depth)?;
        Ok(())
    }

    /// Fail a task and, per the default contract, its workflow
    pub(crate) fn fail_task(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let record = txn.task(workflow_id, task.name())?.clone();
        if record.state.is_terminal() {
            return Ok(());
        }

        // Outstanding work of the failed cycle is withdrawn.
        let pending: Vec<Uuid> = txn
            .snap
            .work_items_of(workflow_id, task.name(), record.generation)
            .into_iter()
            .filter(|i| !i.state.is_terminal())
            .map(|i| i.id)
            .collect();
        for item_id in pending {
            self.cancel_work_item_internal(txn, def, workflow_id, task, item_id, false, depth)?;
        }

        txn.set_task_state(workflow_id, task.name(), TaskState::Failed)?;
        txn.reap_task_jobs(workflow_id, task.name(), record.generation);
        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            record.generation,
            "task.onFailed",
            |acts, ctx| acts.on_failed(ctx),
            depth,
        )?;

        self.fail_workflow(txn, def, workflow_id, depth)
    }

    fn fail_workflow(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        depth: u32,
    ) -> Result<(), EngineError> {
        let record = txn.workflow(workflow_id)?.clone();
        if record.state.is_terminal() {
            return Ok(());
        }

        txn.set_workflow_state(workflow_id, WorkflowState::Failed, "workflow.fail")?;
        txn.reap_workflow_jobs(workflow_id);
        self.workflow_hook(
            txn,
            def,
            workflow_id,
            "workflow.onFailed",
            serde_json::Value::Null,
            |acts, ctx| acts.on_failed(ctx),
            depth,
        )?;

        if record.parent.is_some() {
            self.mirror_child_transition(txn, workflow_id, depth + 1)?;
        }
        Ok(())
    }

    /// Complete the workflow when its end condition is marked and the net
    /// is quiescent
    pub(crate) fn maybe_complete_workflow(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        depth: u32,
    ) -> Result<(), EngineError> {
        let record = txn.workflow(workflow_id)?.clone();
        if record.state != WorkflowState::Started {
            return Ok(());
        }

        if txn.marking(workflow_id, def.end_condition())? == 0 {
            return Ok(());
        }
        let any_active = def.tasks().iter().any(|t| {
            txn.snap
                .task(workflow_id, t.name())
                .is_some_and(|r| r.state.is_active())
        });
        if any_active {
            return Ok(());
        }

        info!(%workflow_id, "workflow completed");
        txn.set_workflow_state(workflow_id, WorkflowState::Completed, "workflow.complete")?;
        txn.reap_workflow_jobs(workflow_id);
        self.workflow_hook(
            txn,
            def,
            workflow_id,
            "workflow.onCompleted",
            serde_json::Value::Null,
            |acts, ctx| acts.on_completed(ctx),
            depth,
        )?;

        if record.parent.is_some() {
            self.mirror_child_transition(txn, workflow_id, depth + 1)?;
        }
        Ok(())
    }

    // =========================================================================
    // Hook Plumbing
    // =========================================================================

    pub(crate) fn workflow_hook<F>(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        hook: &str,
        payload: serde_json::Value,
        f: F,
        depth: u32,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(
            &dyn crate::activity::WorkflowActivities,
            &mut ActivityContext,
        ) -> Result<(), ActivityError>,
    {
        let (root_id, flags) = {
            let record = txn.workflow(workflow_id)?;
            (record.root_id, record.flags.clone())
        };
        txn.record_activity(workflow_id, hook);

        let mut ctx = ActivityContext::for_workflow(workflow_id, root_id)
            .with_flags(flags)
            .with_payload(payload);
        let requests = run_hook(hook, &mut ctx, |ctx| f(def.activities.as_ref(), ctx))?;
        self.apply_requests(txn, def, workflow_id, None, None, requests, depth)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn task_hook<F>(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        generation: u32,
        hook: &str,
        f: F,
        depth: u32,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(
            &dyn crate::activity::TaskActivities,
            &mut ActivityContext,
        ) -> Result<(), ActivityError>,
    {
        let (root_id, flags) = {
            let record = txn.workflow(workflow_id)?;
            (record.root_id, record.flags.clone())
        };
        txn.record_activity(workflow_id, hook);

        let mut ctx = ActivityContext::for_task(workflow_id, root_id, task.name(), generation)
            .with_flags(flags);
        let requests = run_hook(hook, &mut ctx, |ctx| f(task.activities.as_ref(), ctx))?;
        self.apply_requests(
            txn,
            def,
            workflow_id,
            Some((task, generation)),
            None,
            requests,
            depth,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn work_item_hook<F>(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        task: &TaskDef,
        item: &WorkItemRecord,
        hook: &str,
        payload: serde_json::Value,
        f: F,
        depth: u32,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(
            &dyn crate::activity::WorkItemActivities,
            &mut ActivityContext,
            &WorkItemRecord,
        ) -> Result<(), ActivityError>,
    {
        let workflow_id = item.workflow_id;
        let (root_id, flags) = {
            let record = txn.workflow(workflow_id)?;
            (record.root_id, record.flags.clone())
        };
        txn.record_activity(workflow_id, hook);

        let mut ctx = ActivityContext::for_work_item(
            workflow_id,
            root_id,
            task.name(),
            item.task_generation,
            item.id,
        )
        .with_flags(flags)
        .with_payload(payload);
        let requests = run_hook(hook, &mut ctx, |ctx| {
            f(task.work_item_activities.as_ref(), ctx, item)
        })?;
        self.apply_requests(
            txn,
            def,
            workflow_id,
            Some((task, item.task_generation)),
            Some(item.id),
            requests,
            depth,
        )
    }

    /// Fire `task.onWorkItemStateChanged` right after the state it observes
    pub(crate) fn notify_work_item_observer(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        item: &WorkItemRecord,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            item.task_generation,
            "task.onWorkItemStateChanged",
            |acts, ctx| acts.on_work_item_state_changed(ctx, item),
            depth,
        )
    }

    /// Apply requests an activity enqueued, in order, inside the same
    /// transaction
    #[allow(clippy::too_many_arguments)]
    fn apply_requests(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: Option<(&TaskDef, u32)>,
        work_item: Option<Uuid>,
        requests: Vec<ActivityRequest>,
        depth: u32,
    ) -> Result<(), EngineError> {
        for request in requests {
            match request {
                ActivityRequest::InitializeWorkItem { payload, offer } => {
                    let (task_def, _) = task.ok_or_else(|| {
                        EngineError::InvariantViolation(
                            "initialize_work_item is only available to task-level hooks"
                                .to_string(),
                        )
                    })?;
                    self.initialize_work_item_internal(
                        txn,
                        def,
                        workflow_id,
                        task_def,
                        &payload,
                        offer,
                        None,
                        depth + 1,
                    )?;
                }

                ActivityRequest::InitializeChild {
                    definition,
                    payload,
                } => {
                    let (task_def, generation) = task.ok_or_else(|| {
                        EngineError::InvariantViolation(
                            "initialize_child is only available to task-level hooks".to_string(),
                        )
                    })?;
                    if !matches!(task_def.kind(), TaskKind::Dynamic { .. }) {
                        return Err(EngineError::InvariantViolation(format!(
                            "task {} is not a dynamic composite",
                            task_def.name()
                        )));
                    }
                    let child_def = task_def
                        .kind()
                        .child_named(&definition)
                        .ok_or_else(|| EngineError::UnknownDefinition {
                            name: definition.clone(),
                            version: def.version().to_string(),
                        })?
                        .clone();
                    self.initialize_child_workflow(
                        txn,
                        workflow_id,
                        task_def,
                        generation,
                        &child_def,
                        &payload,
                        depth + 1,
                    )?;
                }

                ActivityRequest::Schedule {
                    job_id,
                    delay,
                    command,
                } => {
                    let key = match (work_item, task) {
                        (Some(work_item_id), _) => ScheduledKey::WorkItem { work_item_id },
                        (None, Some((task_def, generation))) => ScheduledKey::Task {
                            workflow_id,
                            task: task_def.name().to_string(),
                            generation,
                        },
                        (None, None) => ScheduledKey::Workflow { workflow_id },
                    };
                    txn.register_scheduled(key, workflow_id, job_id, delay, command);
                }

                ActivityRequest::CancelScheduled { job_id } => {
                    txn.cancel_scheduled(job_id);
                }

                ActivityRequest::SetFlag { key, value } => {
                    txn.set_flag(workflow_id, key, value)?;
                }
            }
        }
        Ok(())
    }
}
