//! Document lifecycle engine
//!
//! Drives a document through its state machine, invoking hooks at each
//! stage, enforcing the permission layers, and persisting only after every
//! pre-persist hook has passed.
//!
//! # Atomicity
//!
//! Hooks mutate a working copy of the document. A failure at any pre-persist
//! stage aborts the transition and nothing reaches the store, so the
//! persisted fields stay byte-identical to their pre-transition values.
//! Post-persist stages (`after_insert`, `on_update`, `on_submit`) are
//! notification points: they observe the stored document, field changes made
//! there are discarded, and a failure surfaces without unwinding the
//! persisted transition. `on_cancel` is the exception: it runs *before* the
//! cancelled status is persisted, and any failure there is a fatal
//! consistency fault that leaves the document in its prior status.
//!
//! # Concurrency
//!
//! Transitions on distinct instances run in parallel. Transitions on the
//! same instance are serialized by a per-instance async lock; a hook that
//! tries to transition the instance it is already transitioning is rejected
//! rather than deadlocked.

use crate::base::AutonameBase;
use crate::config::EngineConfig;
use crate::error::EngineError;
use dashmap::DashMap;
use docflow_cache::RecordCache;
use docflow_hooks::{BaseStage, HookContext, HookRegistry, NoopBase, Stage};
use docflow_jobs::{JobQueue, JobRequest, Ticket};
use docflow_perm::{Actor, Operation, PermissionEvaluator};
use docflow_store::{DocStatus, Document, EntityId, EntityType, Filter, RecordStore};
use std::sync::Arc;
use tokio::sync::Mutex;

type InstanceKey = (EntityType, EntityId);

/// Builder for [`LifecycleEngine`]
pub struct EngineBuilder {
    store: Arc<dyn RecordStore>,
    evaluator: Arc<PermissionEvaluator>,
    registry: Arc<HookRegistry>,
    jobs: Option<Arc<JobQueue>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// With a hook registry (defaults to empty)
    #[must_use]
    pub fn registry(mut self, registry: Arc<HookRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// With a job queue for deferred work
    #[must_use]
    pub fn jobs(mut self, jobs: Arc<JobQueue>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// With engine configuration
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine
    #[must_use]
    pub fn build(self) -> Arc<LifecycleEngine> {
        let record_cache = RecordCache::new(
            self.config.record_cache_capacity,
            self.config.record_cache_ttl,
        );
        Arc::new(LifecycleEngine {
            store: self.store,
            evaluator: self.evaluator,
            registry: self.registry,
            jobs: self.jobs,
            record_cache,
            config: self.config,
            locks: DashMap::new(),
            holders: DashMap::new(),
        })
    }
}

/// The document lifecycle engine
pub struct LifecycleEngine {
    store: Arc<dyn RecordStore>,
    evaluator: Arc<PermissionEvaluator>,
    registry: Arc<HookRegistry>,
    jobs: Option<Arc<JobQueue>>,
    record_cache: RecordCache,
    config: EngineConfig,
    locks: DashMap<InstanceKey, Arc<Mutex<()>>>,
    holders: DashMap<InstanceKey, tokio::task::Id>,
}

/// Per-instance exclusive section
///
/// Dropping the guard releases the lock, clears the holder marker used for
/// reentrancy detection, and retires the lock entry itself when no other
/// task holds a clone, so the lock map does not grow with every instance
/// ever transitioned.
struct InstanceGuard<'a> {
    engine: &'a LifecycleEngine,
    key: InstanceKey,
    lock: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        self.engine.holders.remove(&self.key);
        // Release the mutex before retiring the map entry; a waiter holds
        // its own clone of the Arc, which keeps the entry alive
        drop(self.lock.take());
        self.engine
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl LifecycleEngine {
    /// Start building an engine over a store and a permission evaluator
    #[must_use]
    pub fn builder(store: Arc<dyn RecordStore>, evaluator: Arc<PermissionEvaluator>) -> EngineBuilder {
        EngineBuilder {
            store,
            evaluator,
            registry: Arc::new(HookRegistry::empty()),
            jobs: None,
            config: EngineConfig::default(),
        }
    }

    /// The record store the engine persists to
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Insert a new document: `New → Draft`
    ///
    /// Stage order: `before_insert → autoname → before_validate → validate →
    /// before_save → persist → after_insert`.
    ///
    /// # Errors
    /// Permission, validation, naming exhaustion, or store failures; nothing
    /// is persisted on a pre-persist failure.
    pub async fn insert(&self, actor: &Actor, doc: Document) -> Result<Document, EngineError> {
        if doc.status != DocStatus::New {
            return Err(EngineError::IllegalTransition {
                from: doc.status,
                to: DocStatus::Draft,
            });
        }
        self.evaluator
            .authorize(actor, &doc.entity_type, Operation::Write, Some(&doc.fields))?;

        let entity_type = doc.entity_type.clone();
        let mut ctx = HookContext::new(
            entity_type.clone(),
            Stage::BeforeInsert,
            None,
            DocStatus::New,
            actor.user.clone(),
            doc.fields,
        );
        self.run_stage(&mut ctx, Stage::BeforeInsert, &NoopBase).await?;

        let id = self.assign_name(&mut ctx).await?;
        let _guard = self.lock_instance(&entity_type, id).await?;

        self.run_stage(&mut ctx, Stage::BeforeValidate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::Validate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::BeforeSave, &NoopBase).await?;

        self.persist(&entity_type, &id, DocStatus::Draft, &ctx).await?;
        tracing::info!(entity_type = %entity_type, %id, "document inserted");

        let inserted = Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: DocStatus::Draft,
            fields: ctx.fields().clone(),
        };

        // Notification stage: the insert stands even if a hook here fails
        ctx.set_status(DocStatus::Draft);
        if let Err(err) = self.run_stage(&mut ctx, Stage::AfterInsert, &NoopBase).await {
            return Err(err.after_persist(inserted));
        }

        Ok(inserted)
    }

    /// Save changes to an existing draft
    ///
    /// Stage order: `before_validate → validate → before_save → persist →
    /// on_update`.
    ///
    /// # Errors
    /// The document must exist and still be a draft; permission and
    /// validation failures abort with nothing persisted.
    pub async fn save(&self, actor: &Actor, doc: Document) -> Result<Document, EngineError> {
        let Some(id) = doc.id else {
            return Err(EngineError::Validation(
                "document has no identifier; use insert for new documents".to_string(),
            ));
        };
        let entity_type = doc.entity_type.clone();
        let _guard = self.lock_instance(&entity_type, id).await?;

        let stored = self
            .store
            .get(&entity_type, &id, None)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.clone(),
                id,
            })?;
        if stored.status != DocStatus::Draft {
            return Err(EngineError::Validation(format!(
                "only drafts can be modified; document is {}",
                stored.status
            )));
        }
        self.evaluator
            .authorize(actor, &entity_type, Operation::Write, Some(&doc.fields))?;

        let mut ctx = HookContext::new(
            entity_type.clone(),
            Stage::BeforeValidate,
            Some(id),
            DocStatus::Draft,
            actor.user.clone(),
            doc.fields,
        );
        self.run_stage(&mut ctx, Stage::BeforeValidate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::Validate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::BeforeSave, &NoopBase).await?;

        self.persist(&entity_type, &id, DocStatus::Draft, &ctx).await?;
        tracing::info!(entity_type = %entity_type, %id, "document saved");

        let saved = Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: DocStatus::Draft,
            fields: ctx.fields().clone(),
        };

        if let Err(err) = self.run_stage(&mut ctx, Stage::OnUpdate, &NoopBase).await {
            return Err(err.after_persist(saved));
        }
        Ok(saved)
    }

    /// Submit a draft: `Draft → Submitted`
    ///
    /// Stage order: `before_validate → validate → before_submit → persist →
    /// on_submit`.
    ///
    /// # Errors
    /// Illegal transitions, permission and validation failures abort with
    /// nothing persisted.
    pub async fn submit(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Result<Document, EngineError> {
        let _guard = self.lock_instance(entity_type, id).await?;

        let stored = self
            .store
            .get(entity_type, &id, None)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.clone(),
                id,
            })?;
        if !stored.status.can_transition(DocStatus::Submitted) {
            return Err(EngineError::IllegalTransition {
                from: stored.status,
                to: DocStatus::Submitted,
            });
        }
        self.evaluator
            .authorize(actor, entity_type, Operation::Submit, Some(&stored.fields))?;

        let mut ctx = HookContext::new(
            entity_type.clone(),
            Stage::BeforeValidate,
            Some(id),
            stored.status,
            actor.user.clone(),
            stored.fields,
        );
        self.run_stage(&mut ctx, Stage::BeforeValidate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::Validate, &NoopBase).await?;
        self.run_stage(&mut ctx, Stage::BeforeSubmit, &NoopBase).await?;

        self.persist(entity_type, &id, DocStatus::Submitted, &ctx).await?;
        tracing::info!(entity_type = %entity_type, %id, "document submitted");

        let submitted = Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: DocStatus::Submitted,
            fields: ctx.fields().clone(),
        };

        ctx.set_status(DocStatus::Submitted);
        if let Err(err) = self.run_stage(&mut ctx, Stage::OnSubmit, &NoopBase).await {
            return Err(err.after_persist(submitted));
        }
        Ok(submitted)
    }

    /// Cancel a draft or submitted document: `→ Cancelled`
    ///
    /// Cleanup/reversal hooks run *before* the cancelled status is
    /// persisted. If any of them fails the document keeps its prior status
    /// and the failure is escalated as a consistency fault: logged, never
    /// retried automatically.
    ///
    /// # Errors
    /// [`EngineError::Consistency`] when a cleanup hook fails; permission
    /// and transition errors as usual.
    pub async fn cancel(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Result<Document, EngineError> {
        let _guard = self.lock_instance(entity_type, id).await?;

        let stored = self
            .store
            .get(entity_type, &id, None)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.clone(),
                id,
            })?;
        if !stored.status.can_transition(DocStatus::Cancelled) {
            return Err(EngineError::IllegalTransition {
                from: stored.status,
                to: DocStatus::Cancelled,
            });
        }
        self.evaluator
            .authorize(actor, entity_type, Operation::Cancel, Some(&stored.fields))?;

        let mut ctx = HookContext::new(
            entity_type.clone(),
            Stage::OnCancel,
            Some(id),
            stored.status,
            actor.user.clone(),
            stored.fields,
        );
        if let Err(fault) = self.run_stage(&mut ctx, Stage::OnCancel, &NoopBase).await {
            tracing::error!(
                entity_type = %entity_type,
                %id,
                error = %fault,
                "cancellation cleanup failed; document keeps its prior status"
            );
            return Err(fault);
        }

        self.persist(entity_type, &id, DocStatus::Cancelled, &ctx).await?;
        tracing::info!(entity_type = %entity_type, %id, "document cancelled");

        Ok(Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: DocStatus::Cancelled,
            fields: ctx.fields().clone(),
        })
    }

    /// Load a document, enforcing the read permission layers
    ///
    /// # Errors
    /// [`EngineError::NotFound`] or [`EngineError::Permission`].
    pub async fn load(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Result<Document, EngineError> {
        let stored = self
            .store
            .get(entity_type, &id, None)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.clone(),
                id,
            })?;
        self.evaluator
            .authorize(actor, entity_type, Operation::Read, Some(&stored.fields))?;
        Ok(Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: stored.status,
            fields: stored.fields,
        })
    }

    /// Load a read-mostly document through the record cache
    ///
    /// Intended for singleton configuration records; every write the engine
    /// persists invalidates the cached copy, and the cache TTL is a
    /// backstop for out-of-band writes.
    ///
    /// # Errors
    /// Same as [`load`](Self::load).
    pub async fn load_cached(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Result<Document, EngineError> {
        let stored = self
            .record_cache
            .get_or_load(self.store.as_ref(), entity_type, &id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity_type: entity_type.clone(),
                id,
            })?;
        self.evaluator
            .authorize(actor, entity_type, Operation::Read, Some(&stored.fields))?;
        Ok(Document {
            entity_type: entity_type.clone(),
            id: Some(id),
            status: stored.status,
            fields: stored.fields.clone(),
        })
    }

    /// List documents matching the filters, read-gated per row
    ///
    /// The role layer is applied once up front; each row is then authorized
    /// with its instance and denied rows are dropped from the result rather
    /// than failing the whole listing.
    ///
    /// # Errors
    /// [`EngineError::Permission`] when the actor fails the role layer.
    pub async fn list(
        &self,
        actor: &Actor,
        entity_type: &EntityType,
        filters: &[Filter],
    ) -> Result<Vec<Document>, EngineError> {
        self.evaluator
            .authorize(actor, entity_type, Operation::Read, None)?;

        let rows = self.store.list(entity_type, filters).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (id, stored) in rows {
            if self
                .evaluator
                .authorize(actor, entity_type, Operation::Read, Some(&stored.fields))
                .is_ok()
            {
                out.push(Document {
                    entity_type: entity_type.clone(),
                    id: Some(id),
                    status: stored.status,
                    fields: stored.fields,
                });
            }
        }
        Ok(out)
    }

    /// Submit deferred work to the configured job queue
    ///
    /// Returns immediately with a ticket; execution is asynchronous with
    /// respect to the calling transition.
    ///
    /// # Errors
    /// [`EngineError::JobsUnavailable`] when no queue is configured, or the
    /// queue's own submission errors.
    pub async fn enqueue(&self, request: JobRequest) -> Result<Ticket, EngineError> {
        let jobs = self.jobs.as_ref().ok_or(EngineError::JobsUnavailable)?;
        Ok(jobs.enqueue(request).await?)
    }

    /// The configured job queue, if any
    #[inline]
    #[must_use]
    pub fn jobs(&self) -> Option<&Arc<JobQueue>> {
        self.jobs.as_ref()
    }

    async fn assign_name(&self, ctx: &mut HookContext) -> Result<EntityId, EngineError> {
        let max_attempts = self.config.autoname_max_attempts;
        for attempt in 1..=max_attempts {
            self.run_stage(ctx, Stage::Autoname, &AutonameBase).await?;
            let Some(candidate) = ctx.id() else {
                // An override cleared the id without assigning one
                return Err(EngineError::NamingExhausted { attempts: attempt });
            };
            if !self.store.exists(ctx.entity_type(), &candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!(
                entity_type = %ctx.entity_type(),
                id = %candidate,
                attempt,
                "autoname collision, retrying"
            );
            ctx.clear_id();
        }
        Err(EngineError::NamingExhausted {
            attempts: max_attempts,
        })
    }

    async fn run_stage(
        &self,
        ctx: &mut HookContext,
        stage: Stage,
        base: &dyn BaseStage,
    ) -> Result<(), EngineError> {
        ctx.set_stage(stage);
        let Some(resolved) = self.registry.resolve(ctx.entity_type(), stage) else {
            return base
                .call(ctx)
                .await
                .map_err(|e| EngineError::from_hook(stage, "base", e));
        };

        // Deterministic order: the override (with its base call) runs first,
        // then event hooks in registration order, fail-fast
        if let Some(override_hook) = resolved.override_hook() {
            tracing::debug!(stage = %stage, hook = override_hook.name(), "running stage override");
            override_hook
                .run(ctx, base)
                .await
                .map_err(|e| EngineError::from_hook(stage, override_hook.name(), e))?;
        } else {
            base.call(ctx)
                .await
                .map_err(|e| EngineError::from_hook(stage, "base", e))?;
        }
        for hook in resolved.hooks() {
            tracing::debug!(stage = %stage, hook = hook.name(), "running hook");
            hook.run(ctx)
                .await
                .map_err(|e| EngineError::from_hook(stage, hook.name(), e))?;
        }
        Ok(())
    }

    async fn persist(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
        status: DocStatus,
        ctx: &HookContext,
    ) -> Result<(), EngineError> {
        self.store.set(entity_type, id, status, ctx.fields()).await?;
        // Keep cached reads in step with every write the engine makes
        self.record_cache.invalidate(entity_type, id).await;
        Ok(())
    }

    async fn lock_instance<'a>(
        &'a self,
        entity_type: &EntityType,
        id: EntityId,
    ) -> Result<InstanceGuard<'a>, EngineError> {
        let key = (entity_type.clone(), id);
        if let Some(task_id) = tokio::task::try_id() {
            if self.holders.get(&key).is_some_and(|holder| *holder == task_id) {
                return Err(EngineError::ReentrantTransition {
                    entity_type: entity_type.clone(),
                    id,
                });
            }
        }
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let lock = mutex.lock_owned().await;
        if let Some(task_id) = tokio::task::try_id() {
            self.holders.insert(key.clone(), task_id);
        }
        Ok(InstanceGuard {
            engine: self,
            key,
            lock: Some(lock),
        })
    }
}
