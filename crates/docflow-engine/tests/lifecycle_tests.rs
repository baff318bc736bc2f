//! End-to-end lifecycle tests: transitions, hooks, permissions, deferral

use async_trait::async_trait;
use docflow_engine::{EngineConfig, EngineError, LifecycleEngine};
use docflow_hooks::{
    BaseStage, FnHook, HookContext, HookError, HookRegistry, RegistryBuilder, Stage, StageOverride,
};
use docflow_jobs::{JobContext, JobHandler, JobQueue, JobRequest, JobStatus, QueueConfig};
use docflow_perm::{Actor, Operation, OwnerOnly, PermissionEvaluator, PermissionRule};
use docflow_store::{DocStatus, Document, EntityId, EntityType, MemoryStore, Record, RecordStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Trace = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tracing_hook(trace: &Trace, label: &str) -> Arc<FnHook> {
    let trace = Arc::clone(trace);
    let label = label.to_string();
    FnHook::new(label.clone(), move |_ctx| {
        trace.lock().unwrap().push(label.clone());
        Ok(())
    })
}

/// Evaluator allowing every operation on `entity` for any actor
fn open_evaluator(entity: &str) -> Arc<PermissionEvaluator> {
    Arc::new(
        PermissionEvaluator::builder()
            .rule(PermissionRule::new(entity, Operation::Read))
            .rule(PermissionRule::new(entity, Operation::Write))
            .rule(PermissionRule::new(entity, Operation::Submit))
            .rule(PermissionRule::new(entity, Operation::Cancel))
            .build(),
    )
}

fn engine_with(registry: HookRegistry, evaluator: Arc<PermissionEvaluator>) -> Arc<LifecycleEngine> {
    LifecycleEngine::builder(Arc::new(MemoryStore::new()), evaluator)
        .registry(Arc::new(registry))
        .build()
}

async fn stored_status(engine: &LifecycleEngine, entity: &EntityType, id: EntityId) -> DocStatus {
    engine
        .store()
        .get(entity, &id, None)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn insert_runs_stages_in_order_and_persists_a_draft() {
    init_tracing();
    let trace: Trace = Arc::default();
    let mut builder = RegistryBuilder::new();
    for stage in [
        Stage::BeforeInsert,
        Stage::BeforeValidate,
        Stage::Validate,
        Stage::BeforeSave,
        Stage::AfterInsert,
    ] {
        builder.register("order", stage, tracing_hook(&trace, stage.as_str()), 0);
    }
    let engine = engine_with(builder.build(), open_evaluator("order"));

    let doc = Document::new("order").with_field("total", 250i64);
    let inserted = engine.insert(&Actor::new("alice"), doc).await.unwrap();

    assert_eq!(inserted.status, DocStatus::Draft);
    let id = inserted.id.unwrap();
    assert_eq!(
        *trace.lock().unwrap(),
        vec!["before_insert", "before_validate", "validate", "before_save", "after_insert"]
    );

    let entity = EntityType::new("order");
    let stored = engine.store().get(&entity, &id, None).await.unwrap().unwrap();
    assert_eq!(stored.status, DocStatus::Draft);
    assert_eq!(stored.fields.get("total").and_then(|v| v.as_int()), Some(250));
}

#[tokio::test]
async fn failed_validation_leaves_the_store_untouched() {
    let mut builder = RegistryBuilder::new();
    builder.register(
        "order",
        Stage::Validate,
        FnHook::new("require_total", |ctx| {
            if ctx.fields().contains("total") {
                Ok(())
            } else {
                Err(HookError::Validation("total is required".to_string()))
            }
        }),
        0,
    );
    let engine = engine_with(builder.build(), open_evaluator("order"));
    let actor = Actor::new("alice");
    let entity = EntityType::new("order");

    // Insert with no total: rejected, nothing persisted
    let err = engine.insert(&actor, Document::new("order")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(engine.store().list(&entity, &[]).await.unwrap().is_empty());

    // Save that drops the field: rejected, persisted fields unchanged
    let inserted = engine
        .insert(&actor, Document::new("order").with_field("total", 100i64))
        .await
        .unwrap();
    let id = inserted.id.unwrap();

    let mut bad = inserted.clone();
    bad.fields.remove("total");
    bad.fields.set("note", "oops");
    let err = engine.save(&actor, bad).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let stored = engine.store().get(&entity, &id, None).await.unwrap().unwrap();
    assert_eq!(stored.fields, inserted.fields);
}

#[tokio::test]
async fn permission_denial_happens_before_any_hook_or_write() {
    let trace: Trace = Arc::default();
    let mut builder = RegistryBuilder::new();
    builder.register("order", Stage::BeforeInsert, tracing_hook(&trace, "before_insert"), 0);

    let evaluator = Arc::new(
        PermissionEvaluator::builder()
            .rule(PermissionRule::new("order", Operation::Write).require_any_role(["sales_user"]))
            .build(),
    );
    let engine = engine_with(builder.build(), evaluator);

    let err = engine
        .insert(&Actor::new("intruder"), Document::new("order"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));
    assert!(trace.lock().unwrap().is_empty());
    assert!(engine
        .store()
        .list(&EntityType::new("order"), &[])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn hooks_run_sorted_by_order() {
    let trace: Trace = Arc::default();
    let mut builder = RegistryBuilder::new();
    builder
        .register("order", Stage::Validate, tracing_hook(&trace, "second"), 20)
        .register("order", Stage::Validate, tracing_hook(&trace, "first"), 10);
    let engine = engine_with(builder.build(), open_evaluator("order"));

    engine
        .insert(&Actor::new("alice"), Document::new("order"))
        .await
        .unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["first", "second"]);
}

struct TracingOverride {
    trace: Trace,
}

#[async_trait]
impl StageOverride for TracingOverride {
    fn name(&self) -> &str {
        "tracing_override"
    }

    async fn run(&self, ctx: &mut HookContext, base: &dyn BaseStage) -> Result<(), HookError> {
        self.trace.lock().unwrap().push("override".to_string());
        base.call(ctx).await
    }
}

#[tokio::test]
async fn stage_override_runs_before_event_hooks() {
    let trace: Trace = Arc::default();
    let mut builder = RegistryBuilder::new();
    builder
        .override_stage("order", Stage::Validate, Arc::new(TracingOverride { trace: Arc::clone(&trace) }))
        .unwrap();
    builder.register("order", Stage::Validate, tracing_hook(&trace, "event"), 0);
    let engine = engine_with(builder.build(), open_evaluator("order"));

    engine
        .insert(&Actor::new("alice"), Document::new("order"))
        .await
        .unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["override", "event"]);
}

struct CountingHandler {
    runs: Arc<Mutex<Vec<serde_json::Value>>>,
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<serde_json::Value> {
        self.runs.lock().unwrap().push(ctx.payload().clone());
        Ok(json!("sent"))
    }
}

struct Napper(Duration);

#[async_trait]
impl JobHandler for Napper {
    async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(self.0).await;
        Ok(serde_json::Value::Null)
    }
}

/// Hook that defers notification work to the job queue
struct DeferNotification {
    jobs: Arc<JobQueue>,
    tickets: Arc<Mutex<Vec<docflow_jobs::Ticket>>>,
}

#[async_trait]
impl docflow_hooks::Hook for DeferNotification {
    fn name(&self) -> &str {
        "defer_notification"
    }

    async fn run(&self, ctx: &mut HookContext) -> Result<(), HookError> {
        let request = JobRequest::new("notify", "short")
            .with_payload(json!({ "entity": ctx.entity_type().as_str() }))
            .submitted_by(ctx.actor_user());
        let ticket = self
            .jobs
            .enqueue(request)
            .await
            .map_err(|e| HookError::Failed(e.to_string()))?;
        self.tickets.lock().unwrap().push(ticket);
        Ok(())
    }
}

#[tokio::test]
async fn submit_runs_on_submit_once_and_defers_slow_work() {
    init_tracing();
    let runs = Arc::new(Mutex::new(Vec::new()));
    let jobs = JobQueue::builder()
        .queue(QueueConfig::short("short").with_workers(1))
        .handler("notify", Arc::new(CountingHandler { runs: Arc::clone(&runs) }))
        .handler("nap_50ms", Arc::new(Napper(Duration::from_millis(50))))
        .build();

    let trace: Trace = Arc::default();
    let tickets = Arc::new(Mutex::new(Vec::new()));
    let mut builder = RegistryBuilder::new();
    builder
        .register("order", Stage::OnSubmit, tracing_hook(&trace, "on_submit"), 0)
        .register(
            "order",
            Stage::OnSubmit,
            Arc::new(DeferNotification {
                jobs: Arc::clone(&jobs),
                tickets: Arc::clone(&tickets),
            }),
            10,
        );

    let engine = LifecycleEngine::builder(Arc::new(MemoryStore::new()), open_evaluator("order"))
        .registry(Arc::new(builder.build()))
        .jobs(Arc::clone(&jobs))
        .build();
    let actor = Actor::new("alice");
    let entity = EntityType::new("order");

    let inserted = engine.insert(&actor, Document::new("order")).await.unwrap();
    let id = inserted.id.unwrap();

    // Occupy the single worker so the deferred job cannot start yet
    jobs.enqueue(JobRequest::new("nap_50ms", "short")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let submitted = engine.submit(&actor, &entity, id).await.unwrap();

    assert_eq!(submitted.status, DocStatus::Submitted);
    assert_eq!(*trace.lock().unwrap(), vec!["on_submit"]);

    // The job is pending from the moment submit returns
    let ticket = tickets.lock().unwrap()[0];
    assert_eq!(jobs.status(ticket), Some(JobStatus::Pending));

    // And completes asynchronously
    for _ in 0..200 {
        if jobs.status(ticket) == Some(JobStatus::Done) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(jobs.status(ticket), Some(JobStatus::Done));
    assert_eq!(runs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failing_cancel_hook_keeps_the_document_submitted() {
    init_tracing();
    let mut builder = RegistryBuilder::new();
    builder.register(
        "order",
        Stage::OnCancel,
        FnHook::new("reverse_ledger", |_| {
            Err(HookError::Failed("ledger reversal unavailable".to_string()))
        }),
        0,
    );
    let engine = engine_with(builder.build(), open_evaluator("order"));
    let actor = Actor::new("alice");
    let entity = EntityType::new("order");

    let inserted = engine.insert(&actor, Document::new("order")).await.unwrap();
    let id = inserted.id.unwrap();
    engine.submit(&actor, &entity, id).await.unwrap();

    let err = engine.cancel(&actor, &entity, id).await.unwrap_err();
    assert!(err.is_consistency_fault());
    assert_eq!(stored_status(&engine, &entity, id).await, DocStatus::Submitted);

    // The document is still readable and still submitted
    let loaded = engine.load(&actor, &entity, id).await.unwrap();
    assert_eq!(loaded.status, DocStatus::Submitted);
}

#[tokio::test]
async fn cancel_moves_drafts_and_submitted_documents_to_cancelled() {
    let engine = engine_with(HookRegistry::empty(), open_evaluator("order"));
    let actor = Actor::new("alice");
    let entity = EntityType::new("order");

    let draft = engine.insert(&actor, Document::new("order")).await.unwrap();
    let draft_id = draft.id.unwrap();
    let cancelled = engine.cancel(&actor, &entity, draft_id).await.unwrap();
    assert_eq!(cancelled.status, DocStatus::Cancelled);
    assert_eq!(stored_status(&engine, &entity, draft_id).await, DocStatus::Cancelled);

    let other = engine.insert(&actor, Document::new("order")).await.unwrap();
    let other_id = other.id.unwrap();
    engine.submit(&actor, &entity, other_id).await.unwrap();
    engine.cancel(&actor, &entity, other_id).await.unwrap();
    assert_eq!(stored_status(&engine, &entity, other_id).await, DocStatus::Cancelled);
}

#[tokio::test]
async fn statuses_only_move_forward() {
    let engine = engine_with(HookRegistry::empty(), open_evaluator("order"));
    let actor = Actor::new("alice");
    let entity = EntityType::new("order");

    let inserted = engine.insert(&actor, Document::new("order")).await.unwrap();
    let id = inserted.id.unwrap();
    engine.submit(&actor, &entity, id).await.unwrap();

    // Submitting again is illegal
    let err = engine.submit(&actor, &entity, id).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));

    // Submitted documents cannot be edited
    let mut edit = inserted.clone();
    edit.fields.set("total", 1i64);
    let err = engine.save(&actor, edit).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // Cancelled is terminal
    engine.cancel(&actor, &entity, id).await.unwrap();
    let err = engine.cancel(&actor, &entity, id).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));

    // Only in-memory documents can be inserted
    let mut resubmit = Document::new("order");
    resubmit.status = DocStatus::Draft;
    let err = engine.insert(&actor, resubmit).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));
}

struct FixedName {
    id: EntityId,
}

#[async_trait]
impl StageOverride for FixedName {
    fn name(&self) -> &str {
        "fixed_name"
    }

    async fn run(&self, ctx: &mut HookContext, base: &dyn BaseStage) -> Result<(), HookError> {
        ctx.set_id(self.id);
        base.call(ctx).await
    }
}

#[tokio::test]
async fn autoname_collisions_exhaust_the_retry_budget() {
    let taken = EntityId::new();
    let mut builder = RegistryBuilder::new();
    builder
        .override_stage("order", Stage::Autoname, Arc::new(FixedName { id: taken }))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let entity = EntityType::new("order");
    store
        .set(&entity, &taken, DocStatus::Draft, &Record::new())
        .await
        .unwrap();

    let engine = LifecycleEngine::builder(store, open_evaluator("order"))
        .registry(Arc::new(builder.build()))
        .config(EngineConfig::new().with_autoname_max_attempts(3))
        .build();

    let err = engine
        .insert(&Actor::new("alice"), Document::new("order"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NamingExhausted { attempts: 3 }));
}

/// Hook that tries to transition the very instance being transitioned
struct NestedSubmit {
    engine: Arc<Mutex<Option<Arc<LifecycleEngine>>>>,
    observed: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl docflow_hooks::Hook for NestedSubmit {
    fn name(&self) -> &str {
        "nested_submit"
    }

    async fn run(&self, ctx: &mut HookContext) -> Result<(), HookError> {
        let engine = self.engine.lock().unwrap().clone().ok_or_else(|| {
            HookError::Failed("engine not wired".to_string())
        })?;
        let id = ctx
            .id()
            .ok_or_else(|| HookError::Failed("no id".to_string()))?;
        let actor = Actor::new(ctx.actor_user());
        let entity = ctx.entity_type().clone();
        let result = engine.submit(&actor, &entity, id).await;
        *self.observed.lock().unwrap() = Some(match result {
            Ok(_) => "succeeded".to_string(),
            Err(e) => e.to_string(),
        });
        Ok(())
    }
}

#[tokio::test]
async fn reentrant_transition_is_rejected_not_deadlocked() {
    let engine_slot = Arc::new(Mutex::new(None));
    let observed = Arc::new(Mutex::new(None));
    let mut builder = RegistryBuilder::new();
    builder.register(
        "order",
        Stage::BeforeSubmit,
        Arc::new(NestedSubmit {
            engine: Arc::clone(&engine_slot),
            observed: Arc::clone(&observed),
        }),
        0,
    );
    let engine = engine_with(builder.build(), open_evaluator("order"));
    *engine_slot.lock().unwrap() = Some(Arc::clone(&engine));

    let actor = Actor::new("alice");
    let entity = EntityType::new("order");
    let inserted = engine.insert(&actor, Document::new("order")).await.unwrap();
    let id = inserted.id.unwrap();

    // The outer submit completes; the inner one was refused
    engine.submit(&actor, &entity, id).await.unwrap();
    let inner = observed.lock().unwrap().clone().unwrap();
    assert!(inner.contains("re-entrant"), "inner outcome: {inner}");
}

#[tokio::test]
async fn cached_loads_observe_engine_writes() {
    let engine = engine_with(HookRegistry::empty(), open_evaluator("settings"));
    let actor = Actor::new("alice");
    let entity = EntityType::new("settings");

    let inserted = engine
        .insert(&actor, Document::new("settings").with_field("mode", "strict"))
        .await
        .unwrap();
    let id = inserted.id.unwrap();

    let first = engine.load_cached(&actor, &entity, id).await.unwrap();
    assert_eq!(first.fields.get("mode").and_then(|v| v.as_text()), Some("strict"));

    let mut edit = first;
    edit.fields.set("mode", "lax");
    engine.save(&actor, edit).await.unwrap();

    let second = engine.load_cached(&actor, &entity, id).await.unwrap();
    assert_eq!(second.fields.get("mode").and_then(|v| v.as_text()), Some("lax"));
}

#[tokio::test]
async fn list_drops_rows_the_actor_may_not_read() {
    let evaluator = Arc::new(
        PermissionEvaluator::builder()
            .rule(PermissionRule::new("note", Operation::Write))
            .rule(
                PermissionRule::new("note", Operation::Read)
                    .with_document_check(Arc::new(OwnerOnly::new("owner"))),
            )
            .build(),
    );
    let engine = engine_with(HookRegistry::empty(), evaluator);
    let entity = EntityType::new("note");

    engine
        .insert(&Actor::new("alice"), Document::new("note").with_field("owner", "alice"))
        .await
        .unwrap();
    engine
        .insert(&Actor::new("bob"), Document::new("note").with_field("owner", "bob"))
        .await
        .unwrap();

    let visible = engine.list(&Actor::new("alice"), &entity, &[]).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(
        visible[0].fields.get("owner").and_then(|v| v.as_text()),
        Some("alice")
    );

    let all = engine
        .list(&Actor::new("Administrator"), &entity, &[])
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn post_persist_failure_surfaces_without_unwinding_the_insert() {
    let mut builder = RegistryBuilder::new();
    builder.register(
        "order",
        Stage::AfterInsert,
        FnHook::new("notify", |_| {
            Err(HookError::Failed("notification channel down".to_string()))
        }),
        0,
    );
    let engine = engine_with(builder.build(), open_evaluator("order"));
    let entity = EntityType::new("order");

    let err = engine
        .insert(&Actor::new("alice"), Document::new("order"))
        .await
        .unwrap_err();

    // The insert itself stands, and the error hands back the persisted
    // document so the caller keeps the assigned identifier
    let rows = engine.store().list(&entity, &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.status, DocStatus::Draft);

    match err {
        EngineError::PostPersist { document, .. } => {
            assert_eq!(document.id, Some(rows[0].0));
            assert_eq!(document.status, DocStatus::Draft);
        }
        other => panic!("expected a post-persist failure, got {other}"),
    }
}

#[tokio::test]
async fn hooks_mutate_the_working_copy_before_persist() {
    let mut builder = RegistryBuilder::new();
    builder.register(
        "order",
        Stage::BeforeSave,
        FnHook::new("stamp_grand_total", |ctx| {
            let total = ctx.fields().get("total").and_then(|v| v.as_int()).unwrap_or(0);
            ctx.fields_mut().set("grand_total", total + 10);
            Ok(())
        }),
        0,
    );
    let engine = engine_with(builder.build(), open_evaluator("order"));
    let actor = Actor::new("alice");

    let inserted = engine
        .insert(&actor, Document::new("order").with_field("total", 90i64))
        .await
        .unwrap();

    assert_eq!(
        inserted.fields.get("grand_total").and_then(|v| v.as_int()),
        Some(100)
    );
    let entity = EntityType::new("order");
    let stored = engine
        .store()
        .get(&entity, &inserted.id.unwrap(), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields.get("grand_total").and_then(|v| v.as_int()), Some(100));
}
