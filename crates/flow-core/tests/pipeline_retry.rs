//! Reintentos de procesamiento y restricciones del pipeline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use flow_core::runner::{ContinuationState, FlowIoRequest, RunOutcome};
use flow_core::{async_trait, ExternalEventKind, ExternalEventOutcome, ExternalEventResponse, Flow, FlowCheckpoint, FlowConfig, FlowContext,
                FlowEngine, FlowError, FlowEvent, FlowEventPipeline, FlowProcessingError, FlowResumption, FlowRunner, FlowStatus,
                InMemoryCheckpointStore, OutboundRecord, PipelineContext, RunOrContinue, StartFlow, WaitingFor, WaitingForHandler,
                WaitingForKind, WaitingForRegistry};

/// Duerme `sleep_ms` y luego falla de forma transitoria las primeras
/// `failures` veces que llega al final.
struct FlakyFlow {
    sleep_ms: i64,
    failures: u32,
    attempts: Arc<AtomicU32>,
}

#[async_trait(?Send)]
impl Flow for FlakyFlow {
    fn flow_type(&self) -> &str {
        "flaky"
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        if self.sleep_ms > 0 {
            ctx.sleep(Duration::milliseconds(self.sleep_ms)).await?;
        }
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(FlowError::Transient("store busy".into()));
        }
        Ok(json!("done"))
    }
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000, 0).single().unwrap_or_default()
}

fn start(flow_id: Uuid) -> FlowEvent {
    FlowEvent::start(flow_id,
                     t0(),
                     StartFlow { owning_identity: "alice".into(),
                                 flow_type: "flaky".into(),
                                 arguments: json!(null),
                                 initiated_by: None })
}

fn engine(flow: FlakyFlow, config: FlowConfig) -> FlowEngine<InMemoryCheckpointStore> {
    FlowEngine::in_memory().flow(flow).config(config).build().expect("engine")
}

fn statuses(records: &[OutboundRecord]) -> Vec<FlowStatus> {
    records.iter()
           .filter_map(|r| match r {
               OutboundRecord::Status(st) => Some(st.status),
               _ => None,
           })
           .collect()
}

#[test]
fn transient_failure_on_start_is_retried_after_delay() {
    let attempts = Arc::new(AtomicU32::new(0));
    let flow = FlakyFlow { sleep_ms: 0,
                           failures: 1,
                           attempts: attempts.clone() };
    let mut engine = engine(flow, FlowConfig::default());
    let delay = engine.config().processing_retry_delay;
    let flow_id = Uuid::new_v4();

    let records = engine.process(&start(flow_id)).unwrap();
    assert_eq!(records.len(), 1, "sólo el Wakeup del reintento: {records:?}");
    assert!(matches!(&records[0], OutboundRecord::Wakeup(w) if w.at == t0() + delay));
    let cp = engine.checkpoint(flow_id).unwrap().expect("checkpoint");
    assert_eq!(cp.retry_count, 1);
    assert_eq!(cp.suspend_count, 0);

    // Antes de tiempo no pasa nada.
    let early = engine.process(&FlowEvent::wakeup(flow_id, t0() + delay / 2)).unwrap();
    assert!(early.is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let records = engine.process(&FlowEvent::wakeup(flow_id, t0() + delay)).unwrap();
    assert_eq!(statuses(&records), vec![FlowStatus::Running, FlowStatus::Completed]);
    assert!(engine.checkpoint(flow_id).unwrap().is_none());
}

#[test]
fn events_arriving_during_retry_are_queued_and_replayed() {
    let attempts = Arc::new(AtomicU32::new(0));
    let flow = FlakyFlow { sleep_ms: 10_000,
                           failures: 1,
                           attempts: attempts.clone() };
    let mut engine = engine(flow, FlowConfig::default());
    let delay = engine.config().processing_retry_delay;
    let flow_id = Uuid::new_v4();
    engine.process(&start(flow_id)).unwrap();

    let woke = t0() + Duration::seconds(10);
    engine.process(&FlowEvent::wakeup(flow_id, woke)).unwrap();
    let cp = engine.checkpoint(flow_id).unwrap().expect("checkpoint");
    assert!(matches!(cp.waiting_for, Some(WaitingFor::Wakeup { .. })), "rollback al checkpoint previo");
    assert_eq!(cp.pipeline_retry.as_ref().map(|r| r.events.len()), Some(1));

    let late = ExternalEventResponse { request_id: "old".into(),
                                       outcome: ExternalEventOutcome::Payload { payload: json!(1) } };
    let records = engine.process(&FlowEvent::external_response(flow_id, woke, late.clone()))
                        .unwrap();
    assert!(records.iter().all(|r| matches!(r, OutboundRecord::Wakeup(_))));
    let cp = engine.checkpoint(flow_id).unwrap().expect("checkpoint");
    assert_eq!(cp.pipeline_retry.as_ref().map(|r| r.events.len()), Some(2));

    // La misma entrega repetida no se encola dos veces.
    let queued = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&FlowEvent::external_response(flow_id, woke, late)).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), queued);
    // Tampoco el evento que falló.
    assert!(engine.process(&FlowEvent::wakeup(flow_id, woke)).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), queued);

    let records = engine.process(&FlowEvent::wakeup(flow_id, woke + delay)).unwrap();
    assert_eq!(statuses(&records), vec![FlowStatus::Completed]);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn processing_retries_are_bounded() {
    let flow = FlakyFlow { sleep_ms: 0,
                           failures: u32::MAX,
                           attempts: Arc::new(AtomicU32::new(0)) };
    let config = FlowConfig { max_retries: 1,
                              ..FlowConfig::default() };
    let delay = config.processing_retry_delay;
    let mut engine = engine(flow, config);
    let flow_id = Uuid::new_v4();

    engine.process(&start(flow_id)).unwrap();
    let records = engine.process(&FlowEvent::wakeup(flow_id, t0() + delay)).unwrap();
    assert_eq!(statuses(&records), vec![FlowStatus::Failed]);
    let error = records.iter()
                       .find_map(|r| match r {
                           OutboundRecord::Status(st) => st.error.clone(),
                           _ => None,
                       })
                       .unwrap_or_default();
    assert!(error.starts_with("pipeline retries exhausted after 2 attempts"), "{error}");
    assert!(engine.checkpoint(flow_id).unwrap().is_none());
}

/// Runner que siempre pide firmar.
struct AlwaysSign;

impl FlowRunner for AlwaysSign {
    fn run(&self, _checkpoint: &FlowCheckpoint, _resumption: FlowResumption) -> Result<RunOutcome, FlowProcessingError> {
        Ok(RunOutcome { request: FlowIoRequest::ExternalEvent { kind: ExternalEventKind::Signing,
                                                                payload: json!({}) },
                        continuation: ContinuationState::default() })
    }
}

/// Reanuda sin esperar la respuesta.
struct Impatient;

impl WaitingForHandler for Impatient {
    fn run_or_continue(&self, _ctx: &mut PipelineContext<'_>, _waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        Ok(RunOrContinue::Run(FlowResumption::Unit))
    }
}

#[test]
fn second_external_event_while_pending_fails_flow() {
    let mut waiting = WaitingForRegistry::standard();
    waiting.register(WaitingForKind::ExternalEventResponse, Impatient);
    let pipeline = FlowEventPipeline::new(Arc::new(AlwaysSign), waiting, FlowConfig::default());

    let out = pipeline.process(None, &start(Uuid::new_v4())).unwrap();
    assert!(out.checkpoint.is_none());
    let requests = out.records
                      .iter()
                      .filter(|r| matches!(r, OutboundRecord::ExternalEvent(_)))
                      .count();
    assert_eq!(requests, 1);
    let error = out.records
                   .iter()
                   .find_map(|r| match r {
                       OutboundRecord::Status(st) if st.status == FlowStatus::Failed => st.error.clone(),
                       _ => None,
                   })
                   .unwrap_or_default();
    assert!(error.contains("already pending"), "{error}");
}
