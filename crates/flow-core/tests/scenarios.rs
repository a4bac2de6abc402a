//! Recorrido completo de un flow iniciador: handshake de sesión, firma con
//! reenvío por timeout y cierre.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use flow_core::{async_trait, CoreEngineError, ExternalEventKind, ExternalEventOutcome, ExternalEventResponse, Flow, FlowContext, FlowEngine,
                FlowError, FlowEvent, FlowStatus, InMemoryCheckpointStore, OutboundRecord, SessionPayload, SessionStatus, StartFlow, WaitingFor};

/// Envía el documento a la contraparte y lo firma.
struct NotarizeFlow;

#[async_trait(?Send)]
impl Flow for NotarizeFlow {
    fn flow_type(&self) -> &str {
        "notarize"
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let session = ctx.initiate_session("bob");
        ctx.send(&session, json!({ "doc": "lease" })).await?;
        let signature = ctx.sign(json!({ "doc": "lease" })).await?;
        Ok(json!({ "signature": signature }))
    }
}

/// Pide sello a la contraparte y firma dos veces seguidas.
struct StampFlow;

#[async_trait(?Send)]
impl Flow for StampFlow {
    fn flow_type(&self) -> &str {
        "stamp"
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let session = ctx.initiate_session("bob");
        let stamp = ctx.send_and_receive(&session, json!({ "doc": "lease" })).await?;
        let first = ctx.sign(json!({ "stamp": stamp })).await?;
        let second = ctx.sign(json!({ "countersign": first })).await?;
        Ok(json!({ "signature": second }))
    }
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000, 0).single().unwrap_or_default()
}

fn engine() -> FlowEngine<InMemoryCheckpointStore> {
    FlowEngine::in_memory().flow(NotarizeFlow).build().expect("engine")
}

fn start(flow_id: Uuid, at: DateTime<Utc>) -> FlowEvent {
    start_as(flow_id, "notarize", at)
}

fn start_as(flow_id: Uuid, flow_type: &str, at: DateTime<Utc>) -> FlowEvent {
    FlowEvent::start(flow_id,
                     at,
                     StartFlow { owning_identity: "alice".into(),
                                 flow_type: flow_type.into(),
                                 arguments: json!({}),
                                 initiated_by: None })
}

fn sessions(records: &[OutboundRecord]) -> Vec<&flow_core::OutboundSessionEvent> {
    records.iter()
           .filter_map(|r| match r {
               OutboundRecord::Session(ev) => Some(ev),
               _ => None,
           })
           .collect()
}

fn external(records: &[OutboundRecord]) -> Vec<&flow_core::ExternalEventRequest> {
    records.iter()
           .filter_map(|r| match r {
               OutboundRecord::ExternalEvent(req) => Some(req),
               _ => None,
           })
           .collect()
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
fn initiator_lifecycle_with_resend() {
    let mut engine = engine();
    let flow_id = Uuid::new_v4();
    let session_id = format!("{flow_id}-0");
    let window = engine.config().external_event_resend_window;

    // 1. Start: Init (seq 0) y espera del handshake.
    let records = engine.process(&start(flow_id, t0())).expect("start");
    let out = sessions(&records);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].sequence_number, 0);
    assert_eq!(out[0].destination, "bob");
    assert!(matches!(out[0].payload, SessionPayload::Init { ref protocol, payload: Some(_) } if protocol == "notarize"));
    assert_eq!(statuses(&records), vec![FlowStatus::Running]);
    let cp = engine.checkpoint(flow_id).unwrap().expect("persisted");
    assert_eq!(cp.waiting_for, Some(WaitingFor::SessionInit { session_ids: vec![session_id.clone()] }));

    // 2. Confirm de la contraparte: sesión confirmada y petición de firma.
    let t1 = t0() + Duration::seconds(1);
    let records = engine.process(&FlowEvent::session(flow_id, t1, &session_id, 0, SessionPayload::Confirm))
                        .expect("confirm");
    let requests = external(&records);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, ExternalEventKind::Signing);
    let request_id = requests[0].request_id.clone();
    let cp = engine.checkpoint(flow_id).unwrap().expect("persisted");
    assert_eq!(cp.sessions[&session_id].status, SessionStatus::Confirmed);
    let pending = cp.pending_external_event.clone().expect("pending");
    assert_eq!(pending.request_id, request_id);
    assert!(records.iter()
                   .any(|r| matches!(r, OutboundRecord::Wakeup(w) if w.at == t1 + window)));

    // 3. Wakeup antes de la ventana: nada cambia.
    let early = t1 + window - Duration::seconds(1);
    let records = engine.process(&FlowEvent::wakeup(flow_id, early)).expect("early wakeup");
    assert!(records.is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), Some(cp.clone()));

    // 4. Wakeup pasada la ventana: reenvío con el mismo request_id.
    let late = t1 + window + Duration::seconds(1);
    let records = engine.process(&FlowEvent::wakeup(flow_id, late)).expect("late wakeup");
    let resent = external(&records);
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].request_id, request_id);
    let state = engine.checkpoint(flow_id)
                      .unwrap()
                      .and_then(|cp| cp.pending_external_event)
                      .expect("still pending");
    assert_eq!(state.retries, 1);
    assert_eq!(state.send_timestamp, late);

    // 5. Respuesta: el flow termina y se borra el checkpoint.
    let response = ExternalEventResponse { request_id: request_id.clone(),
                                           outcome: ExternalEventOutcome::Payload { payload: json!("sig-1") } };
    let done_at = late + Duration::seconds(1);
    let records = engine.process(&FlowEvent::external_response(flow_id, done_at, response.clone()))
                        .expect("response");
    assert_eq!(statuses(&records), vec![FlowStatus::Completed]);
    let completed = records.iter()
                           .find_map(|r| match r {
                               OutboundRecord::Status(st) => st.result.clone(),
                               _ => None,
                           })
                           .expect("result");
    assert_eq!(completed, json!({ "signature": "sig-1" }));
    assert!(sessions(&records).iter().any(|ev| ev.payload == SessionPayload::Close));
    assert!(engine.checkpoint(flow_id).unwrap().is_none());

    // 6. Respuesta duplicada: ya no hay flow.
    let err = engine.process(&FlowEvent::external_response(flow_id, done_at, response))
                    .unwrap_err();
    assert_eq!(err, CoreEngineError::FlowNotFound(flow_id));
}

#[test]
fn redelivered_events_change_nothing() {
    let mut engine = engine();
    let flow_id = Uuid::new_v4();
    let session_id = format!("{flow_id}-0");

    let first = start(flow_id, t0());
    engine.process(&first).unwrap();
    let after_start = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&first).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), after_start);

    let confirm = FlowEvent::session(flow_id, t0() + Duration::seconds(1), &session_id, 0, SessionPayload::Confirm);
    assert!(!engine.process(&confirm).unwrap().is_empty());
    let after_confirm = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&confirm).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), after_confirm);
}

#[test]
fn redelivery_after_the_flow_moved_on_changes_nothing() {
    let mut engine = FlowEngine::in_memory().flow(StampFlow).build().expect("engine");
    let flow_id = Uuid::new_v4();
    let session_id = format!("{flow_id}-0");
    let window = engine.config().external_event_resend_window;
    let pending_id = |engine: &FlowEngine<InMemoryCheckpointStore>| {
        engine.checkpoint(flow_id)
              .unwrap()
              .and_then(|cp| cp.pending_external_event)
              .map(|state| (state.request_id, state.retries))
    };

    engine.process(&start_as(flow_id, "stamp", t0())).unwrap();
    engine.process(&FlowEvent::session(flow_id, t0(), &session_id, 0, SessionPayload::Confirm))
          .unwrap();

    // Datos ya consumidos: el flow pasó a firmar.
    let t1 = t0() + Duration::seconds(1);
    let data = FlowEvent::session(flow_id, t1, &session_id, 1, SessionPayload::Data { payload: json!("stamped") });
    let records = engine.process(&data).unwrap();
    let first_id = external(&records).first().map(|r| r.request_id.clone()).expect("signing request");
    let after_data = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&data).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), after_data);

    // El Wakeup que provocó un reenvío no provoca otro.
    let late = t1 + window;
    let resend = FlowEvent::wakeup(flow_id, late);
    assert_eq!(external(&engine.process(&resend).unwrap()).len(), 1);
    let after_resend = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&resend).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), after_resend);
    assert_eq!(pending_id(&engine), Some((first_id.clone(), 1)));

    // Respuesta a la primera firma cuando ya se pidió la segunda.
    let response = ExternalEventResponse { request_id: first_id.clone(),
                                           outcome: ExternalEventOutcome::Payload { payload: json!("sig-1") } };
    let answered = FlowEvent::external_response(flow_id, late + Duration::seconds(1), response);
    let records = engine.process(&answered).unwrap();
    let second_id = external(&records).first().map(|r| r.request_id.clone()).expect("second request");
    assert_ne!(second_id, first_id);
    let after_answer = engine.checkpoint(flow_id).unwrap();
    assert!(engine.process(&answered).unwrap().is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), after_answer);
    assert_eq!(pending_id(&engine), Some((second_id, 0)));
}

#[test]
fn stale_response_is_ignored() {
    let mut engine = engine();
    let flow_id = Uuid::new_v4();
    engine.process(&start(flow_id, t0())).unwrap();
    engine.process(&FlowEvent::session(flow_id, t0(), format!("{flow_id}-0"), 0, SessionPayload::Confirm))
          .unwrap();
    let before = engine.checkpoint(flow_id).unwrap();

    let stale = ExternalEventResponse { request_id: "someone-else".into(),
                                        outcome: ExternalEventOutcome::Payload { payload: json!(1) } };
    let records = engine.process(&FlowEvent::external_response(flow_id, t0(), stale)).unwrap();
    assert!(records.is_empty());
    assert_eq!(engine.checkpoint(flow_id).unwrap(), before);
}

#[test]
fn unanswered_handshake_expires_and_fails_flow() {
    let mut engine = engine();
    let flow_id = Uuid::new_v4();
    let timeout = engine.config().session_timeout;
    engine.process(&start(flow_id, t0())).unwrap();

    let records = engine.process(&FlowEvent::wakeup(flow_id, t0() + timeout + Duration::seconds(1)))
                        .unwrap();
    assert_eq!(statuses(&records), vec![FlowStatus::Failed]);
    let errors: Vec<_> = sessions(&records).into_iter()
                                           .filter(|ev| matches!(ev.payload, SessionPayload::Error { .. }))
                                           .collect();
    assert_eq!(errors.len(), 1, "la contraparte recibe un único Error");
    let message = records.iter()
                         .find_map(|r| match r {
                             OutboundRecord::Status(st) => st.error.clone(),
                             _ => None,
                         })
                         .unwrap_or_default();
    assert!(message.contains("session timed out"), "{message}");
    assert!(engine.checkpoint(flow_id).unwrap().is_none());
}

#[test]
fn signing_without_answer_exhausts_retries() {
    let mut engine = engine();
    let flow_id = Uuid::new_v4();
    let window = engine.config().external_event_resend_window;
    let max = engine.config().max_retries;
    engine.process(&start(flow_id, t0())).unwrap();
    engine.process(&FlowEvent::session(flow_id, t0(), format!("{flow_id}-0"), 0, SessionPayload::Confirm))
          .unwrap();

    let mut now = t0();
    for _ in 0..max {
        now = now + window;
        let records = engine.process(&FlowEvent::wakeup(flow_id, now)).unwrap();
        assert_eq!(external(&records).len(), 1);
    }
    now = now + window;
    let records = engine.process(&FlowEvent::wakeup(flow_id, now)).unwrap();
    assert!(external(&records).is_empty());
    assert_eq!(statuses(&records), vec![FlowStatus::Failed]);
}
