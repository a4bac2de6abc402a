//! `FlowContext`: la API que ve la lógica de negocio.
//!
//! Cada operación es un futuro que se resuelve con el siguiente valor del
//! journal. Cuando el journal se agota, el futuro anota su petición y queda
//! pendiente; el runner la recoge tras el único `poll`.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use chrono::Duration;
use serde_json::Value;
use uuid::Uuid;

use super::continuation::{fingerprint, JournalEntry};
use super::{FlowError, FlowIoRequest, FlowResumption, SessionMessage, SessionRef};
use crate::checkpoint::{ExternalEventKind, FlowStartContext};
use crate::hashing::derive_id;

/// Estado compartido entre el runner y los futuros de una ejecución.
#[derive(Debug, Default)]
pub(crate) struct ReplayState {
    pub(crate) journal: Vec<JournalEntry>,
    pub(crate) cursor: usize,
    pub(crate) pending: Option<(String, FlowIoRequest)>,
    pub(crate) violation: Option<String>,
    sessions_initiated: u64,
}

impl ReplayState {
    pub(crate) fn new(journal: Vec<JournalEntry>) -> Self {
        Self { journal,
               ..Default::default() }
    }

    pub(crate) fn unreplayed(&self) -> usize {
        self.journal.len() - self.cursor
    }
}

#[derive(Debug)]
struct FlowInfo {
    flow_id: Uuid,
    owning_identity: String,
    start: FlowStartContext,
    /// `suspend_count` del checkpoint al reanudar; coincide con el largo del
    /// journal.
    suspend_count: u64,
}

#[derive(Debug, Clone)]
pub struct FlowContext {
    info: Rc<FlowInfo>,
    state: Rc<RefCell<ReplayState>>,
}

impl FlowContext {
    pub(crate) fn new(flow_id: Uuid,
                      owning_identity: &str,
                      start: FlowStartContext,
                      suspend_count: u64,
                      state: Rc<RefCell<ReplayState>>)
                      -> Self {
        Self { info: Rc::new(FlowInfo { flow_id,
                                        owning_identity: owning_identity.to_string(),
                                        start,
                                        suspend_count }),
               state }
    }

    pub fn flow_id(&self) -> Uuid {
        self.info.flow_id
    }

    pub fn owning_identity(&self) -> &str {
        &self.info.owning_identity
    }

    pub fn flow_type(&self) -> &str {
        &self.info.start.flow_type
    }

    pub fn arguments(&self) -> &Value {
        &self.info.start.arguments
    }

    /// Sesión que arrancó este flow (sólo responders).
    pub fn initiating_session(&self) -> Option<SessionRef> {
        self.info
            .start
            .initiated_by
            .as_ref()
            .map(|init| SessionRef { session_id: init.session_id.clone(),
                                     counterparty: init.initiator.clone() })
    }

    /// Nueva sesión hacia `counterparty`. No envía nada: el `Init` sale con
    /// el primer `send` o `receive`. El id es estable entre repeticiones.
    pub fn initiate_session(&self, counterparty: &str) -> SessionRef {
        let mut st = self.state.borrow_mut();
        let n = st.sessions_initiated;
        st.sessions_initiated += 1;
        SessionRef { session_id: format!("{}-{}", self.info.flow_id, n),
                     counterparty: counterparty.to_string() }
    }

    /// Sal determinista: usa como nonce el `suspend_count` que tenía el flow
    /// cuando la lógica llegó por primera vez a este punto. Al repetir se
    /// descuentan los pasos del journal aún no alcanzados.
    pub fn privacy_salt(&self) -> String {
        let pending = self.state.borrow().unreplayed() as u64;
        let nonce = self.info.suspend_count.saturating_sub(pending);
        derive_id(&[&self.info.flow_id.to_string(), "privacy-salt", &nonce.to_string()])
    }

    pub async fn send(&self, session: &SessionRef, payload: Value) -> Result<(), FlowError> {
        self.send_all(vec![SessionMessage { session: session.clone(),
                                            payload }])
            .await
    }

    pub async fn send_all(&self, messages: Vec<SessionMessage>) -> Result<(), FlowError> {
        match self.suspend(FlowIoRequest::Send { messages }).await {
            FlowResumption::Unit => Ok(()),
            other => Err(unexpected(other, "unit")),
        }
    }

    pub async fn receive(&self, session: &SessionRef) -> Result<Value, FlowError> {
        let mut payloads = self.receive_all(std::slice::from_ref(session)).await?;
        payloads.remove(&session.session_id)
                .ok_or_else(|| FlowError::UnexpectedResumption { expected: format!("data for {}", session.session_id) })
    }

    /// Un mensaje de cada sesión. Sólo se reanuda cuando todas tienen datos.
    pub async fn receive_all(&self, sessions: &[SessionRef]) -> Result<BTreeMap<String, Value>, FlowError> {
        match self.suspend(FlowIoRequest::Receive { sessions: sessions.to_vec() }).await {
            FlowResumption::SessionData { payloads } => Ok(payloads),
            other => Err(unexpected(other, "session data")),
        }
    }

    pub async fn send_and_receive(&self, session: &SessionRef, payload: Value) -> Result<Value, FlowError> {
        self.send(session, payload).await?;
        self.receive(session).await
    }

    pub async fn close(&self, sessions: &[SessionRef]) -> Result<(), FlowError> {
        match self.suspend(FlowIoRequest::CloseSessions { sessions: sessions.to_vec() }).await {
            FlowResumption::Unit => Ok(()),
            other => Err(unexpected(other, "unit")),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), FlowError> {
        match self.suspend(FlowIoRequest::Sleep { millis: duration.num_milliseconds() }).await {
            FlowResumption::Unit => Ok(()),
            other => Err(unexpected(other, "unit")),
        }
    }

    /// Llamada a un subsistema. Los fallos recuperables llegan como
    /// `FlowError::ExternalEvent`.
    pub async fn call_external(&self, kind: ExternalEventKind, payload: Value) -> Result<Value, FlowError> {
        match self.suspend(FlowIoRequest::ExternalEvent { kind, payload }).await {
            FlowResumption::ExternalEventResponse { payload } => Ok(payload),
            other => Err(unexpected(other, "external event response")),
        }
    }

    pub async fn sign(&self, payload: Value) -> Result<Value, FlowError> {
        self.call_external(ExternalEventKind::Signing, payload).await
    }

    pub async fn persist(&self, payload: Value) -> Result<Value, FlowError> {
        self.call_external(ExternalEventKind::Persistence, payload).await
    }

    pub async fn verify(&self, payload: Value) -> Result<Value, FlowError> {
        self.call_external(ExternalEventKind::Verification, payload).await
    }

    fn suspend(&self, request: FlowIoRequest) -> Suspend {
        Suspend { state: Rc::clone(&self.state),
                  request: Some(request) }
    }
}

fn unexpected(resumption: FlowResumption, expected: &str) -> FlowError {
    match resumption {
        FlowResumption::SessionError { session_id, message } => FlowError::Session { session_id,
                                                                                     reason: message },
        FlowResumption::ExternalEventFailed { failure } => FlowError::ExternalEvent(failure),
        _ => FlowError::UnexpectedResumption { expected: expected.to_string() },
    }
}

/// Futuro de un paso. Sólo se resuelve desde el journal.
struct Suspend {
    state: Rc<RefCell<ReplayState>>,
    request: Option<FlowIoRequest>,
}

impl Future for Suspend {
    type Output = FlowResumption;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<FlowResumption> {
        let this = self.get_mut();
        let mut st = this.state.borrow_mut();
        if st.violation.is_some() || st.pending.is_some() {
            return Poll::Pending;
        }
        let Some(request) = this.request.take() else {
            return Poll::Pending;
        };
        let fp = fingerprint(&request);
        let cursor = st.cursor;
        match st.journal.get(cursor) {
            Some(entry) if entry.fingerprint == fp => {
                let resumption = entry.resumption.clone();
                st.cursor += 1;
                Poll::Ready(resumption)
            }
            Some(_) => {
                st.violation = Some(format!("step {} issued a different {} request on replay", cursor, request.name()));
                Poll::Pending
            }
            None => {
                st.pending = Some((fp, request));
                Poll::Pending
            }
        }
    }
}
