//! Session Manager: mensajería fiable por contraparte sobre un bus
//! at-least-once.
//!
//! - Los envíos reciben números de secuencia consecutivos por sesión.
//! - Los recibidos se guardan en un buffer ordenado y se consumen
//!   estrictamente en orden; los duplicados se descartan.
//! - Los payloads de control (`Confirm`, `Close`, `Error`, `Init` sin datos)
//!   se aplican solos cuando llegan a la cabeza del buffer; los de datos
//!   esperan a que la lógica haga `receive`.
use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::checkpoint::{InitiatingSession, ReceivedSessionEvent, SessionPayload, SessionState, SessionStatus};
use crate::config::deadline_after;
use crate::event::{OutboundSessionEvent, SessionEvent};

#[derive(Debug, Clone, Copy)]
pub struct SessionManager {
    timeout: Duration,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Sesión abierta por este flow: queda en `Creating` hasta el `Confirm`.
    pub fn create_initiating(&self, session_id: &str, counterparty: &str, now: DateTime<Utc>) -> SessionState {
        SessionState { session_id: session_id.to_string(),
                       counterparty: counterparty.to_string(),
                       status: SessionStatus::Creating,
                       send_sequence_number: 0,
                       received_events: Default::default(),
                       last_processed_received_sequence_number: None,
                       has_sent_close: false,
                       has_received_close: false,
                       error_message: None,
                       last_activity: now,
                       expiry_time: deadline_after(now, self.timeout) }
    }

    /// Sesión del lado responder. El `Init` de la contraparte es su seq 0: si
    /// trae datos queda en el buffer para el primer `receive`, si no se da por
    /// procesado.
    pub fn create_initiated(&self, init: &InitiatingSession, now: DateTime<Utc>) -> SessionState {
        let mut session = self.create_initiating(&init.session_id, &init.initiator, now);
        session.status = SessionStatus::Confirmed;
        let payload = SessionPayload::Init { protocol: init.protocol.clone(),
                                             payload: init.payload.clone() };
        if payload.is_control() {
            session.last_processed_received_sequence_number = Some(0);
        } else {
            session.received_events.insert(0,
                                           ReceivedSessionEvent { sequence_number: 0,
                                                                  payload,
                                                                  received_at: now });
        }
        session
    }

    /// Incorpora un evento recibido al buffer. Devuelve `false` si era un
    /// duplicado (o la sesión ya no admite tráfico) y el estado no cambió.
    pub fn process_message_received(&self, session: &mut SessionState, event: &SessionEvent, now: DateTime<Utc>) -> bool {
        if session.status.is_terminal() {
            debug!("session:drop terminal session_id={} seq={}",
                   session.session_id, event.sequence_number);
            return false;
        }
        let seq = event.sequence_number;
        if seq < session.next_expected_sequence_number() || session.received_events.contains_key(&seq) {
            debug!("session:duplicate session_id={} seq={}", session.session_id, seq);
            return false;
        }
        session.received_events.insert(seq,
                                       ReceivedSessionEvent { sequence_number: seq,
                                                              payload: event.payload.clone(),
                                                              received_at: now });
        self.touch(session, now);
        true
    }

    /// Evento siguiente en orden, sólo si ya llegó.
    pub fn get_next_received_event<'a>(&self, session: &'a SessionState) -> Option<&'a ReceivedSessionEvent> {
        session.received_events.get(&session.next_expected_sequence_number())
    }

    /// Marca `seq` como consumido y lo quita del buffer. Re-confirmar una
    /// secuencia ya consumida no hace nada; no se permite saltar huecos.
    pub fn acknowledge_received_event(&self, session: &mut SessionState, seq: u64) -> bool {
        if seq != session.next_expected_sequence_number() {
            return false;
        }
        if session.received_events.remove(&seq).is_none() {
            return false;
        }
        session.last_processed_received_sequence_number = Some(seq);
        true
    }

    /// Aplica y consume los eventos de control que estén a la cabeza del
    /// buffer. Devuelve cuántos se consumieron.
    pub fn process_control_events(&self, session: &mut SessionState) -> usize {
        let mut applied = 0;
        while let Some(next) = self.get_next_received_event(session) {
            if !next.payload.is_control() {
                break;
            }
            let seq = next.sequence_number;
            let payload = next.payload.clone();
            self.acknowledge_received_event(session, seq);
            self.apply_control(session, &payload);
            applied += 1;
            if session.status == SessionStatus::Error {
                break;
            }
        }
        applied
    }

    fn apply_control(&self, session: &mut SessionState, payload: &SessionPayload) {
        match payload {
            SessionPayload::Confirm => {
                if session.status == SessionStatus::Creating {
                    session.status = SessionStatus::Confirmed;
                }
            }
            SessionPayload::Close => {
                session.has_received_close = true;
                if session.status != SessionStatus::Error {
                    session.status = if session.has_sent_close { SessionStatus::Closed } else { SessionStatus::Closing };
                }
            }
            SessionPayload::Error { message } => {
                session.status = SessionStatus::Error;
                session.error_message = Some(message.clone());
            }
            SessionPayload::Init { .. } | SessionPayload::Data { .. } => {}
        }
        debug!("session:control session_id={} payload={} status={:?}",
               session.session_id,
               payload.type_name(),
               session.status);
    }

    /// Construye el siguiente mensaje saliente asignando `send_sequence_number`.
    pub fn next_message(&self,
                        session: &mut SessionState,
                        source: &str,
                        payload: SessionPayload,
                        now: DateTime<Utc>)
                        -> OutboundSessionEvent {
        let sequence_number = session.send_sequence_number;
        session.send_sequence_number += 1;
        self.touch(session, now);
        OutboundSessionEvent { source: source.to_string(),
                               destination: session.counterparty.clone(),
                               session_id: session.session_id.clone(),
                               sequence_number,
                               payload,
                               timestamp: now }
    }

    /// Envía `Close` si todavía no se envió. Con el `Close` de la contraparte
    /// ya recibido, la sesión queda `Closed`.
    pub fn send_close(&self, session: &mut SessionState, source: &str, now: DateTime<Utc>) -> Option<OutboundSessionEvent> {
        if session.has_sent_close || session.status.is_terminal() {
            return None;
        }
        session.has_sent_close = true;
        session.status = if session.has_received_close { SessionStatus::Closed } else { SessionStatus::Closing };
        Some(self.next_message(session, source, SessionPayload::Close, now))
    }

    /// Pasa la sesión a `Error` y avisa a la contraparte.
    pub fn send_error(&self,
                      session: &mut SessionState,
                      source: &str,
                      message: &str,
                      now: DateTime<Utc>)
                      -> Option<OutboundSessionEvent> {
        if session.status.is_terminal() {
            return None;
        }
        session.status = SessionStatus::Error;
        session.error_message = Some(message.to_string());
        Some(self.next_message(session,
                               source,
                               SessionPayload::Error { message: message.to_string() },
                               now))
    }

    pub fn is_expired(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        !session.status.is_terminal() && now >= session.expiry_time
    }

    fn touch(&self, session: &mut SessionState, now: DateTime<Utc>) {
        session.last_activity = now;
        session.expiry_time = deadline_after(now, self.timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> SessionManager {
        SessionManager::new(Duration::seconds(60))
    }

    fn data(seq: u64, v: i64) -> SessionEvent {
        SessionEvent { session_id: "s1".into(),
                       sequence_number: seq,
                       payload: SessionPayload::Data { payload: json!(v) } }
    }

    fn confirmed() -> SessionState {
        let m = manager();
        let mut s = m.create_initiating("s1", "bob", Utc::now());
        s.status = SessionStatus::Confirmed;
        s
    }

    #[test]
    fn out_of_order_events_are_buffered_until_the_gap_fills() {
        let m = manager();
        let mut s = confirmed();
        let now = Utc::now();
        assert!(m.process_message_received(&mut s, &data(2, 2), now));
        assert!(m.process_message_received(&mut s, &data(1, 1), now));
        assert!(m.get_next_received_event(&s).is_none(), "seq 0 missing");

        assert!(m.process_message_received(&mut s, &data(0, 0), now));
        let mut seen = vec![];
        while let Some(ev) = m.get_next_received_event(&s) {
            let seq = ev.sequence_number;
            seen.push(seq);
            assert!(m.acknowledge_received_event(&mut s, seq));
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(s.received_events.is_empty());
    }

    #[test]
    fn duplicates_and_reacks_are_noops() {
        let m = manager();
        let mut s = confirmed();
        let now = Utc::now();
        assert!(m.process_message_received(&mut s, &data(0, 0), now));
        assert!(!m.process_message_received(&mut s, &data(0, 99), now));
        assert!(m.acknowledge_received_event(&mut s, 0));
        let before = s.clone();
        assert!(!m.acknowledge_received_event(&mut s, 0));
        assert!(!m.process_message_received(&mut s, &data(0, 0), now));
        assert_eq!(s, before);
    }

    #[test]
    fn ack_cannot_skip_a_gap() {
        let m = manager();
        let mut s = confirmed();
        m.process_message_received(&mut s, &data(1, 1), Utc::now());
        assert!(!m.acknowledge_received_event(&mut s, 1));
        assert_eq!(s.last_processed_received_sequence_number, None);
    }

    #[test]
    fn confirm_is_applied_only_in_order() {
        let m = manager();
        let now = Utc::now();
        let mut s = m.create_initiating("s1", "bob", now);
        m.process_message_received(&mut s, &data(1, 7), now);
        assert_eq!(m.process_control_events(&mut s), 0);
        assert_eq!(s.status, SessionStatus::Creating);

        let confirm = SessionEvent { session_id: "s1".into(),
                                     sequence_number: 0,
                                     payload: SessionPayload::Confirm };
        m.process_message_received(&mut s, &confirm, now);
        assert_eq!(m.process_control_events(&mut s), 1);
        assert_eq!(s.status, SessionStatus::Confirmed);
        assert_eq!(m.get_next_received_event(&s).map(|e| e.sequence_number), Some(1));
    }

    #[test]
    fn close_from_both_sides_closes_the_session() {
        let m = manager();
        let now = Utc::now();
        let mut s = confirmed();
        let out = m.send_close(&mut s, "alice", now).expect("close sent");
        assert_eq!(out.sequence_number, 0);
        assert_eq!(s.status, SessionStatus::Closing);
        assert!(m.send_close(&mut s, "alice", now).is_none());

        let close = SessionEvent { session_id: "s1".into(),
                                   sequence_number: 0,
                                   payload: SessionPayload::Close };
        m.process_message_received(&mut s, &close, now);
        m.process_control_events(&mut s);
        assert_eq!(s.status, SessionStatus::Closed);
    }

    #[test]
    fn responder_session_buffers_init_payload() {
        let m = manager();
        let init = InitiatingSession { session_id: "s1".into(),
                                       initiator: "alice".into(),
                                       protocol: "ping".into(),
                                       payload: Some(json!("hi")) };
        let s = m.create_initiated(&init, Utc::now());
        assert_eq!(s.status, SessionStatus::Confirmed);
        let next = m.get_next_received_event(&s).expect("init buffered");
        assert_eq!(next.payload.data(), Some(&json!("hi")));

        let empty = InitiatingSession { payload: None, ..init };
        let s = m.create_initiated(&empty, Utc::now());
        assert_eq!(s.next_expected_sequence_number(), 1);
    }

    #[test]
    fn sends_are_sequenced_and_expiry_refreshes() {
        let m = manager();
        let t0 = Utc::now();
        let mut s = confirmed();
        let a = m.next_message(&mut s, "alice", SessionPayload::Data { payload: json!(1) }, t0);
        let b = m.next_message(&mut s, "alice", SessionPayload::Data { payload: json!(2) }, t0);
        assert_eq!((a.sequence_number, b.sequence_number), (0, 1));
        assert_eq!(a.destination, "bob");
        assert!(!m.is_expired(&s, t0 + Duration::seconds(59)));
        assert!(m.is_expired(&s, t0 + Duration::seconds(60)));
    }
}
