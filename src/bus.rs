//! Bus en proceso: particiones por `flow_id`, ruteo de sesiones y timers.
//!
//! Sustituye al broker real. Garantiza lo que el engine necesita: todos los
//! eventos de un flow llegan en orden a la misma partición.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use flow_core::{ExternalEventRequest, FlowEvent, FlowRegistry, FlowStatus, FlowStatusUpdate, InitiatingSession, OutboundRecord, OutboundSessionEvent,
                ScheduledWakeup, SessionPayload, StartFlow};

use crate::errors::CoreError;

const STATUS_CAPACITY: usize = 1024;

/// Receptores que el runtime reparte entre sus tareas.
pub struct BusReceivers {
    pub partitions: Vec<mpsc::UnboundedReceiver<FlowEvent>>,
    pub external: mpsc::UnboundedReceiver<ExternalEventRequest>,
}

#[derive(Clone)]
pub struct FlowBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    partitions: Vec<mpsc::UnboundedSender<FlowEvent>>,
    /// (identidad, session_id) -> flow que lleva esa sesión en esa identidad.
    /// Las rutas de un flow se borran cuando publica su estado terminal.
    sessions: DashMap<(String, String), Uuid>,
    /// Último `Wakeup` programado por flow, para no duplicar timers.
    timers: DashMap<Uuid, DateTime<Utc>>,
    registry: Arc<FlowRegistry>,
    external: mpsc::UnboundedSender<ExternalEventRequest>,
    statuses: broadcast::Sender<FlowStatusUpdate>,
}

impl FlowBus {
    pub fn new(partitions: usize, registry: Arc<FlowRegistry>) -> (Self, BusReceivers) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..partitions.max(1)).map(|_| mpsc::unbounded_channel()).unzip();
        let (external_tx, external_rx) = mpsc::unbounded_channel();
        let (statuses, _) = broadcast::channel(STATUS_CAPACITY);
        let bus = Self { inner: Arc::new(BusInner { partitions: senders,
                                                    sessions: DashMap::new(),
                                                    timers: DashMap::new(),
                                                    registry,
                                                    external: external_tx,
                                                    statuses }) };
        (bus,
         BusReceivers { partitions: receivers,
                        external: external_rx })
    }

    pub fn partition_count(&self) -> usize {
        self.inner.partitions.len()
    }

    /// Rutas de sesión vivas.
    pub fn route_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn partition_for(&self, flow_id: Uuid) -> usize {
        (flow_id.as_u128() % self.inner.partitions.len() as u128) as usize
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowStatusUpdate> {
        self.inner.statuses.subscribe()
    }

    /// Entrega un evento a la partición de su flow.
    pub fn send(&self, event: FlowEvent) -> Result<(), CoreError> {
        let idx = self.partition_for(event.flow_id);
        self.inner.partitions[idx].send(event)
                                  .map_err(|_| CoreError::ChannelClosed("partition"))
    }

    pub fn start_flow(&self, identity: &str, flow_type: &str, arguments: serde_json::Value) -> Result<Uuid, CoreError> {
        let flow_id = Uuid::new_v4();
        let start = StartFlow { owning_identity: identity.to_string(),
                                flow_type: flow_type.to_string(),
                                arguments,
                                initiated_by: None };
        self.send(FlowEvent::start(flow_id, Utc::now(), start))?;
        Ok(flow_id)
    }

    /// Publica un record producido al procesar un evento de `from_flow`.
    pub fn publish(&self, from_flow: Uuid, record: OutboundRecord) -> Result<(), CoreError> {
        match record {
            OutboundRecord::Session(ev) => self.deliver_session(from_flow, ev),
            OutboundRecord::ExternalEvent(req) => {
                debug!(request_id = %req.request_id, topic = req.kind.topic(), "bus:external_request");
                self.inner
                    .external
                    .send(req)
                    .map_err(|_| CoreError::ChannelClosed("external"))
            }
            OutboundRecord::Status(st) => {
                info!(flow_id = %st.flow_id, identity = %st.owning_identity, flow_type = %st.flow_type, status = ?st.status, "bus:status");
                if st.status != FlowStatus::Running {
                    self.drop_routes(st.flow_id);
                }
                // Sin suscriptores el envío falla; no es un error.
                let _ = self.inner.statuses.send(st);
                Ok(())
            }
            OutboundRecord::Wakeup(w) => {
                self.schedule_wakeup(w);
                Ok(())
            }
        }
    }

    fn deliver_session(&self, from_flow: Uuid, ev: OutboundSessionEvent) -> Result<(), CoreError> {
        self.inner
            .sessions
            .insert((ev.source.clone(), ev.session_id.clone()), from_flow);
        let key = (ev.destination.clone(), ev.session_id.clone());
        if let Some(target) = self.inner.sessions.get(&key).map(|e| *e.value()) {
            return self.send(FlowEvent::session(target, Utc::now(), ev.session_id, ev.sequence_number, ev.payload));
        }
        let SessionPayload::Init { protocol, payload } = ev.payload else {
            debug!(session_id = %ev.session_id, destination = %ev.destination, "bus:session_without_route");
            return Ok(());
        };
        let Some(responder) = self.inner.registry.responder_for(&protocol).map(str::to_string) else {
            warn!(protocol = %protocol, destination = %ev.destination, "bus:no_responder");
            // La contraparte no existe: el iniciador recibe el Error como su seq 0.
            let error = SessionPayload::Error { message: format!("no responder for protocol {protocol}") };
            return self.send(FlowEvent::session(from_flow, Utc::now(), ev.session_id, 0, error));
        };
        let flow_id = Uuid::new_v4();
        self.inner.sessions.insert(key, flow_id);
        let start = StartFlow { owning_identity: ev.destination.clone(),
                                flow_type: responder,
                                arguments: serde_json::Value::Null,
                                initiated_by: Some(InitiatingSession { session_id: ev.session_id,
                                                                       initiator: ev.source,
                                                                       protocol,
                                                                       payload }) };
        self.send(FlowEvent::start(flow_id, Utc::now(), start))
    }

    /// El status terminal es el último record de un flow: sus sesiones ya no
    /// reciben nada.
    fn drop_routes(&self, flow_id: Uuid) {
        let before = self.inner.sessions.len();
        self.inner.sessions.retain(|_, owner| *owner != flow_id);
        debug!(flow_id = %flow_id, dropped = before.saturating_sub(self.inner.sessions.len()), "bus:routes_dropped");
    }

    fn schedule_wakeup(&self, wakeup: ScheduledWakeup) {
        let previous = self.inner.timers.insert(wakeup.flow_id, wakeup.at);
        if previous == Some(wakeup.at) {
            return;
        }
        let bus = self.clone();
        tokio::spawn(async move {
            if let Ok(delay) = (wakeup.at - Utc::now()).to_std() {
                tokio::time::sleep(delay).await;
            }
            bus.inner.timers.remove_if(&wakeup.flow_id, |_, at| *at == wakeup.at);
            if let Err(e) = bus.send(FlowEvent::wakeup(wakeup.flow_id, Utc::now())) {
                warn!(flow_id = %wakeup.flow_id, error = %e, "bus:wakeup_dropped");
            }
        });
    }
}

impl std::fmt::Debug for FlowBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBus")
         .field("partitions", &self.inner.partitions.len())
         .field("routes", &self.inner.sessions.len())
         .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_adapters::standard_registry;
    use flow_core::FlowEventKind;

    fn bus(partitions: usize) -> (FlowBus, BusReceivers) {
        FlowBus::new(partitions, Arc::new(standard_registry()))
    }

    fn init(source: &str, destination: &str, protocol: &str) -> OutboundSessionEvent {
        OutboundSessionEvent { source: source.into(),
                               destination: destination.into(),
                               session_id: "s-1".into(),
                               sequence_number: 0,
                               payload: SessionPayload::Init { protocol: protocol.into(),
                                                               payload: None },
                               timestamp: Utc::now() }
    }

    #[test]
    fn same_flow_same_partition() {
        let (bus, _rx) = bus(4);
        let id = Uuid::new_v4();
        assert_eq!(bus.partition_for(id), bus.partition_for(id));
        assert!(bus.partition_for(id) < bus.partition_count());
    }

    #[test]
    fn init_starts_responder_and_later_messages_follow_route() {
        let (bus, mut rx) = bus(1);
        let initiator = Uuid::new_v4();
        bus.publish(initiator, OutboundRecord::Session(init("alice", "bob", "transfer")))
           .unwrap();
        let started = rx.partitions[0].try_recv().unwrap();
        let FlowEventKind::StartFlow(start) = &started.kind else {
            panic!("expected StartFlow, got {:?}", started.kind);
        };
        assert_eq!(start.flow_type, "transfer-responder");
        assert_eq!(start.owning_identity, "bob");

        // Respuesta del responder: vuelve al iniciador por la ruta registrada.
        let mut reply = init("bob", "alice", "transfer");
        reply.payload = SessionPayload::Confirm;
        bus.publish(started.flow_id, OutboundRecord::Session(reply)).unwrap();
        let back = rx.partitions[0].try_recv().unwrap();
        assert_eq!(back.flow_id, initiator);
    }

    #[test]
    fn unknown_protocol_answers_with_error() {
        let (bus, mut rx) = bus(1);
        let initiator = Uuid::new_v4();
        bus.publish(initiator, OutboundRecord::Session(init("alice", "bob", "unknown")))
           .unwrap();
        let ev = rx.partitions[0].try_recv().unwrap();
        assert_eq!(ev.flow_id, initiator);
        assert!(matches!(ev.kind, FlowEventKind::SessionEvent(ref s) if matches!(s.payload, SessionPayload::Error { .. })));
    }

    fn terminal(flow_id: Uuid, identity: &str) -> OutboundRecord {
        OutboundRecord::Status(FlowStatusUpdate { flow_id,
                                                  owning_identity: identity.into(),
                                                  flow_type: "transfer".into(),
                                                  status: FlowStatus::Completed,
                                                  result: None,
                                                  error: None,
                                                  timestamp: Utc::now() })
    }

    #[test]
    fn finished_flows_lose_their_routes() {
        let (bus, mut rx) = bus(1);
        let initiator = Uuid::new_v4();
        bus.publish(initiator, OutboundRecord::Session(init("alice", "bob", "transfer")))
           .unwrap();
        let responder = rx.partitions[0].try_recv().unwrap().flow_id;
        assert_eq!(bus.route_count(), 2);

        bus.publish(initiator, terminal(initiator, "alice")).unwrap();
        assert_eq!(bus.route_count(), 1);

        // Lo que el responder mande después ya no tiene destino.
        let mut late = init("bob", "alice", "transfer");
        late.payload = SessionPayload::Close;
        bus.publish(responder, OutboundRecord::Session(late)).unwrap();
        assert!(rx.partitions[0].try_recv().is_err());

        bus.publish(responder, terminal(responder, "bob")).unwrap();
        assert_eq!(bus.route_count(), 0);
    }
}
