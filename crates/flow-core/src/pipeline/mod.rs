//! Flow Event Pipeline.
//!
//! `process(checkpoint?, evento) -> (checkpoint?, records)`:
//!
//! 1. Sin checkpoint sólo se acepta `StartFlow`.
//! 2. El handler del tipo de evento aplica la transición de sub-estado.
//! 3. El handler de waiting-for decide `Run` o `Continue`.
//! 4. En `Run` el runner avanza la lógica y su petición se interpreta; si la
//!    petición no necesita nada externo se vuelve a 3 en el mismo ciclo.
//! 5. Errores fatales marcan el flow FAILED; los transitorios dejan el
//!    checkpoint como estaba y programan un reintento.
//!
//! Todo "ahora" sale del timestamp del evento, así que reaplicar un evento
//! ya procesado no produce cambios ni records.
mod context;
mod requests;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::sync::Arc;
use uuid::Uuid;

pub use context::PipelineContext;

use crate::checkpoint::{FlowCheckpoint, FlowStartContext, PipelineRetry, WaitingFor};
use crate::config::{deadline_after, FlowConfig};
use crate::errors::{CoreEngineError, FlowProcessingError};
use crate::event::{FlowEvent, FlowEventKind, FlowStatus, OutboundRecord, ScheduledWakeup, StartFlow};
use crate::handlers::handler_for;
use crate::runner::FlowRunner;
use crate::waiting::{RunOrContinue, WaitingForRegistry};
use requests::{apply_request, RequestOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// `None` si el flow terminó (o nunca llegó a existir).
    pub checkpoint: Option<FlowCheckpoint>,
    pub records: Vec<OutboundRecord>,
}

enum Progress {
    Suspended,
    Terminated,
}

enum RetryGate {
    Proceed,
    Replay(Vec<FlowEventKind>),
    Defer,
}

pub struct FlowEventPipeline {
    runner: Arc<dyn FlowRunner>,
    waiting: WaitingForRegistry,
    config: FlowConfig,
}

impl FlowEventPipeline {
    pub fn new(runner: Arc<dyn FlowRunner>, waiting: WaitingForRegistry, config: FlowConfig) -> Self {
        Self { runner, waiting, config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Procesa un evento. Sólo devuelve error si no hay flow al que aplicarlo.
    pub fn process(&self, checkpoint: Option<FlowCheckpoint>, event: &FlowEvent) -> Result<PipelineOutput, CoreEngineError> {
        let now = event.timestamp;
        let original = checkpoint;
        let mut base = match (&original, &event.kind) {
            (Some(cp), _) => cp.clone(),
            (None, FlowEventKind::StartFlow(start)) => self.new_checkpoint(event.flow_id, start, now),
            (None, _) => return Err(CoreEngineError::FlowNotFound(event.flow_id)),
        };

        let gate = match &base.pipeline_retry {
            None => RetryGate::Proceed,
            Some(retry) if matches!(event.kind, FlowEventKind::Wakeup) && now >= retry.next_attempt => {
                RetryGate::Replay(retry.events.clone())
            }
            Some(_) => RetryGate::Defer,
        };
        let (events, stored) = match gate {
            RetryGate::Proceed => (vec![event.kind.clone()], vec![event.kind.clone()]),
            RetryGate::Replay(stored) => {
                debug!("pipeline:replay flow_id={} events={}", base.flow_id, stored.len());
                let mut events = stored.clone();
                events.push(FlowEventKind::Wakeup);
                (events, stored)
            }
            RetryGate::Defer => {
                // Hasta que el reintento salga bien, los eventos se encolan en orden.
                if let Some(retry) = base.pipeline_retry.as_mut() {
                    if !matches!(event.kind, FlowEventKind::Wakeup) && !retry.events.contains(&event.kind) {
                        retry.events.push(event.kind.clone());
                    }
                }
                return Ok(self.finish(original.as_ref(), Some(base), Vec::new()));
            }
        };
        let replaying = base.pipeline_retry.is_some();

        let mut ctx = PipelineContext::new(base.clone(), now, &self.config);
        match self.execute(&mut ctx, &events) {
            Ok(Progress::Suspended) => {
                let mut cp = ctx.checkpoint;
                if replaying {
                    cp.pipeline_retry = None;
                    cp.retry_count = 0;
                }
                Ok(self.finish(original.as_ref(), Some(cp), ctx.records))
            }
            Ok(Progress::Terminated) => Ok(self.finish(original.as_ref(), None, ctx.records)),
            Err(FlowProcessingError::Transient(message)) => {
                warn!("pipeline:transient flow_id={} event={} error={}",
                      base.flow_id,
                      event.kind.type_name(),
                      message);
                base.retry_count += 1;
                if base.retry_count > base.max_retries {
                    let err = CoreEngineError::RetriesExhausted { attempts: base.retry_count,
                                                                  last_error: message };
                    let mut ctx = PipelineContext::new(base, now, &self.config);
                    self.fail_flow(&mut ctx, &err);
                    return Ok(self.finish(original.as_ref(), None, ctx.records));
                }
                let first_failure = base.pipeline_retry.as_ref().map_or(now, |r| r.first_failure);
                base.pipeline_retry = Some(PipelineRetry { events: stored,
                                                           error: message,
                                                           first_failure,
                                                           next_attempt: deadline_after(now, self.config.processing_retry_delay) });
                Ok(self.finish(original.as_ref(), Some(base), Vec::new()))
            }
            Err(FlowProcessingError::Fatal(err)) => {
                self.fail_flow(&mut ctx, &err);
                Ok(self.finish(original.as_ref(), None, ctx.records))
            }
        }
    }

    fn new_checkpoint(&self, flow_id: Uuid, start: &StartFlow, now: DateTime<Utc>) -> FlowCheckpoint {
        let start_context = FlowStartContext { flow_type: start.flow_type.clone(),
                                               arguments: start.arguments.clone(),
                                               initiated_by: start.initiated_by.clone(),
                                               started_at: now };
        let mut cp = FlowCheckpoint::new(flow_id, start.owning_identity.clone(), start_context, self.config.max_retries);
        cp.waiting_for = Some(WaitingFor::Start);
        cp
    }

    fn execute(&self, ctx: &mut PipelineContext<'_>, events: &[FlowEventKind]) -> Result<Progress, FlowProcessingError> {
        for event in events {
            handler_for(event).handle(ctx, event)?;
        }
        loop {
            let waiting = ctx.checkpoint
                             .waiting_for
                             .clone()
                             .ok_or(CoreEngineError::MissingWaitingFor)?;
            let handler = self.waiting
                              .get(waiting.kind())
                              .ok_or(CoreEngineError::NoWaitingForHandler(waiting.kind()))?;
            let resumption = match handler.run_or_continue(ctx, &waiting)? {
                RunOrContinue::Continue => return Ok(Progress::Suspended),
                RunOrContinue::Run(resumption) => resumption,
            };

            ctx.checkpoint.waiting_for = None;
            let outcome = self.runner.run(&ctx.checkpoint, resumption)?;
            ctx.checkpoint.suspend_count += 1;
            ctx.checkpoint.continuation = outcome.continuation;
            match apply_request(ctx, outcome.request)? {
                RequestOutcome::Suspend(next) => ctx.checkpoint.waiting_for = Some(next),
                RequestOutcome::Terminated => return Ok(Progress::Terminated),
            }
        }
    }

    /// Error fatal: sesiones abiertas reciben `Error` y se publica FAILED.
    fn fail_flow(&self, ctx: &mut PipelineContext<'_>, err: &CoreEngineError) {
        let message = err.to_string();
        error!("pipeline:fatal flow_id={} error={}", ctx.checkpoint.flow_id, message);
        for id in ctx.checkpoint.open_session_ids() {
            if let Err(e) = ctx.fail_session(&id, &message) {
                warn!("pipeline:fail_session flow_id={} session_id={} error={}", ctx.checkpoint.flow_id, id, e);
            }
        }
        ctx.push_status(FlowStatus::Failed, None, Some(message));
    }

    /// Sin cambios respecto al checkpoint de entrada no se emite nada. Con
    /// cambios y un plazo pendiente se programa un `Wakeup`.
    fn finish(&self, original: Option<&FlowCheckpoint>, checkpoint: Option<FlowCheckpoint>, mut records: Vec<OutboundRecord>) -> PipelineOutput {
        if let (Some(before), Some(after)) = (original, checkpoint.as_ref()) {
            if before == after {
                if !records.is_empty() {
                    debug!("pipeline:unchanged flow_id={} dropped_records={}", after.flow_id, records.len());
                }
                return PipelineOutput { checkpoint,
                                        records: Vec::new() };
            }
        }
        if let Some(cp) = checkpoint.as_ref() {
            if let Some(at) = self.next_deadline(cp) {
                records.push(OutboundRecord::Wakeup(ScheduledWakeup { flow_id: cp.flow_id,
                                                                      at }));
            }
        }
        PipelineOutput { checkpoint, records }
    }

    /// Próximo instante en el que un `Wakeup` puede cambiar algo.
    pub fn next_deadline(&self, cp: &FlowCheckpoint) -> Option<DateTime<Utc>> {
        let mut deadlines = Vec::new();
        if let Some(retry) = &cp.pipeline_retry {
            deadlines.push(retry.next_attempt);
        }
        if let Some(WaitingFor::Wakeup { until }) = &cp.waiting_for {
            deadlines.push(*until);
        }
        if let Some(state) = &cp.pending_external_event {
            if state.is_outstanding() {
                deadlines.push(deadline_after(state.send_timestamp, self.config.external_event_resend_window));
            }
        }
        if let Some(waiting) = &cp.waiting_for {
            deadlines.extend(waiting.session_ids()
                                    .iter()
                                    .filter_map(|id| cp.sessions.get(id))
                                    .filter(|s| !s.status.is_terminal())
                                    .map(|s| s.expiry_time));
        }
        deadlines.into_iter().min()
    }
}

impl std::fmt::Debug for FlowEventPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEventPipeline")
         .field("waiting", &self.waiting)
         .field("config", &self.config)
         .finish()
    }
}
