use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use log::{debug, warn};

use super::context::ReplayState;
use super::continuation::JournalEntry;
use super::{ContinuationState, FlowContext, FlowError, FlowIoRequest, FlowRegistry, FlowResumption};
use crate::checkpoint::FlowCheckpoint;
use crate::constants::CONTINUATION_VERSION;
use crate::errors::{CoreEngineError, FlowProcessingError};

/// Resultado de ejecutar la lógica hasta su siguiente suspensión.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub request: FlowIoRequest,
    pub continuation: ContinuationState,
}

/// Snapshot + valor de reanudación -> petición + snapshot nuevo.
pub trait FlowRunner: Send + Sync {
    fn run(&self, checkpoint: &FlowCheckpoint, resumption: FlowResumption) -> Result<RunOutcome, FlowProcessingError>;
}

/// Runner por repetición: re-ejecuta la lógica desde el principio
/// resolviendo cada paso con el journal y se detiene en el primer paso sin
/// valor.
#[derive(Debug, Clone, Default)]
pub struct ReplayFlowRunner {
    registry: FlowRegistry,
}

impl ReplayFlowRunner {
    pub fn new(registry: FlowRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }
}

impl FlowRunner for ReplayFlowRunner {
    fn run(&self, checkpoint: &FlowCheckpoint, resumption: FlowResumption) -> Result<RunOutcome, FlowProcessingError> {
        let snapshot = &checkpoint.continuation;
        if snapshot.version != CONTINUATION_VERSION {
            return Err(CoreEngineError::UnsupportedContinuation(snapshot.version).into());
        }
        let flow = self.registry
                       .get(checkpoint.flow_type())
                       .ok_or_else(|| CoreEngineError::UnknownFlowType(checkpoint.flow_type().to_string()))?;

        let mut journal = snapshot.journal.clone();
        match (&snapshot.awaiting, resumption) {
            (None, FlowResumption::Start) if journal.is_empty() => {}
            (Some(fingerprint), resumption) if resumption != FlowResumption::Start => {
                journal.push(JournalEntry { fingerprint: fingerprint.clone(),
                                            resumption });
            }
            (_, resumption) => {
                return Err(CoreEngineError::Internal(format!("resumption {:?} does not fit continuation at step {}",
                                                             resumption,
                                                             snapshot.journal.len())).into());
            }
        }

        let state = Rc::new(RefCell::new(ReplayState::new(journal)));
        let ctx = FlowContext::new(checkpoint.flow_id,
                                   &checkpoint.owning_identity,
                                   checkpoint.start_context.clone(),
                                   checkpoint.suspend_count,
                                   Rc::clone(&state));
        let polled = {
            let mut fut = flow.call(ctx);
            let mut cx = Context::from_waker(Waker::noop());
            panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx)))
        };
        let polled = polled.map_err(|payload| {
                               let msg = panic_message(payload.as_ref());
                               warn!("runner:panic flow_id={} msg={}", checkpoint.flow_id, msg);
                               CoreEngineError::FlowPanicked(msg)
                           })?;

        let mut st = state.borrow_mut();
        if let Some(violation) = st.violation.take() {
            return Err(CoreEngineError::NonDeterministicFlow(violation).into());
        }
        let unreplayed = st.unreplayed();
        let journal = std::mem::take(&mut st.journal);
        let (request, awaiting) = match polled {
            Poll::Ready(result) => {
                if unreplayed > 0 {
                    return Err(CoreEngineError::NonDeterministicFlow(format!("flow returned with {} journal steps left",
                                                                             unreplayed)).into());
                }
                match result {
                    Ok(result) => (FlowIoRequest::FlowFinished { result }, None),
                    Err(FlowError::Transient(msg)) => return Err(FlowProcessingError::Transient(msg)),
                    Err(error) => (FlowIoRequest::FlowFailed { error }, None),
                }
            }
            Poll::Pending => match st.pending.take() {
                Some((fingerprint, request)) => (request, Some(fingerprint)),
                None => return Err(CoreEngineError::FlowStalled.into()),
            },
        };
        debug!("runner:suspend flow_id={} request={} steps={}",
               checkpoint.flow_id,
               request.name(),
               journal.len());
        Ok(RunOutcome { request,
                        continuation: ContinuationState { version: CONTINUATION_VERSION,
                                                          journal,
                                                          awaiting } })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload.downcast_ref::<&str>()
           .map(|s| s.to_string())
           .or_else(|| payload.downcast_ref::<String>().cloned())
           .unwrap_or_else(|| "non-string panic payload".to_string())
}
