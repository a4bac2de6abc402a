//! Notifica un documento a una contraparte y lo firma.
use async_trait::async_trait;
use log::warn;
use serde_json::{json, Value};

use flow_core::{ExternalEventFailureKind, Flow, FlowContext, FlowError};

use crate::messages::{decode, NotifyArgs};

pub const NOTIFY_AND_SIGN_FLOW: &str = "notify-and-sign";
pub const NOTIFY_RESPONDER_FLOW: &str = "notify-responder";

/// Reintentos de firma que hace la propia lógica ante errores de plataforma.
const SIGN_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyAndSignFlow;

#[async_trait(?Send)]
impl Flow for NotifyAndSignFlow {
    fn flow_type(&self) -> &str {
        NOTIFY_AND_SIGN_FLOW
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let args: NotifyArgs = decode("notify arguments", ctx.arguments().clone())?;
        let session = ctx.initiate_session(&args.counterparty);
        ctx.send(&session, json!({ "document": args.document })).await?;

        let mut attempt = 1;
        let signature = loop {
            match ctx.sign(json!({ "document": args.document })).await {
                Ok(sig) => break sig,
                Err(FlowError::ExternalEvent(failure))
                    if failure.kind == ExternalEventFailureKind::Platform && attempt < SIGN_ATTEMPTS =>
                {
                    warn!("notify:sign_retry attempt={} error={}", attempt, failure);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        Ok(json!({ "signature": signature, "attempts": attempt }))
    }
}

/// Recibe el documento notificado y termina.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyResponderFlow;

#[async_trait(?Send)]
impl Flow for NotifyResponderFlow {
    fn flow_type(&self) -> &str {
        NOTIFY_RESPONDER_FLOW
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let session = ctx.initiating_session()
                         .ok_or_else(|| FlowError::business("responder started without an initiating session"))?;
        let received = ctx.receive(&session).await?;
        Ok(json!({ "from": session.counterparty, "received": received }))
    }
}
