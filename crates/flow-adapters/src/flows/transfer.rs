//! Transferencia bilateral: propuesta, aceptación, doble firma, verificación
//! y registro.
//!
//! Iniciador                         Responder
//!   Init(proposal)  ------------->    receive
//!   receive         <-------------    Acceptance
//!   sign (Signing)
//!   SignatureMessage ------------>    receive
//!                                     sign (Signing)
//!   receive         <-------------    SignatureMessage, Close
//!   verify (Verification)
//!   persist (Persistence)
//!   Close
use async_trait::async_trait;
use log::info;
use serde_json::{json, Value};

use flow_core::{Flow, FlowContext, FlowError};

use crate::messages::{decode, encode, Acceptance, Proposal, SignatureMessage, TransferArgs};

pub const TRANSFER_FLOW: &str = "transfer";
pub const TRANSFER_RESPONDER_FLOW: &str = "transfer-responder";

/// Límite por defecto que acepta el responder.
pub const DEFAULT_ACCEPT_LIMIT: u64 = 1_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferFlow;

#[async_trait(?Send)]
impl Flow for TransferFlow {
    fn flow_type(&self) -> &str {
        TRANSFER_FLOW
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let args: TransferArgs = decode("transfer arguments", ctx.arguments().clone())?;
        let me = ctx.owning_identity().to_string();
        let proposal = Proposal::new(&me, &args.counterparty, args.amount, args.memo.clone(), ctx.privacy_salt());
        let session = ctx.initiate_session(&args.counterparty);

        let reply = ctx.send_and_receive(&session, encode(&proposal)?).await?;
        let acceptance: Acceptance = decode("acceptance", reply)?;
        if acceptance.tx_id != proposal.tx_id {
            return Err(FlowError::business(format!("acceptance for unknown tx {}", acceptance.tx_id)));
        }
        if !acceptance.accepted {
            ctx.close(&[session]).await?;
            return Err(FlowError::business(format!("transfer rejected: {}", acceptance.reason.unwrap_or_default())));
        }

        let signature = ctx.sign(json!({ "tx": proposal })).await?;
        let mine = SignatureMessage { tx_id: proposal.tx_id.clone(),
                                      signer: me.clone(),
                                      signature };
        let theirs: SignatureMessage = decode("counter-signature", ctx.send_and_receive(&session, encode(&mine)?).await?)?;

        ctx.verify(json!({ "tx": proposal, "signatures": [mine, theirs] })).await?;
        let stored = ctx.persist(json!({ "tx": proposal, "signers": [mine.signer, theirs.signer] }))
                        .await?;
        ctx.close(&[session]).await?;

        info!("transfer:completed tx_id={} amount={}", proposal.tx_id, proposal.amount);
        Ok(json!({ "tx_id": proposal.tx_id, "amount": proposal.amount, "record": stored }))
    }
}

/// Lado contraparte de `TransferFlow`.
#[derive(Debug, Clone, Copy)]
pub struct TransferResponderFlow {
    pub accept_limit: u64,
}

impl Default for TransferResponderFlow {
    fn default() -> Self {
        Self { accept_limit: DEFAULT_ACCEPT_LIMIT }
    }
}

#[async_trait(?Send)]
impl Flow for TransferResponderFlow {
    fn flow_type(&self) -> &str {
        TRANSFER_RESPONDER_FLOW
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let session = ctx.initiating_session()
                         .ok_or_else(|| FlowError::business("responder started without an initiating session"))?;
        let proposal: Proposal = decode("proposal", ctx.receive(&session).await?)?;
        if proposal.digest() != proposal.tx_id {
            return Err(FlowError::business("proposal tx_id does not match its content"));
        }

        if proposal.amount > self.accept_limit {
            let rejection = Acceptance { tx_id: proposal.tx_id.clone(),
                                         accepted: false,
                                         reason: Some(format!("amount {} over limit {}", proposal.amount, self.accept_limit)) };
            ctx.send(&session, encode(&rejection)?).await?;
            ctx.close(&[session]).await?;
            return Ok(json!({ "tx_id": proposal.tx_id, "accepted": false }));
        }

        let acceptance = Acceptance { tx_id: proposal.tx_id.clone(),
                                      accepted: true,
                                      reason: None };
        let theirs: SignatureMessage = decode("signature", ctx.send_and_receive(&session, encode(&acceptance)?).await?)?;
        let signature = ctx.sign(json!({ "tx": proposal, "countersigns": theirs.signature })).await?;
        let mine = SignatureMessage { tx_id: proposal.tx_id.clone(),
                                      signer: ctx.owning_identity().to_string(),
                                      signature };
        ctx.send(&session, encode(&mine)?).await?;
        ctx.close(&[session]).await?;
        Ok(json!({ "tx_id": proposal.tx_id, "accepted": true }))
    }
}
