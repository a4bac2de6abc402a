use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};

use flow_core::{Flow, FlowContext, FlowError};

pub const DELAY_FLOW: &str = "delay";

/// Duerme `millis` (argumento) y termina.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayFlow;

#[async_trait(?Send)]
impl Flow for DelayFlow {
    fn flow_type(&self) -> &str {
        DELAY_FLOW
    }

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError> {
        let millis = ctx.arguments()
                        .get("millis")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| FlowError::business("delay needs a numeric `millis` argument"))?;
        ctx.sleep(Duration::milliseconds(millis)).await?;
        Ok(json!({ "slept_ms": millis }))
    }
}
