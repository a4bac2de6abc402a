pub mod delay;
pub mod notify;
pub mod transfer;

pub use delay::{DelayFlow, DELAY_FLOW};
pub use notify::{NotifyAndSignFlow, NotifyResponderFlow, NOTIFY_AND_SIGN_FLOW, NOTIFY_RESPONDER_FLOW};
pub use transfer::{TransferFlow, TransferResponderFlow, DEFAULT_ACCEPT_LIMIT, TRANSFER_FLOW, TRANSFER_RESPONDER_FLOW};
