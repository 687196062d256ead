//! Turns inbound service registrations into routes.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::ConnectionConfig,
    error::ProcessError,
    message::{Message, MessageType},
    processor::Processor,
    router::Router,
};

pub(super) struct RegistrationHandler {
    router: Router,
    send_timeout: Duration,
    max_frame_length: usize,
}

impl RegistrationHandler {
    pub(super) fn new(router: Router, send_timeout: Duration, max_frame_length: usize) -> Self {
        Self {
            router,
            send_timeout,
            max_frame_length,
        }
    }
}

#[async_trait]
impl Processor for RegistrationHandler {
    async fn process(&self, _ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        if msg.msg_type != MessageType::SERVICE_REGISTRATION {
            return Err(ProcessError::NotHandled);
        }
        if msg.service_name.is_empty() {
            return Err(ProcessError::InvalidMessage("registration has no service name"));
        }
        if msg.url.is_empty() {
            return Err(ProcessError::InvalidMessage("registration has no url"));
        }
        let config = ConnectionConfig::new(msg.url.clone())
            .send_timeout(self.send_timeout)
            .max_frame_length(self.max_frame_length);
        self.router.upsert(&msg.service_name, config).await
    }
}
