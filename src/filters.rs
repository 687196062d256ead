//! Message-type filters used at the edges of both pipelines.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{error::ProcessError, message::Message, processor::Processor};

/// Rejects message types outside the known range and the reserved invalid
/// values; passes everything else along.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedTypeFilter;

#[async_trait]
impl Processor for UnsupportedTypeFilter {
    async fn process(&self, _ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        if msg.msg_type.is_supported() {
            Err(ProcessError::NotHandled)
        } else {
            Err(ProcessError::UnsupportedType(msg.msg_type))
        }
    }
}

/// Rejects bridge-internal message types (registration, liveness,
/// authorization) so they never cross an external boundary.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalOnlyFilter;

#[async_trait]
impl Processor for LocalOnlyFilter {
    async fn process(&self, _ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        if msg.msg_type.is_local() {
            Err(ProcessError::LocalDisallowed(msg.msg_type))
        } else {
            Err(ProcessError::NotHandled)
        }
    }
}
