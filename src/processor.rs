//! Message handlers and the ordered chain that runs them.
//!
//! Every stage of the bridge, from the type filters to the router, is a
//! [`Processor`]. A [`ProcessorChain`] visits its processors in order until
//! one of them claims the message, which is how the bridge composes its
//! inbound and outbound pipelines.

use std::{fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{error::ProcessError, message::Message, registry::Registry};

/// Asynchronous message handler.
///
/// Return `Err(ProcessError::NotHandled)` to let the next processor in a
/// chain try; any other outcome ends the chain.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Handle `msg`, honouring cancellation of `ctx` where the work allows.
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError>;
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        (**self).process(ctx, msg).await
    }
}

/// Ordered sequence of processors with short-circuit semantics.
///
/// Empty slots are skipped, which lets callers build chains from optional
/// stages without filtering them first.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    stages: Vec<Option<Arc<dyn Processor>>>,
}

impl ProcessorChain {
    /// Build a chain from optional stages.
    #[must_use]
    pub fn new(stages: Vec<Option<Arc<dyn Processor>>>) -> Self { Self { stages } }

    /// Append a stage.
    #[must_use]
    pub fn then(mut self, stage: impl Processor + 'static) -> Self {
        self.stages.push(Some(Arc::new(stage)));
        self
    }

    /// Number of slots, including empty ones.
    #[must_use]
    pub fn len(&self) -> usize { self.stages.len() }

    /// Whether the chain has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl Processor for ProcessorChain {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        for stage in self.stages.iter().flatten() {
            if ctx.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            match stage.process(ctx, msg).await {
                Err(ProcessError::NotHandled) => {}
                outcome => return outcome,
            }
        }
        Err(ProcessError::NotHandled)
    }
}

/// Read-only tap on a message stream.
pub trait Observer: Send + Sync {
    /// Look at `msg`. Observers cannot fail or alter the message.
    fn observe(&self, ctx: &CancellationToken, msg: &Message);
}

impl<F> Observer for F
where
    F: Fn(&CancellationToken, &Message) + Send + Sync,
{
    fn observe(&self, ctx: &CancellationToken, msg: &Message) { self(ctx, msg); }
}

/// A list of observers presented as a pass-through processor.
#[derive(Clone, Debug, Default)]
pub struct Observers {
    observers: Registry<dyn Observer>,
}

impl Observers {
    /// Wrap an existing observer registry.
    #[must_use]
    pub fn new(observers: Registry<dyn Observer>) -> Self { Self { observers } }

    /// Call every observer with `msg`.
    pub fn observe(&self, ctx: &CancellationToken, msg: &Message) {
        self.observers.visit(|observer| observer.observe(ctx, msg));
    }
}

#[async_trait]
impl Processor for Observers {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        self.observe(ctx, msg);
        Err(ProcessError::NotHandled)
    }
}

/// Adapter turning an async closure into a [`Processor`].
pub struct ProcessorFn<F>(F);

impl<F, Fut> ProcessorFn<F>
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    /// Wrap `f`. The closure receives owned copies so it may move them into
    /// its future.
    pub fn new(f: F) -> Self { Self(f) }
}

#[async_trait]
impl<F, Fut> Processor for ProcessorFn<F>
where
    F: Fn(CancellationToken, Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessError>> + Send,
{
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        (self.0)(ctx.clone(), msg.clone()).await
    }
}

/// Asynchronous hook that derives a new message from an outgoing one.
///
/// The bridge runs modifiers on egress and discards their results, so a
/// modifier is effectively a fallible consumer.
#[async_trait]
pub trait Modifier: Send + Sync {
    /// Produce a message derived from `msg`.
    async fn modify(&self, ctx: &CancellationToken, msg: &Message) -> Result<Message, ProcessError>;
}

/// Adapter turning a closure into a [`Modifier`].
pub struct ModifierFn<F>(F);

impl<F> ModifierFn<F>
where
    F: Fn(CancellationToken, Message) -> BoxFuture<'static, Result<Message, ProcessError>>
        + Send
        + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self { Self(f) }
}

#[async_trait]
impl<F> Modifier for ModifierFn<F>
where
    F: Fn(CancellationToken, Message) -> BoxFuture<'static, Result<Message, ProcessError>>
        + Send
        + Sync,
{
    async fn modify(&self, ctx: &CancellationToken, msg: &Message) -> Result<Message, ProcessError> {
        (self.0)(ctx.clone(), msg.clone()).await
    }
}
