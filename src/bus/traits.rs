// ABOUTME: Seams of the bus: event handlers, services with teardown, and loadable modules
// ABOUTME: Handlers return boxed futures so heterogeneous handlers can share one table

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bus::binding::Binding;
use crate::bus::context::Context;

/// Future returned by an [`EventHandler`] invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = crate::Result<()>> + Send + 'static>>;

/// An asynchronous consumer of bound events.
///
/// Implemented for every `Fn(Binding) -> impl Future<Output = Result<()>>`
/// closure, so most handlers are plain `async move` closures.
pub trait EventHandler: Send + Sync {
    fn call(&self, binding: Binding) -> HandlerFuture;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Binding) -> Fut + Send + Sync,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    fn call(&self, binding: Binding) -> HandlerFuture {
        Box::pin(self(binding))
    }
}

/// A registered object with a lifecycle.
///
/// `unregister` is invoked when the owning registry entry is removed. It
/// must be idempotent.
pub trait Service: Send + Sync {
    fn unregister(&self);
}

/// A loadable unit of functionality.
///
/// [`Context::add_module`] checks that every name in [`Module::inject`] is
/// already registered at the root, then calls [`Module::apply`].
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Root names that must exist before `apply` runs.
    fn inject(&self) -> &[&str] {
        &[]
    }

    fn apply(&self, ctx: &Arc<Context>) -> crate::Result<()>;
}
