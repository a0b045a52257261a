//! Registry tree, event dispatch and module loading.
//!
//! A [`Context`] owns a root [`Registry`] and an [`EventBus`]. Modules
//! register named entries under the root and subscribe handlers on the bus;
//! services registered as entries are torn down when their entry is removed.

pub mod binding;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod traits;

pub use binding::{bind, Binding, EventParam};
pub use context::Context;
pub use dispatch::{EventBus, HandlerId, WeakBus};
pub use error::{BusError, BusResult};
pub use registry::{Entry, Registry};
pub use traits::{EventHandler, HandlerFuture, Module, Service};
