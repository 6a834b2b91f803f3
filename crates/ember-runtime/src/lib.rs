//! Runtime abstraction for the Ember launcher.
//!
//! The launcher drives an execution engine only through the seams defined
//! here: a [`RuntimeFactory`] creates a started [`RuntimeHandle`] from
//! merged [`ember_config::RuntimeOptions`], deployables are located
//! through a [`DeployableRegistry`], and each deployment instantiates
//! [`Deployable`] instances via a [`DeployableFactory`].
//!
//! A thread-backed in-process engine, [`LocalRuntime`], is provided for
//! the stock binary and for embedding callers that do not bring their
//! own engine.

mod deployable;
mod handle;
mod local;
mod registry;

pub use deployable::{Deployable, DeployableFactory, DeployError, DeploymentContext};
pub use handle::{DeploymentId, RuntimeError, RuntimeFactory, RuntimeHandle};
pub use local::{LocalRuntime, LocalRuntimeFactory};
pub use registry::DeployableRegistry;
