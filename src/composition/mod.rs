//! Startup-time capability composition.
//!
//! Composition runs in three stages, once, before request processing:
//!
//! 1. the application declares its capabilities in a [`Manifest`],
//! 2. the [scanner](scanner::scan) discovers concrete, non-decorator
//!    implementations and rejects ambiguous contracts,
//! 3. the [`Composer`] wires each discovered implementation (wrapped where
//!    the family is decorated) into an immutable [`Container`].
//!
//! After composition the container is read-only and safe for concurrent
//! resolution; there is no provision for re-composing at runtime.

mod composer;
mod container;
mod manifest;
pub mod scanner;

pub use composer::{Composer, CompositionError};
pub use container::{
    Container, ContainerBuilder, Provider, ResolveError, Scope, ServiceKey, Shared,
};
pub use manifest::{BindFn, CapabilityEntry, DecoratorBinder, Manifest};
