//! Data model for the model-materializer daemon.
//!
//! This crate carries no behavior beyond parsing and light validation: the
//! [`BaseModel`] and [`ClusterBaseModel`] custom resources, the polymorphic
//! [`ModelResource`] handle the engine consumes, the [`Task`] the Watcher
//! hands to a worker, the parsed [`ObjectLocator`] form of a storage URI, and
//! the on-disk [`ArtifactRecord`] catalog entry.

mod artifact;
mod error;
mod locator;
mod resource;
mod spec;
mod task;

pub use artifact::*;
pub use error::*;
pub use locator::*;
pub use resource::*;
pub use spec::*;
pub use task::*;
