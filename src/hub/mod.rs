//! # Hub Layer
//!
//! Everything that talks to a content hub.
//!
//! ## Key Types
//!
//! - [`ContentService`] - Repositories, folders, items and content types
//! - [`Publisher`] - Asynchronous publish jobs
//! - [`HttpHub`] - Both traits over the management HTTP API
//! - [`MemoryHub`] - Both traits over process memory
//! - [`SchemaValidator`] - Body validation gateway

mod http;
mod memory;
mod model;
mod service;
mod validator;

pub use http::HttpHub;
pub use memory::{HubCounters, MemoryHub};
pub use model::{
    ContentType, ContentTypeSchema, ContentTypeSettings, Folder, PublishJobState, Repository,
    RepositoryContentType,
};
pub use service::{ContentService, HubError, HubResult, Publisher};
pub use validator::{RequiredPropertyValidator, SchemaValidator, ValidationError};
