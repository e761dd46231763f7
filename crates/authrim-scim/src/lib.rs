//! SCIM 2.0 provisioning engine
//!
//! Filter expressions compile to an AST usable two ways: evaluated directly
//! against resource documents, or compiled into parameterized SQL against
//! the relational store. PATCH, weak ETags, and the list envelope live
//! here; HTTP concerns stay in the API crate.

pub mod error;
pub mod etag;
pub mod filter;
pub mod patch;
pub mod resources;
pub mod search;
pub mod service;
pub mod sql;

pub use error::ScimError;
pub use filter::{FilterNode, Literal};
pub use patch::{PatchOperation, PatchRequest};
pub use search::{GroupSearchBackend, InMemoryGroupSearch, InMemoryUserSearch, UserSearchBackend};
pub use service::{GetOutcome, ListQuery, ScimGroupService, ScimUserService, VersionedResource};
