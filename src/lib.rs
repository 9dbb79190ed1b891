//! modlink: Asynchronous Named-Module Dependency Runtime
//!
//! Modules are registered by id together with the ids they depend on and a
//! factory. Requesting ids resolves the dependency graph, loads missing
//! resources through an injected [`ResourceLoader`], runs every factory at
//! most once and hands out the produced values. Modules live in isolated,
//! named contexts which may reference each other with `ctx:id`. Legacy
//! resources that only publish a global are adapted through shims.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod identifier;
pub mod loader;
pub mod logging;
pub mod module;
pub mod paths;
pub mod readiness;
mod registry;
mod resolver;
pub mod runtime;
pub mod shim;
pub mod value;

pub use cache::{CacheCondition, CacheHints, CachePolicy};
pub use config::{ConfigLoader, ContextConfig, PackageRef, RuntimeConfig};
pub use context::Context;
pub use error::RuntimeError;
pub use identifier::PathAlias;
pub use loader::{ResourceKind, ResourceLoader, ResourceRequest, ScriptedLoader};
pub use module::{Factory, ModuleKey, ModuleState};
pub use readiness::ReadyTrigger;
pub use runtime::{PackageListInfo, Runtime};
pub use shim::{GlobalScope, HostGlobals, ShimDeclaration, ShimProvider};
pub use value::{Exports, ExternalResource, Value};
