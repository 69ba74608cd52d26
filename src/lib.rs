//! filer-acl - Role Management for NFSv4 ACLs on Project Storage
//!
//! Operators think in roles (Manager, Contributor, Writer, Viewer); filers
//! enforce NFSv4 ACEs. This crate translates one into the other for NetApp
//! ONTAP and FreeNAS volumes, applies the result across directory trees
//! with a pool of worker threads, and keeps the directories above a
//! managed path passable with a Traverse (execute-only) grant.
//!
//! # Features
//!
//! - **Role Round-Tripping**: Generated ACEs classify back to the role that
//!   produced them, including Writer (allow everything but delete).
//!
//! - **Parallel Application**: One walker thread feeds a bounded queue
//!   drained by N workers, each running the native ACL tools.
//!
//! - **Idempotent Runs**: Requests that change nothing return early, and
//!   paths whose ACL would not change are not rewritten.
//!
//! - **Traverse Resolution**: Ancestors up to the mount root are granted
//!   Traverse on set and cleaned up on remove once no longer needed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                             │
//! │   validate ─► resolve root ─► diff ─► lock (.setacl.lock)        │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────┐    ┌──────────────────────┐    ┌────────────────┐
//! │ TreeWalker   │───►│ acl pool (N workers) │───►│ traverse       │
//! │ read_dir     │    │ RolerRegistry lookup │    │ resolver       │
//! └──────────────┘    └──────────┬───────────┘    └───────┬────────┘
//!                                │                        │
//!                                ▼                        ▼
//!                     ┌──────────────────────┐   ┌────────────────┐
//!                     │ Roler                │◄──│ traverse pool  │
//!                     │ NetApp/FreeNAS/Ceph  │   └────────────────┘
//!                     └──────────┬───────────┘
//!                                │ RoleTranslator
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │ nfs4_getfacl /       │
//!                     │ nfs4_setfacl         │
//!                     └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Show roles on a project tree
//! filer-acl get /project/3010000.01 -r
//!
//! # Give bob Contributor and carol Viewer, recursively
//! filer-acl set /project/3010000.01 -c bob -u carol -r
//!
//! # Take bob out again; Traverse on /project goes too if unused
//! filer-acl remove /project/3010000.01 -c bob -r
//! ```

pub mod acl;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod roler;
pub mod walker;

pub use acl::{Principal, Role, RoleMap, RolePathMap};
pub use config::{CliArgs, RunConfig};
pub use error::{AclError, Result};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use roler::{Roler, RolerRegistry};
