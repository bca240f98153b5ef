//! Core data-access layer for Acsys.
//!
//! This crate puts one uniform record interface in front of interchangeable
//! storage backends and gates every read behind either a table's lock state
//! or a signed session token.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structures
//! - Every query value reaches the backend as a bound parameter
//! - Password hashes use Argon2id; tokens are HS256 signed with a process secret
//! - Changing a password invalidates every token issued before the change
//! - Reserved metadata tables are never reachable through the open data path
//!
//! # Architecture
//! - Driver trait with one implementation per backend, selected once at startup
//! - Factory functions for drivers and storage providers
//! - Error handling with credential sanitization and caller-safe messages

pub mod auth;
pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod gate;
pub mod logging;
pub mod models;
pub mod query;
pub mod security;
pub mod storage;

// Re-export commonly used types
pub use auth::{AuthService, Session};
pub use config::AppConfig;
pub use context::AppContext;
pub use drivers::{ConnectionConfig, DataDriver, create_driver, detect_database_type};
pub use error::{AcsysError, Result};
pub use gate::AccessGate;
pub use models::{
    DatabaseType, FieldDescriptor, FieldKind, LockState, Record, Role, StorageType,
    TableDescriptor, User, UserProfile,
};
pub use query::{
    Filter, Operator, OrderBy, PageCursor, PageOptions, PageResult, QueryOptions, QueryValue,
    SortDirection,
};
pub use storage::{StorageDriver, StorageRequest, create_storage};
