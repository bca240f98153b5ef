//! Core data models shared by every driver.
//!
//! Records are schemaless JSON objects; each backend supplies its own
//! column/field introspection through [`FieldDescriptor`].

use serde::{Deserialize, Serialize};

/// A single row or document: field name to scalar/array value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Reserved table holding user accounts.
pub const USERS_TABLE: &str = "acsys_users";

/// Reserved table listing the tables reachable through the open path.
pub const OPEN_TABLES_TABLE: &str = "acsys_open_tables";

/// Prefix shared by all reserved metadata tables.
pub const RESERVED_TABLE_PREFIX: &str = "acsys_";

/// Returns true for system metadata tables that can never be unlocked.
pub fn is_reserved_table(table: &str) -> bool {
    table.starts_with(RESERVED_TABLE_PREFIX)
}

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Embedded relational engine
    #[serde(alias = "local")]
    Sqlite,
    /// Managed relational engine
    #[serde(rename = "mysql")]
    MySql,
    /// Managed document store
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::Sqlite => write!(f, "sqlite"),
            DatabaseType::MySql => write!(f, "mysql"),
            DatabaseType::MongoDb => write!(f, "mongodb"),
        }
    }
}

/// Supported file storage providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Files under a local directory, served through signed links
    Local,
    /// Google Cloud Storage bucket
    Gcp,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Local => write!(f, "local"),
            StorageType::Gcp => write!(f, "gcp"),
        }
    }
}

/// Administrative lock state of a table.
///
/// Tables start `Locked` unless explicitly unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

/// Table or collection metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub lock_state: LockState,
    pub row_count: u64,
    pub backend: DatabaseType,
}

/// Coarse storage kind of a column or document field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Temporal,
    Binary,
    Document,
    Array,
    Other,
}

/// Column/field introspection result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Backend type name as declared (or observed, for documents)
    pub declared_type: String,
    pub is_primary_key: bool,
    pub ordinal_position: u32,
}

/// User role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Administrator,
    Standard,
    Viewer,
    Other(String),
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Administrator" => Role::Administrator,
            "Standard User" | "Standard" => Role::Standard,
            "Viewer" => Role::Viewer,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Administrator => write!(f, "Administrator"),
            Role::Standard => write!(f, "Standard User"),
            Role::Viewer => write!(f, "Viewer"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A user row from the credential store.
///
/// Field names follow the stored column names so a [`Record`] from any driver
/// converts directly.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "acsys_id")]
    pub id: String,
    pub username: String,
    #[serde(rename = "acsys_cd")]
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub email: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("mode", &self.mode)
            // Note: password_hash is intentionally omitted
            .finish_non_exhaustive()
    }
}

impl User {
    /// Converts a driver record into a user.
    pub fn from_record(record: Record) -> crate::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(record))
            .map_err(|e| crate::error::AcsysError::serialization("Malformed user record", e))
    }

    /// Converts the user into a record for insertion.
    pub fn to_record(&self) -> crate::Result<Record> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(crate::error::AcsysError::configuration(
                "User did not serialize to an object",
            )),
            Err(e) => Err(crate::error::AcsysError::serialization(
                "Failed to serialize user",
                e,
            )),
        }
    }

    /// Public view of the user, without the password hash.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            role: self.role.clone(),
            mode: self.mode.clone(),
            email: self.email.clone(),
        }
    }
}

/// User data safe to return to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "acsys_id")]
    pub id: String,
    pub username: String,
    pub role: Role,
    pub mode: String,
    pub email: String,
}
