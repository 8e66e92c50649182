//! Operation model and the storage/query engine seam.
//!
//! The engine itself (SQL, document store, ...) is external. It sees exactly
//! the operations callers issue, with sensitive fields already transformed.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One row of an entity: field name → value. An absent key is "undefined".
pub type Record = Map<String, Value>;

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

/// Filter, ordering, and pagination arguments of a read.
///
/// Passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryArgs {
    /// Equality predicates on non-sensitive fields.
    #[serde(default)]
    pub filter: Record,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub take: Option<usize>,
}

impl QueryArgs {
    /// Arguments matching records whose fields equal `filter`.
    pub fn filter(filter: Record) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// A storage operation against one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        entity: String,
        data: Record,
    },
    CreateMany {
        entity: String,
        data: Vec<Record>,
    },
    Update {
        entity: String,
        filter: Record,
        data: Record,
    },
    UpdateMany {
        entity: String,
        filter: Record,
        data: Record,
    },
    Upsert {
        entity: String,
        filter: Record,
        create: Record,
        update: Record,
    },
    FindUnique {
        entity: String,
        filter: Record,
    },
    FindUniqueOrThrow {
        entity: String,
        filter: Record,
    },
    FindFirst {
        entity: String,
        args: QueryArgs,
    },
    FindFirstOrThrow {
        entity: String,
        args: QueryArgs,
    },
    FindMany {
        entity: String,
        args: QueryArgs,
    },
}

impl Operation {
    /// Name of the entity this operation targets.
    pub fn entity(&self) -> &str {
        match self {
            Operation::Create { entity, .. }
            | Operation::CreateMany { entity, .. }
            | Operation::Update { entity, .. }
            | Operation::UpdateMany { entity, .. }
            | Operation::Upsert { entity, .. }
            | Operation::FindUnique { entity, .. }
            | Operation::FindUniqueOrThrow { entity, .. }
            | Operation::FindFirst { entity, .. }
            | Operation::FindFirstOrThrow { entity, .. }
            | Operation::FindMany { entity, .. } => entity,
        }
    }

    /// Payload-free discriminant of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::CreateMany { .. } => OperationKind::CreateMany,
            Operation::Update { .. } => OperationKind::Update,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::Upsert { .. } => OperationKind::Upsert,
            Operation::FindUnique { .. } => OperationKind::FindUnique,
            Operation::FindUniqueOrThrow { .. } => OperationKind::FindUniqueOrThrow,
            Operation::FindFirst { .. } => OperationKind::FindFirst,
            Operation::FindFirstOrThrow { .. } => OperationKind::FindFirstOrThrow,
            Operation::FindMany { .. } => OperationKind::FindMany,
        }
    }
}

/// Discriminant of [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
}

impl OperationKind {
    /// Interception category of this operation.
    pub fn category(self) -> Category {
        match self {
            OperationKind::Create => Category::Create,
            OperationKind::CreateMany => Category::CreateMany,
            OperationKind::Update => Category::Update,
            OperationKind::UpdateMany => Category::UpdateMany,
            OperationKind::Upsert => Category::Upsert,
            OperationKind::FindUnique
            | OperationKind::FindUniqueOrThrow
            | OperationKind::FindFirst
            | OperationKind::FindFirstOrThrow
            | OperationKind::FindMany => Category::Find,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::CreateMany => "createMany",
            OperationKind::Update => "update",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::Upsert => "upsert",
            OperationKind::FindUnique => "findUnique",
            OperationKind::FindUniqueOrThrow => "findUniqueOrThrow",
            OperationKind::FindFirst => "findFirst",
            OperationKind::FindFirstOrThrow => "findFirstOrThrow",
            OperationKind::FindMany => "findMany",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook rows of the interceptor's dispatch table.
///
/// | Category   | Pre-hook                    | Post-hook        |
/// |------------|-----------------------------|------------------|
/// | Create     | write payload               | returned record  |
/// | CreateMany | each payload element        | none (count)     |
/// | Update     | update payload              | returned record  |
/// | UpdateMany | update payload              | none (count)     |
/// | Upsert     | create and update branches  | returned record  |
/// | Find       | none                        | each record      |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Find,
}

impl Category {
    /// Whether the pre-hook encrypts an outgoing payload.
    pub fn encrypts_payload(self) -> bool {
        !matches!(self, Category::Find)
    }

    /// Whether the post-hook decrypts returned records.
    pub fn decrypts_result(self) -> bool {
        !matches!(self, Category::CreateMany | Category::UpdateMany)
    }
}

/// What an engine returns for an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Create, update, upsert, and the `OrThrow` finds.
    Record(Record),
    /// `findUnique` / `findFirst`: `None` when nothing matched.
    MaybeRecord(Option<Record>),
    /// `findMany`, in engine order.
    Records(Vec<Record>),
    /// Bulk writes report only the number of affected rows.
    Count(u64),
}

/// Errors reported by a [`QueryEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// An `OrThrow` read or an update matched no record.
    #[error("no {entity} record matched")]
    NotFound { entity: String },

    /// The engine rejected the operation (constraint violation, bad argument).
    #[error("{entity}: {reason}")]
    Rejected { entity: String, reason: String },

    /// Connection, transaction, or other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The storage/query engine the interceptor wraps.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Execute one operation and return its raw result.
    async fn execute(&self, op: Operation) -> Result<QueryOutput, EngineError>;
}
