//! The query interceptor: one before/after hook pair around any [`QueryEngine`].
//!
//! For every operation the interceptor:
//! 1. asks the registry for the entity's sensitive fields (an empty list makes
//!    the call a plain passthrough);
//! 2. runs the pre-hook for the operation's [`Category`] to completion,
//!    encrypting outgoing payloads;
//! 3. issues the operation to the engine;
//! 4. runs the post-hook, decrypting every returned record.
//!
//! Filters, ordering, and pagination are never rewritten. Encryption failure
//! aborts the operation before the engine sees it; decryption failure only
//! degrades the affected field.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, instrument, trace};

use crate::crypto::FieldCipher;
use crate::engine::{
    Category, EngineError, Operation, OperationKind, QueryArgs, QueryEngine, QueryOutput, Record,
};
use crate::registry::{FieldList, FieldRegistry};
use crate::transform::{
    decrypt_record, encrypt_record, process_update_payload, DecryptFailurePolicy, TransformError,
};

/// Errors surfaced to callers of [`FieldInterceptor`].
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The pre-hook could not encrypt the payload; nothing was written.
    #[error("write aborted: {0}")]
    Encryption(#[from] TransformError),

    /// The underlying engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine returned a result shape that does not fit the operation.
    #[error("engine returned an unexpected result for {0}")]
    UnexpectedOutput(OperationKind),
}

/// Transparent field encryption around a [`QueryEngine`].
pub struct FieldInterceptor<E> {
    engine: E,
    registry: Arc<dyn FieldRegistry>,
    cipher: Arc<dyn FieldCipher>,
    policy: DecryptFailurePolicy,
}

impl<E: QueryEngine> FieldInterceptor<E> {
    /// Wrap `engine`, consulting `registry` and encrypting with `cipher`.
    pub fn new(
        engine: E,
        registry: Arc<dyn FieldRegistry>,
        cipher: Arc<dyn FieldCipher>,
        policy: DecryptFailurePolicy,
    ) -> Self {
        Self {
            engine,
            registry,
            cipher,
            policy,
        }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The decrypt-failure policy applied on reads.
    pub fn policy(&self) -> DecryptFailurePolicy {
        self.policy
    }

    /// Execute `op` with sensitive fields encrypted on the way in and
    /// decrypted on the way out.
    ///
    /// # Errors
    ///
    /// [`InterceptError::Encryption`] if a payload field cannot be encrypted
    /// (the engine is not called), or [`InterceptError::Engine`] if the engine
    /// fails.
    #[instrument(skip_all, fields(entity = %op.entity(), operation = %op.kind()))]
    pub async fn execute(&self, op: Operation) -> Result<QueryOutput, InterceptError> {
        let fields = self.registry.get_fields(op.entity());
        if fields.is_empty() {
            trace!("no sensitive fields; passthrough");
            return Ok(self.engine.execute(op).await?);
        }

        let kind = op.kind();
        let category = kind.category();
        let entity = op.entity().to_owned();

        let op = if category.encrypts_payload() {
            match self.before(op, &fields) {
                Ok(op) => op,
                Err(e) => {
                    error!(error = %e, "field encryption failed; write aborted");
                    return Err(e.into());
                }
            }
        } else {
            op
        };

        let output = self.engine.execute(op).await?;
        Ok(self.after(category, &entity, output, &fields))
    }

    /// Pre-hook: encrypt outgoing payloads per operation category.
    fn before(&self, op: Operation, fields: &FieldList) -> Result<Operation, TransformError> {
        let cipher = self.cipher.as_ref();
        let op = match op {
            Operation::Create { entity, data } => Operation::Create {
                entity,
                data: encrypt_record(cipher, data, fields)?,
            },
            Operation::CreateMany { entity, data } => Operation::CreateMany {
                entity,
                data: data
                    .into_iter()
                    .map(|row| encrypt_record(cipher, row, fields))
                    .collect::<Result<_, _>>()?,
            },
            Operation::Update {
                entity,
                filter,
                data,
            } => Operation::Update {
                entity,
                filter,
                data: process_update_payload(cipher, data, fields)?,
            },
            Operation::UpdateMany {
                entity,
                filter,
                data,
            } => Operation::UpdateMany {
                entity,
                filter,
                data: process_update_payload(cipher, data, fields)?,
            },
            Operation::Upsert {
                entity,
                filter,
                create,
                update,
            } => Operation::Upsert {
                entity,
                filter,
                create: encrypt_record(cipher, create, fields)?,
                update: process_update_payload(cipher, update, fields)?,
            },
            read => read,
        };
        Ok(op)
    }

    /// Post-hook: decrypt returned records per operation category.
    fn after(
        &self,
        category: Category,
        entity: &str,
        output: QueryOutput,
        fields: &FieldList,
    ) -> QueryOutput {
        if !category.decrypts_result() {
            return output;
        }
        let cipher = self.cipher.as_ref();
        let decrypt = |row: Record| decrypt_record(cipher, entity, row, fields, self.policy);
        match output {
            QueryOutput::Record(row) => QueryOutput::Record(decrypt(row)),
            QueryOutput::MaybeRecord(row) => QueryOutput::MaybeRecord(row.map(decrypt)),
            QueryOutput::Records(rows) => {
                QueryOutput::Records(rows.into_iter().map(decrypt).collect())
            }
            count @ QueryOutput::Count(_) => count,
        }
    }

    /// Insert one record; the returned record is decrypted.
    pub async fn create(&self, entity: &str, data: Record) -> Result<Record, InterceptError> {
        let op = Operation::Create {
            entity: entity.to_owned(),
            data,
        };
        expect_record(OperationKind::Create, self.execute(op).await?)
    }

    /// Insert every record in `data`, returning the number written.
    pub async fn create_many(
        &self,
        entity: &str,
        data: Vec<Record>,
    ) -> Result<u64, InterceptError> {
        let op = Operation::CreateMany {
            entity: entity.to_owned(),
            data,
        };
        expect_count(OperationKind::CreateMany, self.execute(op).await?)
    }

    /// Update the record matching `filter`; `set` operators are encrypted too.
    ///
    /// Fails with [`EngineError::NotFound`] if nothing matches.
    pub async fn update(
        &self,
        entity: &str,
        filter: Record,
        data: Record,
    ) -> Result<Record, InterceptError> {
        let op = Operation::Update {
            entity: entity.to_owned(),
            filter,
            data,
        };
        expect_record(OperationKind::Update, self.execute(op).await?)
    }

    /// Update every record matching `filter`, returning the number changed.
    pub async fn update_many(
        &self,
        entity: &str,
        filter: Record,
        data: Record,
    ) -> Result<u64, InterceptError> {
        let op = Operation::UpdateMany {
            entity: entity.to_owned(),
            filter,
            data,
        };
        expect_count(OperationKind::UpdateMany, self.execute(op).await?)
    }

    /// Update the record matching `filter`, or insert `create` if none does.
    pub async fn upsert(
        &self,
        entity: &str,
        filter: Record,
        create: Record,
        update: Record,
    ) -> Result<Record, InterceptError> {
        let op = Operation::Upsert {
            entity: entity.to_owned(),
            filter,
            create,
            update,
        };
        expect_record(OperationKind::Upsert, self.execute(op).await?)
    }

    /// The record matching `filter`, if any.
    pub async fn find_unique(
        &self,
        entity: &str,
        filter: Record,
    ) -> Result<Option<Record>, InterceptError> {
        let op = Operation::FindUnique {
            entity: entity.to_owned(),
            filter,
        };
        expect_maybe_record(OperationKind::FindUnique, self.execute(op).await?)
    }

    /// The record matching `filter`, or [`EngineError::NotFound`].
    pub async fn find_unique_or_throw(
        &self,
        entity: &str,
        filter: Record,
    ) -> Result<Record, InterceptError> {
        let op = Operation::FindUniqueOrThrow {
            entity: entity.to_owned(),
            filter,
        };
        expect_record(OperationKind::FindUniqueOrThrow, self.execute(op).await?)
    }

    /// The first record selected by `args`, if any.
    pub async fn find_first(
        &self,
        entity: &str,
        args: QueryArgs,
    ) -> Result<Option<Record>, InterceptError> {
        let op = Operation::FindFirst {
            entity: entity.to_owned(),
            args,
        };
        expect_maybe_record(OperationKind::FindFirst, self.execute(op).await?)
    }

    /// The first record selected by `args`, or [`EngineError::NotFound`].
    pub async fn find_first_or_throw(
        &self,
        entity: &str,
        args: QueryArgs,
    ) -> Result<Record, InterceptError> {
        let op = Operation::FindFirstOrThrow {
            entity: entity.to_owned(),
            args,
        };
        expect_record(OperationKind::FindFirstOrThrow, self.execute(op).await?)
    }

    /// Every record selected by `args`, in engine order.
    pub async fn find_many(
        &self,
        entity: &str,
        args: QueryArgs,
    ) -> Result<Vec<Record>, InterceptError> {
        let op = Operation::FindMany {
            entity: entity.to_owned(),
            args,
        };
        match self.execute(op).await? {
            QueryOutput::Records(rows) => Ok(rows),
            _ => Err(InterceptError::UnexpectedOutput(OperationKind::FindMany)),
        }
    }
}

fn expect_record(kind: OperationKind, output: QueryOutput) -> Result<Record, InterceptError> {
    match output {
        QueryOutput::Record(row) => Ok(row),
        _ => Err(InterceptError::UnexpectedOutput(kind)),
    }
}

fn expect_maybe_record(
    kind: OperationKind,
    output: QueryOutput,
) -> Result<Option<Record>, InterceptError> {
    match output {
        QueryOutput::MaybeRecord(row) => Ok(row),
        _ => Err(InterceptError::UnexpectedOutput(kind)),
    }
}

fn expect_count(kind: OperationKind, output: QueryOutput) -> Result<u64, InterceptError> {
    match output {
        QueryOutput::Count(n) => Ok(n),
        _ => Err(InterceptError::UnexpectedOutput(kind)),
    }
}

/// Interceptors stack: a wrapped engine is itself an engine.
#[async_trait::async_trait]
impl<E: QueryEngine> QueryEngine for FieldInterceptor<E> {
    async fn execute(&self, op: Operation) -> Result<QueryOutput, EngineError> {
        let entity = op.entity().to_owned();
        FieldInterceptor::execute(self, op).await.map_err(|e| match e {
            InterceptError::Engine(inner) => inner,
            other => EngineError::Rejected {
                entity,
                reason: other.to_string(),
            },
        })
    }
}
