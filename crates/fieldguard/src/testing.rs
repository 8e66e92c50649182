//! Test doubles shared by the unit tests: ciphers and an in-memory engine.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::crypto::{AesFieldCipher, CipherError, FieldCipher, KEY_LEN};
use crate::engine::{
    EngineError, Operation, OrderBy, QueryArgs, QueryEngine, QueryOutput, Record, SortOrder,
};
use crate::keys::KeyStore;
use crate::transform::is_update_operator;

pub(crate) const TEST_KEY: [u8; KEY_LEN] = [0x2A; KEY_LEN];

pub(crate) fn test_cipher() -> AesFieldCipher {
    let keys = KeyStore::new();
    keys.store(&TEST_KEY).expect("valid test key");
    AesFieldCipher::new(keys)
}

/// Build a [`Record`] from a `json!` object literal.
pub(crate) fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Flip one character of an envelope's ciphertext segment. The result is
/// still a well-formed envelope but fails authentication.
pub(crate) fn tamper(envelope: &str) -> String {
    let (head, ct) = envelope.rsplit_once('.').expect("envelope has segments");
    let mut chars: Vec<char> = ct.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    format!("{head}.{}", chars.into_iter().collect::<String>())
}

/// Real cipher that counts calls.
pub(crate) struct CountingCipher {
    inner: AesFieldCipher,
    pub encrypts: AtomicUsize,
    pub decrypts: AtomicUsize,
}

impl CountingCipher {
    pub(crate) fn new() -> Self {
        Self {
            inner: test_cipher(),
            encrypts: AtomicUsize::new(0),
            decrypts: AtomicUsize::new(0),
        }
    }
}

impl FieldCipher for CountingCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt(plaintext)
    }

    fn decrypt(&self, envelope: &str) -> Result<String, CipherError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(envelope)
    }
}

/// Cipher whose every encrypt and decrypt fails.
pub(crate) struct FailingCipher;

impl FieldCipher for FailingCipher {
    fn encrypt(&self, _plaintext: &str) -> Result<String, CipherError> {
        Err(CipherError::AeadFailure)
    }

    fn decrypt(&self, _envelope: &str) -> Result<String, CipherError> {
        Err(CipherError::AeadFailure)
    }
}

/// Layer that keeps the fields of every ERROR event.
///
/// Install with `tracing::subscriber::set_default` for the duration of a
/// single-threaded test.
#[derive(Clone, Default)]
pub(crate) struct ErrorEvents(Arc<Mutex<Vec<BTreeMap<String, String>>>>);

impl ErrorEvents {
    pub(crate) fn events(&self) -> Vec<BTreeMap<String, String>> {
        self.0.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for ErrorEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut fields = EventFields::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(fields.0);
    }
}

#[derive(Default)]
struct EventFields(BTreeMap<String, String>);

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

/// In-memory [`QueryEngine`] that records every operation it receives.
#[derive(Default)]
pub(crate) struct MemoryEngine {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    received: Mutex<Vec<Operation>>,
}

impl MemoryEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rows of `entity` exactly as persisted.
    pub(crate) fn stored(&self, entity: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite one stored field of the row at `index`.
    pub(crate) fn overwrite(&self, entity: &str, index: usize, field: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        let row = &mut tables.get_mut(entity).expect("entity exists")[index];
        row.insert(field.to_owned(), value);
    }

    /// Every operation received so far, in order.
    pub(crate) fn received(&self) -> Vec<Operation> {
        self.received.lock().unwrap().clone()
    }

    fn apply(&self, op: Operation) -> Result<QueryOutput, EngineError> {
        let mut tables = self.tables.lock().unwrap();
        match op {
            Operation::Create { entity, data } => {
                let rows = tables.entry(entity).or_default();
                let row = with_id(data, rows.len());
                rows.push(row.clone());
                Ok(QueryOutput::Record(row))
            }
            Operation::CreateMany { entity, data } => {
                let rows = tables.entry(entity).or_default();
                let count = data.len() as u64;
                for row in data {
                    let row = with_id(row, rows.len());
                    rows.push(row);
                }
                Ok(QueryOutput::Count(count))
            }
            Operation::Update {
                entity,
                filter,
                data,
            } => {
                let rows = tables.entry(entity.clone()).or_default();
                let row = rows
                    .iter_mut()
                    .find(|r| matches(r, &filter))
                    .ok_or(EngineError::NotFound { entity })?;
                apply_update(row, &data);
                Ok(QueryOutput::Record(row.clone()))
            }
            Operation::UpdateMany {
                entity,
                filter,
                data,
            } => {
                let rows = tables.entry(entity).or_default();
                let mut count = 0;
                for row in rows.iter_mut().filter(|r| matches(r, &filter)) {
                    apply_update(row, &data);
                    count += 1;
                }
                Ok(QueryOutput::Count(count))
            }
            Operation::Upsert {
                entity,
                filter,
                create,
                update,
            } => {
                let rows = tables.entry(entity).or_default();
                if let Some(row) = rows.iter_mut().find(|r| matches(r, &filter)) {
                    apply_update(row, &update);
                    return Ok(QueryOutput::Record(row.clone()));
                }
                let row = with_id(create, rows.len());
                rows.push(row.clone());
                Ok(QueryOutput::Record(row))
            }
            Operation::FindUnique { entity, filter } => {
                let found = select(&tables, &entity, &QueryArgs::filter(filter));
                Ok(QueryOutput::MaybeRecord(found.into_iter().next()))
            }
            Operation::FindUniqueOrThrow { entity, filter } => {
                select(&tables, &entity, &QueryArgs::filter(filter))
                    .into_iter()
                    .next()
                    .map(QueryOutput::Record)
                    .ok_or(EngineError::NotFound { entity })
            }
            Operation::FindFirst { entity, args } => Ok(QueryOutput::MaybeRecord(
                select(&tables, &entity, &args).into_iter().next(),
            )),
            Operation::FindFirstOrThrow { entity, args } => select(&tables, &entity, &args)
                .into_iter()
                .next()
                .map(QueryOutput::Record)
                .ok_or(EngineError::NotFound { entity }),
            Operation::FindMany { entity, args } => {
                Ok(QueryOutput::Records(select(&tables, &entity, &args)))
            }
        }
    }
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    async fn execute(&self, op: Operation) -> Result<QueryOutput, EngineError> {
        self.received.lock().unwrap().push(op.clone());
        self.apply(op)
    }
}

fn with_id(mut row: Record, index: usize) -> Record {
    row.entry("id").or_insert_with(|| Value::from(index as u64 + 1));
    row
}

fn matches(row: &Record, filter: &Record) -> bool {
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}

fn apply_update(row: &mut Record, data: &Record) {
    for (field, value) in data {
        match value {
            Value::Object(ops) if is_update_operator(ops) => {
                if let Some(set) = ops.get("set") {
                    row.insert(field.clone(), set.clone());
                }
                if let Some(delta) = ops.get("increment").and_then(Value::as_i64) {
                    let current = row.get(field).and_then(Value::as_i64).unwrap_or(0);
                    row.insert(field.clone(), Value::from(current + delta));
                }
                if ops.contains_key("unset") {
                    row.remove(field);
                }
            }
            other => {
                row.insert(field.clone(), other.clone());
            }
        }
    }
}

fn select(tables: &HashMap<String, Vec<Record>>, entity: &str, args: &QueryArgs) -> Vec<Record> {
    let mut rows: Vec<Record> = tables
        .get(entity)
        .map(|rows| rows.iter().filter(|r| matches(r, &args.filter)).cloned().collect())
        .unwrap_or_default();
    for OrderBy { field, order } in args.order_by.iter().rev() {
        rows.sort_by(|a, b| {
            let ord = compare(a.get(field), b.get(field));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
    rows.into_iter()
        .skip(args.skip.unwrap_or(0))
        .take(args.take.unwrap_or(usize::MAX))
        .collect()
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (a, b) => a.map(Value::to_string).cmp(&b.map(Value::to_string)),
    }
}
