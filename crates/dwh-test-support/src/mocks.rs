//! Recording fakes for the remote operation client and the storage provider.
//!
//! # Design
//! - Every call is recorded so tests can assert on call counts and ordering.
//! - Failures are injected per procedure or per storage operation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dwh_data::{DataError, DataResult, Param, Record, RemoteOperations};
use dwh_storage::{DeliveryFile, StorageError, StorageProvider, StorageResult, log_name};

use crate::fixtures::agreement_row;

/// Procedure label recorded for script submissions.
pub const SCRIPT: &str = "exec_script";

/// One call observed by [`RecordingOperations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Procedure name parsed from the statement, or [`SCRIPT`].
    pub procedure: String,
    /// Statement or script text as submitted.
    pub text: String,
    /// Positional parameters.
    pub params: Vec<Param>,
}

#[derive(Default)]
struct OpsState {
    calls: Vec<RecordedCall>,
    agreement_id: Option<i64>,
    failing: HashSet<String>,
    responses: HashMap<String, Vec<Record>>,
}

/// [`RemoteOperations`] fake that records calls and answers from a script.
///
/// `agreement_find` returns the configured agreement, or no rows when none is set.
/// Every other procedure returns its configured rows, or no rows.
#[derive(Default)]
pub struct RecordingOperations {
    state: Mutex<OpsState>,
}

impl RecordingOperations {
    /// Fake with no agreement and no failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every delivery to agreement `id`.
    #[must_use]
    pub fn with_agreement(self, id: i64) -> Self {
        self.lock().agreement_id = Some(id);
        self
    }

    /// Fail every call to `procedure`.
    #[must_use]
    pub fn failing_on(self, procedure: &str) -> Self {
        self.lock().failing.insert(procedure.to_string());
        self
    }

    /// Return `rows` from `procedure`.
    #[must_use]
    pub fn responding(self, procedure: &str, rows: Vec<Record>) -> Self {
        self.lock().responses.insert(procedure.to_string(), rows);
        self
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Procedure names in call order.
    #[must_use]
    pub fn procedures(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|call| call.procedure.clone())
            .collect()
    }

    /// Number of calls made to `procedure`.
    #[must_use]
    pub fn count(&self, procedure: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.procedure == procedure)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, OpsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(
        &self,
        operation: &'static str,
        text: &str,
        params: &[Param],
    ) -> DataResult<Vec<Record>> {
        let procedure = procedure_name(text);
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            procedure: procedure.clone(),
            text: text.to_string(),
            params: params.to_vec(),
        });
        if state.failing.contains(&procedure) {
            return Err(rejected(operation, &procedure));
        }
        if procedure == "agreement_find" {
            return Ok(state.agreement_id.map(agreement_row).into_iter().collect());
        }
        Ok(state.responses.get(&procedure).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RemoteOperations for RecordingOperations {
    async fn exec(&self, text: &str, params: &[Param]) -> DataResult<Vec<Record>> {
        self.answer("exec", text, params)
    }

    async fn query(&self, text: &str, limit: usize, params: &[Param]) -> DataResult<Vec<Record>> {
        let mut rows = self.answer("query", text, params)?;
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn exec_script(&self, text: &str) -> DataResult<()> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            procedure: SCRIPT.to_string(),
            text: text.to_string(),
            params: Vec::new(),
        });
        if state.failing.contains(SCRIPT) {
            return Err(rejected("exec_script", SCRIPT));
        }
        Ok(())
    }
}

fn procedure_name(text: &str) -> String {
    text.split_once("meta.")
        .and_then(|(_, rest)| rest.split('(').next())
        .map_or_else(|| text.trim().to_string(), |name| name.trim().to_string())
}

fn rejected(operation: &'static str, procedure: &str) -> DataError {
    DataError::QueryFailed {
        operation,
        source: sqlx::Error::Protocol(format!("{procedure} rejected by test double")),
    }
}

/// One call observed by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCall {
    /// Provider operation name.
    pub operation: &'static str,
    /// File name the call addressed.
    pub name: String,
}

#[derive(Default)]
struct StorageState {
    inbox: BTreeMap<String, Vec<u8>>,
    outbox: BTreeMap<String, Vec<u8>>,
    load_tier: BTreeSet<String>,
    logs: BTreeMap<String, Vec<u8>>,
    calls: Vec<StorageCall>,
    failing: HashSet<&'static str>,
    panicking: HashSet<&'static str>,
}

/// In-memory [`StorageProvider`] with a distinct load tier.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the inbox with `name`.
    #[must_use]
    pub fn with_file(self, name: &str, contents: &[u8]) -> Self {
        self.add_file(name, contents);
        self
    }

    /// Fail every call to `operation`.
    #[must_use]
    pub fn failing_on(self, operation: &'static str) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    /// Panic inside `operation`.
    #[must_use]
    pub fn panicking_on(self, operation: &'static str) -> Self {
        self.lock().panicking.insert(operation);
        self
    }

    /// Add a delivery to the inbox.
    pub fn add_file(&self, name: &str, contents: &[u8]) {
        self.lock().inbox.insert(name.to_string(), contents.to_vec());
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    /// Number of `operation` calls addressing `name`.
    #[must_use]
    pub fn count(&self, operation: &str, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation && call.name == name)
            .count()
    }

    /// Names currently in the inbox.
    #[must_use]
    pub fn inbox_names(&self) -> Vec<String> {
        self.lock().inbox.keys().cloned().collect()
    }

    /// Names currently held in the load tier.
    #[must_use]
    pub fn load_tier_names(&self) -> Vec<String> {
        self.lock().load_tier.iter().cloned().collect()
    }

    /// Content of `name` in the outbox.
    #[must_use]
    pub fn outbox_file(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().outbox.get(name).cloned()
    }

    /// Persisted audit log for delivery `name`, as text.
    #[must_use]
    pub fn log_text(&self, name: &str) -> Option<String> {
        self.lock()
            .logs
            .get(&log_name(name))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn lock(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(
        &self,
        operation: &'static str,
        name: &str,
    ) -> StorageResult<MutexGuard<'_, StorageState>> {
        let mut state = self.lock();
        state.calls.push(StorageCall {
            operation,
            name: name.to_string(),
        });
        if state.panicking.contains(operation) {
            drop(state);
            panic!("{operation} panicked in test double");
        }
        if state.failing.contains(operation) {
            return Err(injected(operation, name, io::ErrorKind::Other));
        }
        Ok(state)
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_inbox(&self) -> Vec<DeliveryFile> {
        self.lock()
            .inbox
            .iter()
            .map(|(name, contents)| {
                DeliveryFile::new(name.clone(), name.clone(), contents.len() as u64)
            })
            .collect()
    }

    async fn read_file(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let state = self.enter("read_file", &file.name)?;
        state
            .inbox
            .get(&file.name)
            .cloned()
            .ok_or_else(|| injected("read_file", &file.name, io::ErrorKind::NotFound))
    }

    async fn stage_for_load(&self, file: &DeliveryFile) -> StorageResult<()> {
        let mut state = self.enter("stage_for_load", &file.name)?;
        if !state.inbox.contains_key(&file.name) {
            return Err(injected("stage_for_load", &file.name, io::ErrorKind::NotFound));
        }
        state.load_tier.insert(file.path.clone());
        Ok(())
    }

    async fn reclaim_after_load(&self, file: &DeliveryFile) -> StorageResult<()> {
        let mut state = self.enter("reclaim_after_load", &file.name)?;
        state.load_tier.remove(&file.path);
        Ok(())
    }

    async fn move_to_outbox(&self, file: &DeliveryFile) -> StorageResult<()> {
        let mut state = self.enter("move_to_outbox", &file.name)?;
        let contents = state
            .inbox
            .remove(&file.name)
            .ok_or_else(|| injected("move_to_outbox", &file.name, io::ErrorKind::NotFound))?;
        state.outbox.insert(file.name.clone(), contents);
        Ok(())
    }

    async fn write_log(&self, name: &str, contents: &[u8]) -> StorageResult<()> {
        let mut state = self.enter("write_log", name)?;
        state.logs.insert(log_name(name), contents.to_vec());
        Ok(())
    }

    async fn read_log(&self, file: &DeliveryFile) -> StorageResult<Vec<u8>> {
        let state = self.enter("read_log", &file.name)?;
        state
            .logs
            .get(&file.log_name())
            .cloned()
            .ok_or_else(|| injected("read_log", &file.name, io::ErrorKind::NotFound))
    }
}

fn injected(operation: &'static str, name: &str, kind: io::ErrorKind) -> StorageError {
    StorageError::Io {
        operation,
        path: PathBuf::from(name),
        source: io::Error::new(kind, "injected by test double"),
    }
}
