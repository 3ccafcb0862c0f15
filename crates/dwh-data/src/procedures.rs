//! Named warehouse procedures invoked by the delivery pipeline.
//!
//! # Design
//! - Each procedure is a positional call; argument order must match the database definition.
//! - Results are returned as raw records so callers can log whatever the procedure reports.

use std::sync::Arc;

use tracing::debug;

use crate::client::RemoteOperations;
use crate::error::{DataError, DataResult};
use crate::record::{Param, Record};

/// Processing stage used when resolving the agreement of a fresh delivery.
pub const INITIAL_STAGE: i32 = 1;

const AGREEMENT_FIND_CALL: &str = r"SELECT * FROM meta.agreement_find($1, $2)";

const DELIVERY_LOAD_CALL: &str = r"SELECT * FROM meta.delivery_load($1, $2, $3, $4)";

const DELIVERY_VALIDATE_CALL: &str = r"SELECT * FROM meta.delivery_validate($1)";

const DELIVERY_PUBLISH_CALL: &str = r"SELECT * FROM meta.delivery_publish($1)";

const DELIVERY_TRIGGER_CALL: &str = r"SELECT * FROM meta.delivery_trigger($1)";

/// Agreement that owns a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    /// Agreement identifier.
    pub id: i64,
    /// Load procedure registered for the agreement, when any.
    pub procedure: Option<String>,
}

impl Agreement {
    fn from_record(record: &Record) -> DataResult<Self> {
        let id = record
            .get_i64("agreement_id")
            .or_else(|| record.get_i64("id"))
            .ok_or(DataError::MissingColumn {
                procedure: "agreement_find",
                column: "agreement_id",
            })?;
        Ok(Self {
            id,
            procedure: record
                .get_str("procedure")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        })
    }
}

/// Typed wrappers over the delivery procedures.
#[derive(Clone)]
pub struct Procedures {
    ops: Arc<dyn RemoteOperations>,
}

impl Procedures {
    /// Wrap a remote operation client.
    #[must_use]
    pub fn new(ops: Arc<dyn RemoteOperations>) -> Self {
        Self { ops }
    }

    /// Resolve the agreement that owns `file_name` at `stage`.
    ///
    /// Returns `Ok(None)` when no agreement matches, or when the only match
    /// carries a zero identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup itself fails or the result lacks an
    /// agreement identifier.
    pub async fn agreement_find(&self, file_name: &str, stage: i32) -> DataResult<Option<Agreement>> {
        let records = self
            .ops
            .exec(AGREEMENT_FIND_CALL, &[Param::from(file_name), Param::from(stage)])
            .await?;
        let Some(first) = records.first() else {
            debug!(file = file_name, "no agreement matched");
            return Ok(None);
        };
        let agreement = Agreement::from_record(first)?;
        Ok((agreement.id != 0).then_some(agreement))
    }

    /// Bulk load a staged delivery.
    ///
    /// # Errors
    ///
    /// Returns an error when the size does not fit a database integer or the
    /// procedure fails.
    pub async fn delivery_load(
        &self,
        path: &str,
        name: &str,
        owner: &str,
        size: u64,
    ) -> DataResult<Vec<Record>> {
        let size = i64::try_from(size).map_err(|_| DataError::ArgumentOutOfRange { field: "size" })?;
        self.ops
            .exec(
                DELIVERY_LOAD_CALL,
                &[
                    Param::from(path),
                    Param::from(name),
                    Param::from(owner),
                    Param::from(size),
                ],
            )
            .await
    }

    /// Validate a loaded delivery.
    ///
    /// # Errors
    ///
    /// Returns an error when the procedure fails.
    pub async fn delivery_validate(&self, name: &str) -> DataResult<Vec<Record>> {
        self.ops
            .exec(DELIVERY_VALIDATE_CALL, &[Param::from(name)])
            .await
    }

    /// Publish a validated delivery.
    ///
    /// # Errors
    ///
    /// Returns an error when the procedure fails.
    pub async fn delivery_publish(&self, name: &str) -> DataResult<Vec<Record>> {
        self.ops
            .exec(DELIVERY_PUBLISH_CALL, &[Param::from(name)])
            .await
    }

    /// Fire downstream triggers for a published delivery.
    ///
    /// # Errors
    ///
    /// Returns an error when the procedure fails.
    pub async fn delivery_trigger(&self, name: &str) -> DataResult<Vec<Record>> {
        self.ops
            .exec(DELIVERY_TRIGGER_CALL, &[Param::from(name)])
            .await
    }

    /// Submit an agreement definition script verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error when the script fails; nothing is committed in that case.
    pub async fn run_script(&self, text: &str) -> DataResult<()> {
        self.ops.exec_script(text).await
    }
}
