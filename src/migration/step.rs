use super::context::StepContext;
use crate::core::Result;
use crate::storage::TableDef;
use crate::transaction::StepTransaction;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a step treats failures of its optional per-record enhancements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepPolicy {
    /// Any failure aborts the step, and with it the upgrade.
    #[default]
    Critical,
    /// Enhancement failures are logged and the record proceeds without the derived field.
    BestEffort,
}

/// A transform that only touches records already in the transaction.
pub type RecordTransformFn =
    Arc<dyn Fn(&mut StepTransaction, &StepContext) -> Result<()> + Send + Sync>;

/// A transform that waits on external work (image decoding, preview synthesis).
pub type AsyncTransformFn = Arc<
    dyn for<'a> Fn(&'a mut StepTransaction, &'a StepContext) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub enum StepTransform {
    Records(RecordTransformFn),
    Async(AsyncTransformFn),
}

impl StepTransform {
    pub async fn run(&self, tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
        match self {
            Self::Records(transform) => transform(tx, ctx),
            Self::Async(transform) => transform(tx, ctx).await,
        }
    }
}

/// Tables and indexes a step adds before its transform runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDelta {
    pub create_tables: Vec<TableDef>,
    pub add_indexes: Vec<(String, String)>,
}

impl SchemaDelta {
    pub fn is_empty(&self) -> bool {
        self.create_tables.is_empty() && self.add_indexes.is_empty()
    }

    pub fn apply(&self, tx: &mut StepTransaction) -> Result<()> {
        for def in &self.create_tables {
            tx.create_table(def.clone())?;
        }
        for (table, field) in &self.add_indexes {
            tx.add_index(table, field)?;
        }
        Ok(())
    }
}

/// One numbered upgrade: a schema delta plus an optional data transform.
///
/// A transform is written against the exact record shapes the previous step leaves
/// behind and does not re-validate them. It is only correct when every earlier step has
/// run, in order.
#[derive(Clone)]
pub struct MigrationStep {
    version: u32,
    description: String,
    schema: SchemaDelta,
    transform: Option<StepTransform>,
    policy: StepPolicy,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("has_transform", &self.transform.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl MigrationStep {
    /// Creates a step with an empty schema delta and no transform.
    pub fn new(version: u32, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            schema: SchemaDelta::default(),
            transform: None,
            policy: StepPolicy::Critical,
        }
    }

    pub fn create_table(mut self, def: TableDef) -> Self {
        self.schema.create_tables.push(def);
        self
    }

    pub fn add_index(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.schema.add_indexes.push((table.into(), field.into()));
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&mut StepTransaction, &StepContext) -> Result<()> + Send + Sync + 'static,
    {
        self.transform = Some(StepTransform::Records(Arc::new(transform)));
        self
    }

    pub fn with_async_transform<F>(mut self, transform: F) -> Self
    where
        F: for<'a> Fn(&'a mut StepTransaction, &'a StepContext) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(StepTransform::Async(Arc::new(transform)));
        self
    }

    pub fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn best_effort(self) -> Self {
        self.with_policy(StepPolicy::BestEffort)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &SchemaDelta {
        &self.schema
    }

    pub fn transform(&self) -> Option<&StepTransform> {
        self.transform.as_ref()
    }

    pub fn policy(&self) -> StepPolicy {
        self.policy
    }
}
