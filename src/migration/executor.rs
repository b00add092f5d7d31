use super::config::MigrationConfig;
use super::context::{MigrationServices, StepContext};
use super::registry::MigrationRegistry;
use super::step::{MigrationStep, StepPolicy};
use crate::core::{Result, StoreError};
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};

/// Outcome of one applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub version: u32,
    pub description: String,
    pub policy: StepPolicy,
    pub enhancement_failures: usize,
    pub referential_gaps: usize,
    pub elapsed_ms: u64,
}

/// Outcome of an `upgrade` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReport {
    pub store: String,
    pub from: u32,
    pub to: u32,
    pub steps: Vec<StepReport>,
}

impl UpgradeReport {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn enhancement_failures(&self) -> usize {
        self.steps.iter().map(|step| step.enhancement_failures).sum()
    }
}

/// Applies registry steps to a store, one committed step at a time.
#[derive(Debug, Clone)]
pub struct Migrator {
    registry: Arc<MigrationRegistry>,
    config: MigrationConfig,
    services: MigrationServices,
}

impl Migrator {
    pub fn new(registry: Arc<MigrationRegistry>) -> Self {
        Self {
            registry,
            config: MigrationConfig::default(),
            services: MigrationServices::default(),
        }
    }

    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_services(mut self, services: MigrationServices) -> Self {
        self.services = services;
        self
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Upgrades `store` from its current version to `to`.
    pub async fn upgrade_to(&self, store: &mut Store, to: u32) -> Result<UpgradeReport> {
        let from = store.schema_version();
        self.upgrade(store, from, to).await
    }

    /// Applies steps `(from, to]`. `from` must be the store's committed version, so a step
    /// can never be repeated or skipped. Each step commits on its own; if one fails the
    /// store stays at the last committed version.
    pub async fn upgrade(&self, store: &mut Store, from: u32, to: u32) -> Result<UpgradeReport> {
        let current = store.schema_version();
        if from != current || to < from {
            return Err(StoreError::OrderingViolation { from, to, current });
        }
        let steps = self.registry.steps_between(from, to)?;

        let mut report = UpgradeReport {
            store: store.name().to_string(),
            from,
            to,
            steps: Vec::with_capacity(steps.len()),
        };
        if steps.is_empty() {
            return Ok(report);
        }

        let span = info_span!("store.upgrade", store = %store.name(), from = from, to = to);
        async {
            for step in steps {
                let step_report = self.apply_step(store, step).await?;
                report.steps.push(step_report);
            }
            event!(
                Level::INFO,
                applied = report.steps.len(),
                enhancement_failures = report.enhancement_failures(),
                "upgrade complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn apply_step(&self, store: &mut Store, step: &MigrationStep) -> Result<StepReport> {
        let version = step.version();
        let span = info_span!("store.step", version = version, description = %step.description());
        async {
            let started = Instant::now();
            let ctx = StepContext::new(
                version,
                step.policy(),
                self.config.clone(),
                self.services.clone(),
            );

            let mut tx = store.begin(version);
            step.schema()
                .apply(&mut tx)
                .map_err(|err| err.in_step(version))?;
            if let Some(transform) = step.transform() {
                transform
                    .run(&mut tx, &ctx)
                    .await
                    .map_err(|err| err.in_step(version))?;
            }
            store.commit(tx).await?;

            let step_report = StepReport {
                version,
                description: step.description().to_string(),
                policy: step.policy(),
                enhancement_failures: ctx.enhancement_failures(),
                referential_gaps: ctx.referential_gaps(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            event!(
                Level::INFO,
                enhancement_failures = step_report.enhancement_failures,
                referential_gaps = step_report.referential_gaps,
                elapsed_ms = step_report.elapsed_ms,
                "step committed"
            );
            Ok(step_report)
        }
        .instrument(span)
        .await
        .inspect_err(|err| {
            event!(Level::ERROR, version = version, error = %err, "step failed, store left at previous version");
        })
    }
}
