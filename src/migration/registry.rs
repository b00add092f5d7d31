use super::step::MigrationStep;
use crate::core::{Result, StoreError};

/// The ordered, immutable set of upgrade steps `1..=latest`.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
    stable_version: u32,
}

impl MigrationRegistry {
    pub fn builder() -> MigrationRegistryBuilder {
        MigrationRegistryBuilder::default()
    }

    /// Highest registered version.
    pub fn latest_version(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Version a store is upgraded to when the caller names no target.
    pub fn stable_version(&self) -> u32 {
        self.stable_version
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn step_for(&self, version: u32) -> Result<&MigrationStep> {
        if version == 0 {
            return Err(self.unknown(version));
        }
        self.steps
            .get(version as usize - 1)
            .ok_or_else(|| self.unknown(version))
    }

    /// Steps `(from, to]` in application order.
    pub fn steps_between(&self, from: u32, to: u32) -> Result<Vec<&MigrationStep>> {
        if to > self.latest_version() {
            return Err(self.unknown(to));
        }
        ((from + 1)..=to).map(|version| self.step_for(version)).collect()
    }

    fn unknown(&self, requested: u32) -> StoreError {
        StoreError::UnknownVersion {
            requested,
            latest: self.latest_version(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MigrationRegistryBuilder {
    steps: Vec<MigrationStep>,
    stable_version: Option<u32>,
}

impl MigrationRegistryBuilder {
    /// Appends a step, validating it immediately. Steps must arrive as `1, 2, 3, ...`.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        let expected = self.steps.len() as u32 + 1;
        if step.version() == 0 {
            return Err(StoreError::InvalidRegistry(
                "Step version must be >= 1".to_string(),
            ));
        }
        if self.steps.iter().any(|existing| existing.version() == step.version()) {
            return Err(StoreError::InvalidRegistry(format!(
                "Duplicate step for version {}",
                step.version()
            )));
        }
        if step.version() != expected {
            return Err(StoreError::InvalidRegistry(format!(
                "Step {} leaves a gap, expected step {}",
                step.version(),
                expected
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Sets the default target. Without it the latest step is the default.
    pub fn stable_version(mut self, version: u32) -> Self {
        self.stable_version = Some(version);
        self
    }

    pub fn build(self) -> Result<MigrationRegistry> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.version() as usize != index + 1 {
                return Err(StoreError::InvalidRegistry(format!(
                    "Missing step {} before step {}",
                    index + 1,
                    step.version()
                )));
            }
        }

        let latest = self.steps.len() as u32;
        let stable_version = self.stable_version.unwrap_or(latest);
        if stable_version > latest {
            return Err(StoreError::InvalidRegistry(format!(
                "Stable version {} exceeds latest registered step {}",
                stable_version, latest
            )));
        }

        Ok(MigrationRegistry {
            steps: self.steps,
            stable_version,
        })
    }
}
