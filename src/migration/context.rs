use super::config::MigrationConfig;
use super::step::StepPolicy;
use crate::core::{Result, StoreError, Value};
use crate::services::{
    Clock, Dimensions, IdGenerator, ImageProbe, NoMedia, Preview, PreviewSynthesizer,
    RasterMedia, SystemClock, UuidGenerator,
};
use crate::transaction::StepTransaction;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{Level, event};

/// Table holding the local identity entry.
pub const USER_TABLE: &str = "user";
/// Key of the local identity entry inside [`USER_TABLE`].
pub const USER_ID_KEY: &str = "userId";

/// External collaborators steps may call into.
#[derive(Clone)]
pub struct MigrationServices {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub probe: Arc<dyn ImageProbe>,
    pub synthesizer: Arc<dyn PreviewSynthesizer>,
}

impl Default for MigrationServices {
    fn default() -> Self {
        let media = Arc::new(RasterMedia::new());
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            probe: media.clone(),
            synthesizer: media,
        }
    }
}

impl MigrationServices {
    /// Services whose image operations always fail; steps that need them degrade.
    pub fn without_media() -> Self {
        Self {
            probe: Arc::new(NoMedia),
            synthesizer: Arc::new(NoMedia),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ImageProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn PreviewSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }
}

impl std::fmt::Debug for MigrationServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationServices").finish_non_exhaustive()
    }
}

/// Everything a running step can see besides its transaction.
pub struct StepContext {
    version: u32,
    policy: StepPolicy,
    config: MigrationConfig,
    services: MigrationServices,
    enhancement_failures: AtomicUsize,
    referential_gaps: AtomicUsize,
}

impl StepContext {
    pub fn new(
        version: u32,
        policy: StepPolicy,
        config: MigrationConfig,
        services: MigrationServices,
    ) -> Self {
        Self {
            version,
            policy,
            config,
            services,
            enhancement_failures: AtomicUsize::new(0),
            referential_gaps: AtomicUsize::new(0),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn policy(&self) -> StepPolicy {
        self.policy
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn now_unix_ms(&self) -> i64 {
        self.services.clock.now_unix_ms()
    }

    pub fn new_id(&self) -> String {
        self.services.ids.new_id()
    }

    pub fn new_short_id(&self) -> String {
        self.services.ids.new_short_id()
    }

    pub fn enhancement_failures(&self) -> usize {
        self.enhancement_failures.load(Ordering::SeqCst)
    }

    pub fn referential_gaps(&self) -> usize {
        self.referential_gaps.load(Ordering::SeqCst)
    }

    /// Notes that a record points at something that no longer exists and was skipped.
    pub fn note_referential_gap(&self, table: &str, key: &str, target: &str) {
        self.referential_gaps.fetch_add(1, Ordering::SeqCst);
        event!(
            Level::DEBUG,
            version = self.version,
            table = %table,
            key = %key,
            target = %target,
            "skipping record with dangling reference"
        );
    }

    /// Reads the local identity. Steps that filter by ownership cannot run without it.
    pub fn local_user_id(&self, tx: &StepTransaction) -> Result<String> {
        tx.get(USER_TABLE, USER_ID_KEY)?
            .and_then(|entry| entry.get("value").and_then(Value::as_str).map(str::to_string))
            .ok_or(StoreError::MissingLocalIdentity)
    }

    /// Measures every `(key, bytes)` item, at most `max_concurrency` at a time.
    pub async fn measure_all(
        &self,
        items: Vec<(String, Vec<u8>)>,
    ) -> Result<BTreeMap<String, Dimensions>> {
        let probe = self.services.probe.clone();
        self.enhance_all("measure", items, self.config.probe_timeout_duration(), |bytes| {
            let probe = probe.clone();
            async move { probe.measure(&bytes).await }
        })
        .await
    }

    /// Synthesizes a preview for every `(key, bytes)` item, at most `max_concurrency` at a
    /// time.
    pub async fn preview_all(
        &self,
        items: Vec<(String, Vec<u8>)>,
    ) -> Result<BTreeMap<String, Preview>> {
        let synthesizer = self.services.synthesizer.clone();
        self.enhance_all("preview", items, self.config.preview_timeout_duration(), |bytes| {
            let synthesizer = synthesizer.clone();
            async move { synthesizer.synthesize(&bytes).await }
        })
        .await
    }

    /// Runs `op` for every item with bounded concurrency and a per-item timeout, and
    /// returns the successes by key. Failures follow the step policy: under `BestEffort`
    /// they are logged and counted, under `Critical` the first one (in key order) is
    /// returned.
    async fn enhance_all<T, F, Fut>(
        &self,
        operation: &'static str,
        items: Vec<(String, Vec<u8>)>,
        timeout: Duration,
        op: F,
    ) -> Result<BTreeMap<String, T>>
    where
        F: Fn(Vec<u8>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut outcomes: Vec<(String, Result<T>)> = stream::iter(items.into_iter().map(
            |(key, bytes)| {
                let work = op(bytes);
                async move {
                    let outcome = match tokio::time::timeout(timeout, work).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(StoreError::Codec(format!(
                            "{} timed out after {}ms",
                            operation,
                            timeout.as_millis()
                        ))),
                    };
                    (key, outcome)
                }
            },
        ))
        .buffer_unordered(self.config.effective_concurrency())
        .collect()
        .await;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut results = BTreeMap::new();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    results.insert(key, value);
                }
                Err(err) => self.enhancement_failed(operation, key, err)?,
            }
        }
        Ok(results)
    }

    /// Applies the step policy to one failed enhancement: logged and counted under
    /// `BestEffort`, returned as an error under `Critical`.
    pub fn enhancement_failed(&self, operation: &str, key: String, err: StoreError) -> Result<()> {
        match self.policy {
            StepPolicy::Critical => Err(StoreError::RecordEnhancementFailure {
                version: self.version,
                key,
                reason: err.to_string(),
            }),
            StepPolicy::BestEffort => {
                self.enhancement_failures.fetch_add(1, Ordering::SeqCst);
                event!(
                    Level::WARN,
                    version = self.version,
                    key = %key,
                    operation = operation,
                    error = %err,
                    "enhancement failed, record left without derived fields"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FixedClock, SequentialIds};
    use async_trait::async_trait;

    struct CountingProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ImageProbe for CountingProbe {
        async fn measure(&self, bytes: &[u8]) -> Result<Dimensions> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if bytes.is_empty() {
                return Err(StoreError::Codec("empty".to_string()));
            }
            Ok(Dimensions {
                width: bytes.len() as u32,
                height: 1,
            })
        }
    }

    fn context(policy: StepPolicy, probe: Arc<dyn ImageProbe>) -> StepContext {
        let services = MigrationServices::without_media()
            .with_clock(Arc::new(FixedClock::new(7)))
            .with_ids(Arc::new(SequentialIds::new("t")))
            .with_probe(probe);
        StepContext::new(15, policy, MigrationConfig::new().max_concurrency(2), services)
    }

    fn items() -> Vec<(String, Vec<u8>)> {
        vec![
            ("a".to_string(), vec![1, 2, 3]),
            ("b".to_string(), vec![]),
            ("c".to_string(), vec![1]),
            ("d".to_string(), vec![1, 2]),
        ]
    }

    #[tokio::test]
    async fn best_effort_skips_failures_and_respects_concurrency() {
        let probe = Arc::new(CountingProbe {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let ctx = context(StepPolicy::BestEffort, probe.clone());

        let measured = ctx.measure_all(items()).await.unwrap();
        assert_eq!(measured.len(), 3);
        assert_eq!(measured["a"].width, 3);
        assert!(!measured.contains_key("b"));
        assert_eq!(ctx.enhancement_failures(), 1);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn critical_policy_escalates() {
        let probe = Arc::new(CountingProbe {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let ctx = context(StepPolicy::Critical, probe);

        let err = ctx.measure_all(items()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::RecordEnhancementFailure { version: 15, ref key, .. } if key == "b"
        ));
    }

    /// Never answers for empty payloads.
    struct StalledMedia;

    #[async_trait]
    impl ImageProbe for StalledMedia {
        async fn measure(&self, bytes: &[u8]) -> Result<Dimensions> {
            if bytes.is_empty() {
                std::future::pending::<()>().await;
            }
            Ok(Dimensions {
                width: bytes.len() as u32,
                height: 1,
            })
        }
    }

    #[async_trait]
    impl PreviewSynthesizer for StalledMedia {
        async fn synthesize(&self, _bytes: &[u8]) -> Result<Preview> {
            std::future::pending().await
        }
    }

    fn stalled_context(policy: StepPolicy) -> StepContext {
        let media = Arc::new(StalledMedia);
        let services = MigrationServices::without_media()
            .with_probe(media.clone())
            .with_synthesizer(media);
        let config = MigrationConfig::new()
            .probe_timeout(Duration::from_millis(20))
            .preview_timeout(Duration::from_millis(20));
        StepContext::new(15, policy, config, services)
    }

    #[tokio::test]
    async fn stalled_probe_times_out_and_is_skipped() {
        let ctx = stalled_context(StepPolicy::BestEffort);

        let measured = tokio::time::timeout(Duration::from_secs(5), ctx.measure_all(items()))
            .await
            .expect("measure_all must not wait on a stalled probe")
            .unwrap();
        assert_eq!(measured.keys().collect::<Vec<_>>(), vec!["a", "c", "d"]);
        assert_eq!(ctx.enhancement_failures(), 1);
    }

    #[tokio::test]
    async fn stalled_probe_fails_a_critical_step() {
        let ctx = stalled_context(StepPolicy::Critical);

        let err = ctx.measure_all(items()).await.unwrap_err();
        match err {
            StoreError::RecordEnhancementFailure { version, key, reason } => {
                assert_eq!(version, 15);
                assert_eq!(key, "b");
                assert!(reason.contains("timed out"), "{}", reason);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_previews_all_time_out() {
        let ctx = stalled_context(StepPolicy::BestEffort);

        let previews = ctx.preview_all(items()).await.unwrap();
        assert!(previews.is_empty());
        assert_eq!(ctx.enhancement_failures(), 4);
    }

    #[tokio::test]
    async fn no_media_fails_every_preview() {
        let ctx = StepContext::new(
            19,
            StepPolicy::BestEffort,
            MigrationConfig::default(),
            MigrationServices::without_media(),
        );
        let previews = ctx.preview_all(items()).await.unwrap();
        assert!(previews.is_empty());
        assert_eq!(ctx.enhancement_failures(), 4);
    }

    #[test]
    fn local_user_id_requires_identity_entry() {
        use crate::core::Record;
        use crate::storage::{Table, TableDef};
        use im::OrdMap;

        let ctx = context(StepPolicy::Critical, Arc::new(NoMedia));
        let mut tables = OrdMap::new();
        tables.insert(USER_TABLE.to_string(), Table::new(TableDef::new(USER_TABLE, "key")));
        let mut tx = StepTransaction::new(30, tables);
        assert!(matches!(
            ctx.local_user_id(&tx),
            Err(StoreError::MissingLocalIdentity)
        ));

        tx.table_mut(USER_TABLE)
            .unwrap()
            .add(Record::new().with("key", USER_ID_KEY).with("value", "me"))
            .unwrap();
        assert_eq!(ctx.local_user_id(&tx).unwrap(), "me");
    }
}
