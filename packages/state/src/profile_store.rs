//! # ProfileStore — the single source of truth for client-side state
//!
//! [`ProfileStore`] holds the user's [`Profile`] and every logged collection in
//! memory and keeps them synchronized with one durable key-value slot. All
//! storage goes through the [`KeyValueStore`] trait, so the same logic works
//! against a [`store::SecureStorage`] over browser storage, a file directory, or
//! a plain in-memory map in tests.
//!
//! ## Load path
//!
//! | Stored blob | Result |
//! |-------------|--------|
//! | absent | Defaults plus the three starter medications; marked dirty so the seed is persisted. |
//! | present | JSON → [`migrate`](crate::migrate::migrate) → [`decode_state`]: missing or `null` fields defaulted, unreadable fields and entries dropped one by one → newest-first sort. |
//! | not JSON, not an object, or from a newer schema | Defaults, logged. Never seeds. The bad blob stays until the next persist overwrites it. |
//!
//! Afterwards the separately stored theme (see below) overrides the profile's
//! theme and is applied to the [`ThemeRoot`].
//!
//! ## Mutations
//!
//! One synchronous method per action. Mutations take fully formed entities
//! (callers generate ids and timestamps), do no validation, and return nothing.
//! Each bumps the state revision; with `autosave` on, a persist is spawned and
//! not awaited.
//!
//! ## Persistence
//!
//! [`flush`](ProfileStore::flush) writes the whole blob. Writes are serialized
//! behind an async lock that remembers the last persisted revision, and the
//! snapshot is taken while holding it, so:
//!
//! - several mutations between two flushes produce one write;
//! - a flush whose revision is already persisted does nothing;
//! - the blob that lands last is always the newest revision, however the
//!   underlying writes interleave.
//!
//! Nothing coordinates two processes sharing one slot: the last writer wins.
//!
//! ## Theme side channel
//!
//! [`set_theme`](ProfileStore::set_theme) also toggles the root class and
//! writes `"light"`/`"dark"` in plaintext under its own key, so a front-end can
//! apply the theme before the (possibly encrypted) blob is read.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use store::KeyValueStore;

use crate::config::StoreConfig;
use crate::decode::decode_state;
use crate::format;
use crate::models::*;
use crate::seed::starter_medications;
use crate::theme::{apply_theme, DetachedRoot, ThemeRoot};

/// Result of a [`ProfileStore::flush`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The blob for this revision was written.
    Written { revision: u64 },
    /// The current revision was already persisted.
    UpToDate,
    /// The state could not be serialized; nothing was written.
    Failed,
}

struct Tracked {
    data: PersistedState,
    revision: u64,
    /// `data.profile.timezone` as last resolved.
    zone_name: String,
    zone: Tz,
}

impl Tracked {
    fn new(data: PersistedState, revision: u64) -> Self {
        let zone_name = data.profile.timezone.clone();
        let zone = format::parse_timezone(&zone_name);
        Self {
            data,
            revision,
            zone_name,
            zone,
        }
    }

    /// Re-resolve the zone after the profile's timezone changed.
    fn sync_zone(&mut self) {
        if self.zone_name != self.data.profile.timezone {
            self.zone_name = self.data.profile.timezone.clone();
            self.zone = format::parse_timezone(&self.zone_name);
        }
    }
}

struct Inner<S, P> {
    storage: S,
    prefs: P,
    root: Arc<dyn ThemeRoot>,
    config: StoreConfig,
    state: Mutex<Tracked>,
    /// Last persisted revision. Held for the duration of a write.
    persisted: tokio::sync::Mutex<u64>,
}

impl<S, P> Inner<S, P> {
    fn state(&self) -> MutexGuard<'_, Tracked> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder returned by [`ProfileStore::builder`].
pub struct ProfileStoreBuilder<S, P> {
    storage: S,
    prefs: P,
    config: StoreConfig,
    root: Option<Arc<dyn ThemeRoot>>,
}

impl<S, P> ProfileStoreBuilder<S, P>
where
    S: KeyValueStore + 'static,
    P: KeyValueStore + 'static,
{
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn theme_root(mut self, root: Arc<dyn ThemeRoot>) -> Self {
        self.root = Some(root);
        self
    }

    /// Read the persisted state and build the store.
    pub async fn load(self) -> ProfileStore<S, P> {
        let Self {
            storage,
            prefs,
            config,
            root,
        } = self;
        let root = root.unwrap_or_else(|| Arc::new(DetachedRoot::new()));

        let (mut data, revision) = match storage.get(&config.storage.state_key).await {
            None => {
                tracing::info!("No persisted state found, starting fresh");
                let mut data = PersistedState::default();
                if config.persistence.seed_starter_medications {
                    data.medications = starter_medications(Utc::now());
                }
                (data, 1)
            }
            Some(raw) => match decode_state(&raw) {
                Ok(data) => (data, 0),
                Err(e) => {
                    tracing::warn!("Discarding unreadable persisted state: {}", e);
                    (PersistedState::default(), 0)
                }
            },
        };

        if let Some(stored) = prefs.get(&config.storage.theme_key).await {
            match stored.parse::<Theme>() {
                Ok(theme) => data.profile.settings.display.theme = theme,
                Err(e) => tracing::warn!("Ignoring stored theme: {}", e),
            }
        }
        apply_theme(root.as_ref(), data.profile.settings.display.theme);

        let store = ProfileStore {
            inner: Arc::new(Inner {
                storage,
                prefs,
                root,
                config,
                state: Mutex::new(Tracked::new(data, revision)),
                persisted: tokio::sync::Mutex::new(0),
            }),
        };
        if revision > 0 {
            store.schedule_persist();
        }
        store
    }
}

/// Persisted profile and logged-entity store. Cloning yields another handle to
/// the same state.
pub struct ProfileStore<S, P> {
    inner: Arc<Inner<S, P>>,
}

impl<S, P> Clone for ProfileStore<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, P> ProfileStore<S, P>
where
    S: KeyValueStore + 'static,
    P: KeyValueStore + 'static,
{
    /// Start building a store that keeps its blob in `storage` and the theme
    /// preference in `prefs`.
    pub fn builder(storage: S, prefs: P) -> ProfileStoreBuilder<S, P> {
        ProfileStoreBuilder {
            storage,
            prefs,
            config: StoreConfig::default(),
            root: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    // -- persistence ---------------------------------------------------------

    /// Persist the current state if it has changed since the last write.
    pub async fn flush(&self) -> FlushOutcome {
        let mut persisted = self.inner.persisted.lock().await;
        let (revision, encoded) = {
            let tracked = self.inner.state();
            if tracked.revision <= *persisted {
                return FlushOutcome::UpToDate;
            }
            (tracked.revision, serde_json::to_string(&tracked.data))
        };
        let json = match encoded {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize state revision {}: {}", revision, e);
                return FlushOutcome::Failed;
            }
        };

        self.inner
            .storage
            .set(&self.inner.config.storage.state_key, &json)
            .await;
        *persisted = revision;
        tracing::debug!("Persisted state revision {} ({} bytes)", revision, json.len());
        FlushOutcome::Written { revision }
    }

    /// Current in-memory revision. Bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.inner.state().revision
    }

    /// Whether there are mutations not yet persisted.
    pub async fn is_dirty(&self) -> bool {
        let persisted = *self.inner.persisted.lock().await;
        self.revision() > persisted
    }

    fn schedule_persist(&self) {
        if !self.inner.config.persistence.autosave {
            return;
        }
        let store = self.clone();

        #[cfg(all(target_arch = "wasm32", feature = "web"))]
        wasm_bindgen_futures::spawn_local(async move {
            store.flush().await;
        });

        #[cfg(not(all(target_arch = "wasm32", feature = "web")))]
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.flush().await;
                });
            }
            Err(_) => tracing::debug!("No async runtime, persist deferred until flush"),
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut PersistedState)) {
        {
            let mut tracked = self.inner.state();
            apply(&mut tracked.data);
            tracked.sync_zone();
            tracked.revision += 1;
        }
        self.schedule_persist();
    }

    // -- readers -------------------------------------------------------------

    pub fn snapshot(&self) -> PersistedState {
        self.inner.state().data.clone()
    }

    pub fn profile(&self) -> Profile {
        self.inner.state().data.profile.clone()
    }

    pub fn theme(&self) -> Theme {
        self.inner.state().data.profile.settings.display.theme
    }

    pub fn sessions(&self) -> Vec<DialysisSession> {
        self.inner.state().data.sessions.clone()
    }

    pub fn weights(&self) -> Vec<WeightReading> {
        self.inner.state().data.weights.clone()
    }

    pub fn fluids(&self) -> Vec<FluidIntake> {
        self.inner.state().data.fluids.clone()
    }

    pub fn medications(&self) -> Vec<Medication> {
        self.inner.state().data.medications.clone()
    }

    pub fn vitals(&self) -> Vec<VitalReading> {
        self.inner.state().data.vitals.clone()
    }

    pub fn meals(&self) -> Vec<MealLog> {
        self.inner.state().data.meals.clone()
    }

    pub fn moods(&self) -> Vec<MoodLog> {
        self.inner.state().data.moods.clone()
    }

    pub fn saved_reports(&self) -> Vec<SavedReport> {
        self.inner.state().data.saved_reports.clone()
    }

    // -- derived views -------------------------------------------------------

    /// The profile's timezone, UTC if unset or unknown. Resolved when the
    /// profile changes, not on every call.
    pub fn timezone(&self) -> Tz {
        self.inner.state().zone
    }

    /// Millilitres logged on `date` in the profile's timezone, saturating at
    /// `u32::MAX`.
    pub fn fluid_total_on(&self, date: NaiveDate) -> u32 {
        let tracked = self.inner.state();
        tracked
            .data
            .fluids
            .iter()
            .filter(|f| format::local_date(f.timestamp, tracked.zone) == date)
            .fold(0u32, |total, f| total.saturating_add(f.amount))
    }

    /// Daily limit minus intake on `date`, never below zero.
    pub fn fluid_remaining_on(&self, date: NaiveDate) -> u32 {
        let limit = self.inner.state().data.profile.daily_fluid_limit;
        limit.saturating_sub(self.fluid_total_on(date))
    }

    pub fn latest_weight(&self) -> Option<WeightReading> {
        self.inner.state().data.weights.first().cloned()
    }

    /// Latest weight minus the dry-weight goal, in kilograms.
    pub fn weight_above_dry(&self) -> Option<f64> {
        let tracked = self.inner.state();
        let latest = tracked.data.weights.first()?;
        let goal = tracked.data.profile.dry_weight_goal?;
        Some(latest.weight - goal)
    }

    /// Saved reports the current plan still allows.
    pub fn saved_report_slots_left(&self) -> u32 {
        let tracked = self.inner.state();
        let quota = tracked.data.profile.subscription.quotas.saved_reports;
        let used = u32::try_from(tracked.data.saved_reports.len()).unwrap_or(u32::MAX);
        quota.saturating_sub(used)
    }

    // -- mutations -----------------------------------------------------------

    pub fn add_session(&self, session: DialysisSession) {
        self.mutate(|s| insert_chronological(&mut s.sessions, session));
    }

    pub fn remove_session(&self, id: &str) {
        self.mutate(|s| s.sessions.retain(|e| e.id != id));
    }

    pub fn add_weight(&self, reading: WeightReading) {
        self.mutate(|s| insert_chronological(&mut s.weights, reading));
    }

    pub fn remove_weight(&self, id: &str) {
        self.mutate(|s| s.weights.retain(|e| e.id != id));
    }

    pub fn add_fluid(&self, intake: FluidIntake) {
        self.mutate(|s| insert_chronological(&mut s.fluids, intake));
    }

    pub fn remove_fluid(&self, id: &str) {
        self.mutate(|s| s.fluids.retain(|e| e.id != id));
    }

    pub fn add_medication(&self, medication: Medication) {
        self.mutate(|s| s.medications.push(medication));
    }

    /// Replace the medication with the same id. Unknown ids are ignored.
    pub fn update_medication(&self, medication: Medication) {
        self.mutate(|s| {
            match s.medications.iter_mut().find(|m| m.id == medication.id) {
                Some(existing) => *existing = medication,
                None => tracing::debug!("No medication {} to update", medication.id),
            }
        });
    }

    pub fn remove_medication(&self, id: &str) {
        self.mutate(|s| s.medications.retain(|e| e.id != id));
    }

    pub fn add_vital(&self, reading: VitalReading) {
        self.mutate(|s| insert_chronological(&mut s.vitals, reading));
    }

    pub fn remove_vital(&self, id: &str) {
        self.mutate(|s| s.vitals.retain(|e| e.id != id));
    }

    pub fn add_meal(&self, meal: MealLog) {
        self.mutate(|s| insert_chronological(&mut s.meals, meal));
    }

    pub fn remove_meal(&self, id: &str) {
        self.mutate(|s| s.meals.retain(|e| e.id != id));
    }

    pub fn add_mood(&self, mood: MoodLog) {
        self.mutate(|s| insert_chronological(&mut s.moods, mood));
    }

    pub fn remove_mood(&self, id: &str) {
        self.mutate(|s| s.moods.retain(|e| e.id != id));
    }

    pub fn add_saved_report(&self, report: SavedReport) {
        self.mutate(|s| insert_chronological(&mut s.saved_reports, report));
    }

    pub fn remove_saved_report(&self, id: &str) {
        self.mutate(|s| s.saved_reports.retain(|e| e.id != id));
    }

    /// Replace the whole profile.
    pub fn set_profile(&self, profile: Profile) {
        self.mutate(|s| s.profile = profile);
    }

    pub fn update_profile(&self, patch: ProfilePatch) {
        self.mutate(|s| s.profile.apply(patch));
    }

    /// Apply the onboarding answers and mark onboarding done.
    pub fn complete_onboarding(&self, patch: ProfilePatch) {
        self.mutate(|s| {
            s.profile.apply(patch);
            s.profile.onboarding_complete = true;
        });
    }

    /// Switch theme: profile field, root class, and the standalone theme key.
    pub async fn set_theme(&self, theme: Theme) {
        let changed = {
            let mut tracked = self.inner.state();
            let display = &mut tracked.data.profile.settings.display;
            let changed = display.theme != theme;
            if changed {
                display.theme = theme;
                tracked.revision += 1;
            }
            changed
        };

        apply_theme(self.inner.root.as_ref(), theme);
        self.inner
            .prefs
            .set(&self.inner.config.storage.theme_key, theme.as_str())
            .await;

        if changed {
            self.schedule_persist();
        }
    }

    /// Replace everything with an imported state as a single revision.
    pub async fn import(&self, mut state: PersistedState) {
        state.schema_version = CURRENT_SCHEMA_VERSION;
        state.sort_chronological();
        let theme = state.profile.settings.display.theme;
        self.mutate(|s| *s = state);

        apply_theme(self.inner.root.as_ref(), theme);
        self.inner
            .prefs
            .set(&self.inner.config.storage.theme_key, theme.as_str())
            .await;
    }

    /// Wipe persisted data (including the session key) and return to defaults.
    pub async fn reset(&self) {
        let mut persisted = self.inner.persisted.lock().await;
        self.inner.storage.clear().await;
        self.inner
            .prefs
            .remove(&self.inner.config.storage.theme_key)
            .await;
        {
            let mut tracked = self.inner.state();
            tracked.data = PersistedState::default();
            tracked.sync_zone();
            tracked.revision += 1;
            *persisted = tracked.revision;
        }
        apply_theme(self.inner.root.as_ref(), Theme::default());
        tracing::info!("Local state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use store::{MemoryStore, SecureStorage};

    use crate::theme::DARK_CLASS;

    type Secure = SecureStorage<MemoryStore, MemoryStore>;

    struct Fixture {
        durable: MemoryStore,
        session: MemoryStore,
        prefs: MemoryStore,
        root: Arc<DetachedRoot>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                durable: MemoryStore::new(),
                session: MemoryStore::new(),
                prefs: MemoryStore::new(),
                root: Arc::new(DetachedRoot::new()),
            }
        }

        fn secure(&self) -> Secure {
            SecureStorage::new(self.durable.clone(), self.session.clone())
        }

        async fn load(&self) -> ProfileStore<Secure, MemoryStore> {
            self.load_with(StoreConfig::default().with_autosave(false)).await
        }

        async fn load_with(&self, config: StoreConfig) -> ProfileStore<Secure, MemoryStore> {
            ProfileStore::builder(self.secure(), self.prefs.clone())
                .config(config)
                .theme_root(self.root.clone())
                .load()
                .await
        }

        async fn persist_raw(&self, json: &str) {
            self.secure().set("renalcare-state", json).await;
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn weight(id: &str, ts: DateTime<Utc>, kg: f64) -> WeightReading {
        WeightReading {
            id: id.to_string(),
            timestamp: ts,
            weight: kg,
            notes: String::new(),
        }
    }

    fn fluid(id: &str, ts: DateTime<Utc>, ml: u32) -> FluidIntake {
        FluidIntake {
            id: id.to_string(),
            timestamp: ts,
            amount: ml,
            beverage: "water".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_run_seeds_starter_medications() {
        let fx = Fixture::new();
        let store = fx.load().await;

        let meds = store.medications();
        assert_eq!(meds.len(), 3);
        assert_eq!(meds[0].id, "starter-sevelamer");
        assert_eq!(store.profile(), Profile::default());

        // The seed is pending persistence
        assert!(store.is_dirty().await);
        assert_eq!(store.flush().await, FlushOutcome::Written { revision: 1 });

        // Reloading finds the persisted blob and does not seed again
        let reloaded = fx.load().await;
        assert_eq!(reloaded.medications().len(), 3);
        assert!(!reloaded.is_dirty().await);
    }

    #[tokio::test]
    async fn test_existing_empty_blob_never_seeds() {
        let fx = Fixture::new();
        fx.persist_raw("{}").await;

        let store = fx.load().await;
        assert!(store.medications().is_empty());
        assert_eq!(store.snapshot(), PersistedState::default());
    }

    #[tokio::test]
    async fn test_deleting_all_medications_does_not_reseed() {
        let fx = Fixture::new();
        let store = fx.load().await;
        for med in store.medications() {
            store.remove_medication(&med.id);
        }
        store.flush().await;

        assert!(fx.load().await.medications().is_empty());
    }

    #[tokio::test]
    async fn test_partial_profile_is_default_filled() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"profile":{"name":"Alice"}}"#).await;

        let profile = fx.load().await.profile();
        assert_eq!(profile.name, "Alice");
        assert_eq!(profile.daily_fluid_limit, 1500);
        assert_eq!(profile.subscription.plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_merge_preserves_every_stored_field() {
        let fx = Fixture::new();
        fx.persist_raw(
            r#"{
                "weights": [{"id": "w1", "timestamp": "2024-03-01T08:00:00Z", "weight": 71.2}],
                "profile": {
                    "timezone": "Europe/Berlin",
                    "dryWeightGoal": 69.5,
                    "subscription": {"plan": "pro", "features": {"pdfExport": true}},
                    "settings": {
                        "notifications": {"fluidAlerts": false},
                        "customReminders": {"fluids": [{"time": "10:00", "days": ["Mon"]}]},
                        "units": {"weight": "lb"},
                        "bpThresholds": {"diastolicLow": 55}
                    }
                }
            }"#,
        )
        .await;

        let store = fx.load().await;
        let profile = store.profile();

        // stored values kept
        assert_eq!(profile.timezone, "Europe/Berlin");
        assert_eq!(profile.dry_weight_goal, Some(69.5));
        assert_eq!(profile.subscription.plan, Plan::Pro);
        assert!(profile.subscription.features.pdf_export);
        assert!(!profile.settings.notifications.fluid_alerts);
        assert_eq!(profile.settings.custom_reminders.fluids[0].time, "10:00");
        assert_eq!(profile.settings.units.weight, WeightUnit::Lb);
        assert_eq!(profile.settings.bp_thresholds.diastolic_low, 55);
        assert_eq!(store.weights()[0].weight, 71.2);

        // missing values defaulted
        assert_eq!(profile.daily_fluid_limit, 1500);
        assert_eq!(profile.subscription.status, SubscriptionStatus::Active);
        assert!(!profile.subscription.features.ai_insights);
        assert!(profile.settings.notifications.medication_reminders);
        assert!(profile.settings.custom_reminders.medications.is_empty());
        assert_eq!(profile.settings.units.fluid, FluidUnit::Ml);
        assert_eq!(profile.settings.bp_thresholds.systolic_high, 140);
        assert_eq!(profile.settings.display.theme, Theme::Light);
        assert!(store.medications().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_loads_defaults() {
        let prefs = MemoryStore::new();
        let plain = MemoryStore::new();
        plain.set("renalcare-state", "{\"profile\": {").await;

        let store = ProfileStore::builder(plain.clone(), prefs)
            .config(StoreConfig::default().with_autosave(false))
            .load()
            .await;

        assert_eq!(store.snapshot(), PersistedState::default());
        assert!(!store.is_dirty().await);
        // The corrupt blob is left until the next write
        assert_eq!(
            plain.get("renalcare-state").await.as_deref(),
            Some("{\"profile\": {")
        );
    }

    #[tokio::test]
    async fn test_mistyped_field_takes_default_alone() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"profile":{"name":"Eve","dailyFluidLimit":"lots"}}"#)
            .await;

        let profile = fx.load().await.profile();
        assert_eq!(profile.name, "Eve");
        assert_eq!(profile.daily_fluid_limit, 1500);
    }

    #[tokio::test]
    async fn test_null_entity_field_does_not_discard_blob() {
        let fx = Fixture::new();
        fx.persist_raw(
            r#"{"weights":[{"id":"w1","timestamp":"2024-03-01T08:00:00Z","weight":71.2,"notes":null}],
                "profile":{"name":"Alice","dailyFluidLimit":1200}}"#,
        )
        .await;

        let store = fx.load().await;
        assert_eq!(store.profile().name, "Alice");
        assert_eq!(store.profile().daily_fluid_limit, 1200);
        assert_eq!(store.weights().len(), 1);
        assert!(!store.is_dirty().await);
    }

    #[tokio::test]
    async fn test_future_schema_loads_defaults() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"schemaVersion":7,"profile":{"name":"Zed"}}"#).await;
        assert_eq!(fx.load().await.profile().name, "");
    }

    #[tokio::test]
    async fn test_legacy_blob_is_migrated_on_load() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"profile":{"name":"Old","settings":{"theme":"dark"}}}"#)
            .await;

        let store = fx.load().await;
        assert_eq!(store.profile().name, "Old");
        assert_eq!(store.theme(), Theme::Dark);
        assert!(fx.root.has_class(DARK_CLASS));
        assert_eq!(store.snapshot().schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_blob_is_encrypted_at_rest() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.complete_onboarding(ProfilePatch {
            name: Some("Alice".to_string()),
            ..Default::default()
        });
        store.flush().await;

        let raw = fx.durable.get("renalcare-state").await.unwrap();
        assert!(!raw.contains("Alice"));
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_err());

        let reloaded = fx.load().await;
        assert_eq!(reloaded.profile().name, "Alice");
        assert!(reloaded.profile().onboarding_complete);
    }

    #[tokio::test]
    async fn test_unencrypted_config_writes_plain_json() {
        let fx = Fixture::new();
        let config = StoreConfig::default()
            .with_autosave(false)
            .with_encryption(false);
        let storage = config
            .storage
            .secure_storage(fx.durable.clone(), fx.session.clone());
        let store = ProfileStore::builder(storage, fx.prefs.clone())
            .config(config)
            .load()
            .await;
        store.flush().await;

        let raw = fx.durable.get("renalcare-state").await.unwrap();
        let blob: PersistedState = serde_json::from_str(&raw).unwrap();
        assert_eq!(blob.medications.len(), 3);
        assert!(fx.session.is_empty());
    }

    #[tokio::test]
    async fn test_weights_sorted_newest_first() {
        let fx = Fixture::new();
        let store = fx.load().await;

        store.add_weight(weight("t2", at(2, 8), 71.0));
        store.add_weight(weight("t1", at(1, 8), 72.0));
        store.add_weight(weight("t3", at(3, 8), 70.5));

        let ids: Vec<_> = store.weights().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, ["t3", "t2", "t1"]);

        store.flush().await;
        let ids: Vec<_> = fx.load().await.weights().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, ["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn test_unsorted_blob_is_sorted_on_load() {
        let fx = Fixture::new();
        fx.persist_raw(
            r#"{"moods":[
                {"id":"old","timestamp":"2024-01-01T00:00:00Z","mood":2},
                {"id":"new","timestamp":"2024-02-01T00:00:00Z","mood":4}
            ]}"#,
        )
        .await;
        let moods = fx.load().await.moods();
        assert_eq!(moods[0].id, "new");
        assert_eq!(moods[1].id, "old");
    }

    #[tokio::test]
    async fn test_set_theme_is_idempotent() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.flush().await;

        store.set_theme(Theme::Dark).await;
        let revision = store.revision();
        assert!(fx.root.has_class(DARK_CLASS));
        assert_eq!(fx.prefs.get("renalcare-theme").await.as_deref(), Some("dark"));

        store.set_theme(Theme::Dark).await;
        assert_eq!(fx.root.classes(), vec![DARK_CLASS.to_string()]);
        assert_eq!(fx.prefs.get("renalcare-theme").await.as_deref(), Some("dark"));
        assert_eq!(store.revision(), revision);

        store.set_theme(Theme::Light).await;
        assert!(!fx.root.has_class(DARK_CLASS));
        assert_eq!(fx.prefs.get("renalcare-theme").await.as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn test_theme_key_overrides_blob() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"profile":{"settings":{"display":{"theme":"light"}}}}"#)
            .await;
        fx.prefs.set("renalcare-theme", "dark").await;

        let store = fx.load().await;
        assert_eq!(store.theme(), Theme::Dark);
        assert!(fx.root.has_class(DARK_CLASS));

        // Garbage in the theme key is ignored
        let fx = Fixture::new();
        fx.prefs.set("renalcare-theme", "neon").await;
        assert_eq!(fx.load().await.theme(), Theme::Light);
    }

    #[tokio::test]
    async fn test_flush_coalesces_mutations() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.flush().await;
        let base = store.revision();

        store.add_weight(weight("a", at(1, 7), 70.0));
        store.add_fluid(fluid("f", at(1, 9), 250));
        store.update_profile(ProfilePatch {
            daily_fluid_limit: Some(1200),
            ..Default::default()
        });

        assert_eq!(
            store.flush().await,
            FlushOutcome::Written { revision: base + 3 }
        );
        assert_eq!(store.flush().await, FlushOutcome::UpToDate);

        let reloaded = fx.load().await;
        assert_eq!(reloaded.weights().len(), 1);
        assert_eq!(reloaded.fluids().len(), 1);
        assert_eq!(reloaded.profile().daily_fluid_limit, 1200);
    }

    #[tokio::test]
    async fn test_latest_mutation_wins_across_interleaved_flushes() {
        let fx = Fixture::new();
        let store = fx.load().await;

        let writer = store.clone();
        let mutator = store.clone();
        let (first, second) = tokio::join!(writer.flush(), async move {
            mutator.add_weight(weight("late", at(5, 8), 69.0));
            mutator.flush().await
        });

        assert!(matches!(first, FlushOutcome::Written { .. }));
        assert!(matches!(
            second,
            FlushOutcome::Written { .. } | FlushOutcome::UpToDate
        ));
        assert!(!store.is_dirty().await);
        assert_eq!(fx.load().await.weights()[0].id, "late");
    }

    #[tokio::test]
    async fn test_autosave_persists_without_flush() {
        let fx = Fixture::new();
        let store = fx.load_with(StoreConfig::default()).await;

        store.add_mood(MoodLog {
            id: "m1".to_string(),
            timestamp: at(4, 20),
            mood: 4,
            energy: Some(3),
            notes: String::new(),
        });

        for _ in 0..10 {
            if !store.is_dirty().await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!store.is_dirty().await);
        assert_eq!(fx.load().await.moods()[0].id, "m1");
    }

    #[tokio::test]
    async fn test_entity_add_remove() {
        let fx = Fixture::new();
        let store = fx.load().await;

        store.add_meal(MealLog {
            id: "meal".to_string(),
            timestamp: at(2, 12),
            meal_type: MealType::Lunch,
            description: "Rice and chicken".to_string(),
            sodium: Some(600),
            potassium: Some(350),
            phosphorus: None,
            protein: Some(30.0),
        });
        store.add_saved_report(SavedReport {
            id: "r".to_string(),
            created_at: at(3, 9),
            name: "March".to_string(),
            kind: "fluid".to_string(),
            range_start: at(1, 0),
            range_end: at(31, 0),
            metrics: vec!["fluids".to_string()],
        });
        store.add_vital(VitalReading {
            id: "v".to_string(),
            timestamp: at(2, 7),
            systolic: 150,
            diastolic: 85,
            heart_rate: Some(72),
            temperature: None,
            oxygen_saturation: Some(97),
        });
        store.add_session(DialysisSession {
            id: "s".to_string(),
            timestamp: at(2, 6),
            modality: Modality::Hemodialysis,
            duration_minutes: 240,
            pre_weight: Some(72.4),
            post_weight: Some(70.1),
            ultrafiltration: Some(2300),
            notes: String::new(),
        });
        assert_eq!(store.meals().len(), 1);
        assert_eq!(store.saved_reports().len(), 1);
        assert_eq!(store.saved_report_slots_left(), 2);
        assert_eq!(store.vitals().len(), 1);
        assert_eq!(store.sessions()[0].ultrafiltration, Some(2300));

        store.remove_meal("meal");
        store.remove_saved_report("r");
        store.remove_vital("v");
        store.remove_session("s");
        store.remove_mood("missing");

        let snapshot = store.snapshot();
        assert!(snapshot.meals.is_empty());
        assert!(snapshot.saved_reports.is_empty());
        assert!(snapshot.vitals.is_empty());
        assert!(snapshot.sessions.is_empty());
        assert_eq!(store.saved_report_slots_left(), 3);
    }

    #[tokio::test]
    async fn test_update_medication() {
        let fx = Fixture::new();
        let store = fx.load().await;

        let mut med = store.medications()[1].clone();
        med.dosage = "0.5 mcg".to_string();
        med.active = false;
        store.update_medication(med);

        let meds = store.medications();
        assert_eq!(meds[1].dosage, "0.5 mcg");
        assert!(!meds[1].active);
        assert_eq!(meds.len(), 3);

        let mut stray = meds[0].clone();
        stray.id = "nope".to_string();
        store.update_medication(stray);
        assert_eq!(store.medications(), meds);
    }

    #[tokio::test]
    async fn test_complete_onboarding() {
        let fx = Fixture::new();
        let store = fx.load().await;

        store.complete_onboarding(ProfilePatch {
            name: Some("Dana".to_string()),
            email: Some("dana@example.com".to_string()),
            timezone: Some("America/Chicago".to_string()),
            daily_fluid_limit: Some(1000),
            dry_weight_goal: Some(64.0),
            preferred_modality: Some(Modality::Peritoneal),
        });

        let profile = store.profile();
        assert!(profile.onboarding_complete);
        assert_eq!(profile.email, "dana@example.com");
        assert_eq!(profile.preferred_modality, Modality::Peritoneal);
        assert_eq!(profile.subscription, Subscription::default());
    }

    #[tokio::test]
    async fn test_fluid_totals_use_profile_timezone() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.update_profile(ProfilePatch {
            timezone: Some("America/New_York".to_string()),
            daily_fluid_limit: Some(1000),
            ..Default::default()
        });

        // Mar 2 02:00 UTC is the evening of Mar 1 in New York
        store.add_fluid(fluid("a", at(1, 15), 300));
        store.add_fluid(fluid("b", at(2, 2), 400));
        store.add_fluid(fluid("c", at(2, 15), 500));

        let mar1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mar2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(store.fluid_total_on(mar1), 700);
        assert_eq!(store.fluid_total_on(mar2), 500);
        assert_eq!(store.fluid_remaining_on(mar1), 300);

        store.add_fluid(fluid("d", at(2, 16), 900));
        assert_eq!(store.fluid_remaining_on(mar2), 0);
    }

    #[tokio::test]
    async fn test_fluid_total_saturates() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.add_fluid(fluid("a", at(1, 8), 3_000_000_000));
        store.add_fluid(fluid("b", at(1, 9), 3_000_000_000));

        let mar1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(store.fluid_total_on(mar1), u32::MAX);
        assert_eq!(store.fluid_remaining_on(mar1), 0);
    }

    #[tokio::test]
    async fn test_timezone_follows_profile_changes() {
        let fx = Fixture::new();
        fx.persist_raw(r#"{"profile":{"timezone":"Asia/Tokyo"}}"#).await;
        let store = fx.load().await;
        assert_eq!(store.timezone(), chrono_tz::Asia::Tokyo);

        store.update_profile(ProfilePatch {
            timezone: Some("Mars/Olympus_Mons".to_string()),
            ..Default::default()
        });
        assert_eq!(store.timezone(), Tz::UTC);
        assert_eq!(store.profile().timezone, "Mars/Olympus_Mons");

        let mut profile = store.profile();
        profile.timezone = "Europe/Berlin".to_string();
        store.set_profile(profile);
        assert_eq!(store.timezone(), chrono_tz::Europe::Berlin);

        store.reset().await;
        assert_eq!(store.timezone(), Tz::UTC);
    }

    #[tokio::test]
    async fn test_weight_above_dry() {
        let fx = Fixture::new();
        let store = fx.load().await;
        assert!(store.weight_above_dry().is_none());

        store.add_weight(weight("old", at(1, 8), 73.0));
        assert!(store.weight_above_dry().is_none());

        store.update_profile(ProfilePatch {
            dry_weight_goal: Some(70.0),
            ..Default::default()
        });
        store.add_weight(weight("new", at(2, 8), 71.5));
        assert_eq!(store.latest_weight().unwrap().id, "new");
        assert!((store.weight_above_dry().unwrap() - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_import_replaces_state() {
        let fx = Fixture::new();
        let store = fx.load().await;

        let mut incoming = PersistedState::default();
        incoming.schema_version = 0;
        incoming.profile.name = "Imported".to_string();
        incoming.profile.settings.display.theme = Theme::Dark;
        incoming.weights = vec![weight("a", at(1, 8), 70.0), weight("b", at(3, 8), 71.0)];

        let before = store.revision();
        store.import(incoming).await;
        assert_eq!(store.revision(), before + 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(snapshot.weights[0].id, "b");
        assert!(snapshot.medications.is_empty());
        assert!(fx.root.has_class(DARK_CLASS));
        assert_eq!(fx.prefs.get("renalcare-theme").await.as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn test_reset_wipes_storage_and_key() {
        let fx = Fixture::new();
        let store = fx.load().await;
        store.set_theme(Theme::Dark).await;
        store.flush().await;
        assert!(!fx.session.is_empty());

        store.reset().await;

        assert!(fx.durable.get("renalcare-state").await.is_none());
        assert!(fx.session.get("renalcare-key").await.is_none());
        assert!(fx.prefs.get("renalcare-theme").await.is_none());
        assert!(!fx.root.has_class(DARK_CLASS));
        assert_eq!(store.snapshot(), PersistedState::default());
        assert_eq!(store.flush().await, FlushOutcome::UpToDate);

        // Next load is a first run again
        assert_eq!(fx.load().await.medications().len(), 3);
    }

    #[tokio::test]
    async fn test_independent_instances_do_not_interfere() {
        let a = Fixture::new();
        let b = Fixture::new();
        let store_a = a.load().await;
        let store_b = b.load().await;

        store_a.add_weight(weight("only-a", at(1, 8), 70.0));
        assert!(store_b.weights().is_empty());
    }
}
