//! # Domain models — profile, logged entities, and the persisted blob
//!
//! Every type here is `Serialize + Deserialize` with camelCase field names,
//! matching the JSON the browser app has always written.
//!
//! ## Forward-compatible loading
//!
//! Structs that make up the [`Profile`] carry a container-level
//! `#[serde(default)]`, so any field missing from a stored blob is taken from
//! the type's `Default` while every field that *is* present keeps its stored
//! value. This is what lets an older blob load after new settings are added.
//! Renames and moves are handled separately by [`crate::migrate`].
//!
//! ## Types
//!
//! | Type | Represents |
//! |------|-----------|
//! | [`Profile`] | User settings and preferences aggregate (not an auth identity). |
//! | [`Subscription`] | Plan tier, status, billing period, [`Quotas`] and [`Features`]. |
//! | [`Settings`] | [`Notifications`], [`CustomReminders`], [`Units`], [`DisplaySettings`], [`BpThresholds`]. |
//! | [`DialysisSession`], [`WeightReading`], [`FluidIntake`], [`Medication`], [`VitalReading`], [`MealLog`], [`MoodLog`], [`SavedReport`] | Logged entities. |
//! | [`PersistedState`] | The blob written to storage. |
//! | [`ProfilePatch`] | Partial profile update used by onboarding and edits. |

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub email: String,
    /// IANA zone name, e.g. "America/Chicago".
    pub timezone: String,
    /// Millilitres per day.
    pub daily_fluid_limit: u32,
    /// Target post-dialysis weight in kilograms.
    pub dry_weight_goal: Option<f64>,
    pub preferred_modality: Modality,
    pub onboarding_complete: bool,
    pub subscription: Subscription,
    pub settings: Settings,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            timezone: "UTC".to_string(),
            daily_fluid_limit: 1500,
            dry_weight_goal: None,
            preferred_modality: Modality::default(),
            onboarding_complete: false,
            subscription: Subscription::default(),
            settings: Settings::default(),
        }
    }
}

impl Profile {
    /// Apply every `Some` field of `patch`.
    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(timezone) = patch.timezone {
            self.timezone = timezone;
        }
        if let Some(limit) = patch.daily_fluid_limit {
            self.daily_fluid_limit = limit;
        }
        if let Some(goal) = patch.dry_weight_goal {
            self.dry_weight_goal = Some(goal);
        }
        if let Some(modality) = patch.preferred_modality {
            self.preferred_modality = modality;
        }
    }
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub timezone: Option<String>,
    pub daily_fluid_limit: Option<u32>,
    pub dry_weight_goal: Option<f64>,
    pub preferred_modality: Option<Modality>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Hemodialysis,
    HomeHemodialysis,
    Peritoneal,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub billing_interval: Option<BillingInterval>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub quotas: Quotas,
    pub features: Features,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Whether `feature` is unlocked on an active subscription.
    pub fn allows(&self, feature: Feature) -> bool {
        self.is_active() && self.features.get(feature)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Plus,
    Pro,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Plus => "plus",
            Plan::Pro => "pro",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Trialing,
    PastDue,
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Quotas {
    pub ai_insights_per_month: u32,
    pub saved_reports: u32,
    pub exports_per_month: u32,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            ai_insights_per_month: 3,
            saved_reports: 3,
            exports_per_month: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feature {
    AiInsights,
    AdvancedReports,
    PdfExport,
    CareTeamSharing,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Features {
    pub ai_insights: bool,
    pub advanced_reports: bool,
    pub pdf_export: bool,
    pub care_team_sharing: bool,
}

impl Features {
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::AiInsights => self.ai_insights,
            Feature::AdvancedReports => self.advanced_reports,
            Feature::PdfExport => self.pdf_export,
            Feature::CareTeamSharing => self.care_team_sharing,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub notifications: Notifications,
    pub custom_reminders: CustomReminders,
    pub units: Units,
    pub display: DisplaySettings,
    pub bp_thresholds: BpThresholds,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Notifications {
    pub medication_reminders: bool,
    pub appointment_reminders: bool,
    pub fluid_alerts: bool,
    pub weight_reminders: bool,
    pub insight_digest: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            medication_reminders: true,
            appointment_reminders: true,
            fluid_alerts: true,
            weight_reminders: false,
            insight_digest: false,
        }
    }
}

/// Per-category reminder schedules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomReminders {
    pub medications: Vec<Reminder>,
    pub fluids: Vec<Reminder>,
    pub weights: Vec<Reminder>,
    pub appointments: Vec<Reminder>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Local wall-clock time, "HH:MM".
    pub time: String,
    /// Empty means every day.
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Units {
    pub weight: WeightUnit,
    pub fluid: FluidUnit,
    pub temperature: TemperatureUnit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn from_kg(self, kg: f64) -> f64 {
        match self {
            WeightUnit::Kg => kg,
            WeightUnit::Lb => kg * 2.204_622_6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FluidUnit {
    #[default]
    Ml,
    Oz,
}

impl FluidUnit {
    pub fn from_ml(self, ml: f64) -> f64 {
        match self {
            FluidUnit::Ml => ml,
            FluidUnit::Oz => ml / 29.573_53,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FluidUnit::Ml => "ml",
            FluidUnit::Oz => "oz",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "c")]
    Celsius,
    #[serde(rename = "f")]
    Fahrenheit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    pub theme: Theme,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme {other:?}")),
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blood-pressure alert thresholds in mmHg.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BpThresholds {
    pub systolic_high: u32,
    pub systolic_low: u32,
    pub diastolic_high: u32,
    pub diastolic_low: u32,
}

impl Default for BpThresholds {
    fn default() -> Self {
        Self {
            systolic_high: 140,
            systolic_low: 90,
            diastolic_high: 90,
            diastolic_low: 60,
        }
    }
}

impl BpThresholds {
    /// Whether a reading falls outside the configured band.
    pub fn is_alert(&self, reading: &VitalReading) -> bool {
        reading.systolic > self.systolic_high
            || reading.systolic < self.systolic_low
            || reading.diastolic > self.diastolic_high
            || reading.diastolic < self.diastolic_low
    }
}

// ---------------------------------------------------------------------------
// Logged entities
// ---------------------------------------------------------------------------

/// Entities kept newest-first in their collection.
pub trait Chronological {
    fn occurred_at(&self) -> DateTime<Utc>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialysisSession {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub modality: Modality,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub pre_weight: Option<f64>,
    #[serde(default)]
    pub post_weight: Option<f64>,
    /// Fluid removed, millilitres.
    #[serde(default)]
    pub ultrafiltration: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightReading {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Kilograms.
    pub weight: f64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluidIntake {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Millilitres.
    pub amount: u32,
    #[serde(default)]
    pub beverage: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    /// Scheduled local times, "HH:MM".
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalReading {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub systolic: u32,
    pub diastolic: u32,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    /// Degrees Celsius.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub oxygen_saturation: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meal_type: MealType,
    #[serde(default)]
    pub description: String,
    /// Milligrams.
    #[serde(default)]
    pub sodium: Option<u32>,
    /// Milligrams.
    #[serde(default)]
    pub potassium: Option<u32>,
    /// Milligrams.
    #[serde(default)]
    pub phosphorus: Option<u32>,
    /// Grams.
    #[serde(default)]
    pub protein: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// 1 (worst) to 5 (best).
    pub mood: u8,
    #[serde(default)]
    pub energy: Option<u8>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReport {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Vec<String>,
}

macro_rules! chronological {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl Chronological for $ty {
                fn occurred_at(&self) -> DateTime<Utc> {
                    self.$field
                }
            }
        )*
    };
}

chronological! {
    DialysisSession => timestamp,
    WeightReading => timestamp,
    FluidIntake => timestamp,
    VitalReading => timestamp,
    MealLog => timestamp,
    MoodLog => timestamp,
    SavedReport => created_at,
}

// ---------------------------------------------------------------------------
// Persisted blob
// ---------------------------------------------------------------------------

/// The whole locally persisted state, written wholesale on every persist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedState {
    pub schema_version: u32,
    pub sessions: Vec<DialysisSession>,
    pub weights: Vec<WeightReading>,
    pub fluids: Vec<FluidIntake>,
    pub medications: Vec<Medication>,
    pub vitals: Vec<VitalReading>,
    pub meals: Vec<MealLog>,
    pub moods: Vec<MoodLog>,
    pub saved_reports: Vec<SavedReport>,
    pub profile: Profile,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            sessions: Vec::new(),
            weights: Vec::new(),
            fluids: Vec::new(),
            medications: Vec::new(),
            vitals: Vec::new(),
            meals: Vec::new(),
            moods: Vec::new(),
            saved_reports: Vec::new(),
            profile: Profile::default(),
        }
    }
}

impl PersistedState {
    /// Re-establish newest-first order on every chronological collection.
    pub fn sort_chronological(&mut self) {
        sort_newest_first(&mut self.sessions);
        sort_newest_first(&mut self.weights);
        sort_newest_first(&mut self.fluids);
        sort_newest_first(&mut self.vitals);
        sort_newest_first(&mut self.meals);
        sort_newest_first(&mut self.moods);
        sort_newest_first(&mut self.saved_reports);
    }
}

/// Insert `item` at its newest-first position. Ties go after existing entries.
pub fn insert_chronological<T: Chronological>(items: &mut Vec<T>, item: T) {
    let at = item.occurred_at();
    let index = items.partition_point(|existing| existing.occurred_at() >= at);
    items.insert(index, item);
}

/// Stable newest-first sort.
pub fn sort_newest_first<T: Chronological>(items: &mut [T]) {
    items.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
}
