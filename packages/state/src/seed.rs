//! Starter data for a brand-new install.

use chrono::{DateTime, Utc};

use crate::models::Medication;

/// The three example medications shown to a first-run user so the list is
/// not empty. Only ever used when no blob has been persisted at all.
pub fn starter_medications(now: DateTime<Utc>) -> Vec<Medication> {
    vec![
        Medication {
            id: "starter-sevelamer".to_string(),
            name: "Sevelamer carbonate".to_string(),
            dosage: "800 mg".to_string(),
            frequency: "Three times daily with meals".to_string(),
            times: vec!["08:00".to_string(), "12:30".to_string(), "18:30".to_string()],
            active: true,
            created_at: now,
        },
        Medication {
            id: "starter-calcitriol".to_string(),
            name: "Calcitriol".to_string(),
            dosage: "0.25 mcg".to_string(),
            frequency: "Once daily".to_string(),
            times: vec!["08:00".to_string()],
            active: true,
            created_at: now,
        },
        Medication {
            id: "starter-renal-vitamin".to_string(),
            name: "Renal multivitamin".to_string(),
            dosage: "1 tablet".to_string(),
            frequency: "Once daily after dialysis".to_string(),
            times: vec!["20:00".to_string()],
            active: true,
            created_at: now,
        },
    ]
}
