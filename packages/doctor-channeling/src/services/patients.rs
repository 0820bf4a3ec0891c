use super::{bounded_limit, find_user};
use crate::auth::Identity;
use crate::error::Error;
use crate::log::PATIENT;
use crate::models::{Appointment, Prescription, APPOINTMENTS, PRESCRIPTIONS};
use crate::store::{Direction, DocumentStore, DocumentStoreExt, Query};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RosterFilter {
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: String,
    pub age: Option<u32>,
    pub blood_group: String,
    pub total_visits: usize,
    pub last_visit: NaiveDate,
}

#[derive(Clone, Debug)]
pub struct Roster {
    pub patients: Vec<RosterEntry>,
    /// Number of matching patients before the limit is applied
    pub total: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct History {
    pub appointments: Vec<Appointment>,
    pub prescriptions: Vec<Prescription>,
}

///
/// Patients who booked with the requesting doctor, most recent booking first.
/// Patients whose user record has been deleted are skipped.
///
pub async fn roster(
    store: &dyn DocumentStore,
    requester: &Identity,
    filter: RosterFilter,
) -> Result<Roster, Error> {
    requester.require_doctor()?;

    let appointments = store
        .query_as::<Appointment>(
            &Query::collection(APPOINTMENTS)
                .filter("doctorId", requester.id.as_str())
                .order_by("createdAt", Direction::Descending),
        )
        .await?;

    // (visits, last visit) per patient, in order of first appearance
    let mut order = Vec::new();
    let mut visits: HashMap<String, (usize, NaiveDate)> = HashMap::new();
    for appointment in &appointments {
        visits
            .entry(appointment.patient_id.clone())
            .and_modify(|(count, _)| *count += 1)
            .or_insert_with(|| {
                order.push(appointment.patient_id.clone());
                (1, appointment.date)
            });
    }

    let today = Utc::now().date_naive();
    let search = filter.search.filter(|s| !s.trim().is_empty());

    let mut patients = Vec::new();
    for patient_id in order {
        let Some(user) = find_user(store, &patient_id).await? else {
            debug!(target: PATIENT, msg = "Skipping deleted patient", patient_id);
            continue;
        };

        if let Some(search) = &search {
            if !user.matches_search(search) {
                continue;
            }
        }

        let (total_visits, last_visit) = visits[&patient_id];
        patients.push(RosterEntry {
            age: user.age_on(today),
            id: patient_id,
            name: user.display_name,
            email: user.email,
            phone: user.phone,
            gender: user.gender,
            blood_group: user.blood_group,
            total_visits,
            last_visit,
        });
    }

    let total = patients.len();
    patients.truncate(bounded_limit(filter.limit, DEFAULT_LIMIT, MAX_LIMIT));

    Ok(Roster { patients, total })
}

///
/// Appointments and prescriptions between the requesting doctor and one patient
///
pub async fn history(
    store: &dyn DocumentStore,
    requester: &Identity,
    patient_id: &str,
) -> Result<History, Error> {
    requester.require_doctor()?;

    let appointments = store
        .query_as::<Appointment>(
            &Query::collection(APPOINTMENTS)
                .filter("patientId", patient_id)
                .filter("doctorId", requester.id.as_str())
                .order_by("date", Direction::Descending),
        )
        .await?;

    let prescriptions = store
        .query_as::<Prescription>(
            &Query::collection(PRESCRIPTIONS)
                .filter("patientId", patient_id)
                .filter("doctorId", requester.id.as_str())
                .order_by("createdAt", Direction::Descending),
        )
        .await?;

    Ok(History {
        appointments,
        prescriptions,
    })
}
