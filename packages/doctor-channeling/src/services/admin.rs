use super::{bounded_limit, find_doctor, find_user, Changes};
use crate::auth::Identity;
use crate::error::{Error, ErrorKind};
use crate::identity::IdentityProvider;
use crate::log::ADMIN;
use crate::models::{Appointment, AppointmentStatus, User, APPOINTMENTS, USERS};
use crate::prometheus::ADMIN_STATS_DURATION_SECONDS;
use crate::store::{Direction, DocumentStore, DocumentStoreExt, Query};
use chrono::{DateTime, NaiveDate, Utc};
use metrics::histogram;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

const MAX_LIMIT: usize = 500;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_doctors: usize,
    pub verified_doctors: usize,
    pub pending_doctors: usize,
    pub total_patients: usize,
    pub total_appointments: usize,
    pub today_appointments: usize,
    pub total_revenue: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Pending,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DoctorListFilter {
    pub status: Option<VerificationStatus>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatientListFilter {
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppointmentListFilter {
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for PatientSummary {
    fn from(user: User) -> Self {
        PatientSummary {
            id: user.id,
            display_name: user.display_name,
            email: user.email,
            phone: user.phone,
            created_at: user.created_at,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_verified: Option<bool>,
}

///
/// Platform totals, computed by scanning users and appointments.
/// "Today" is the current UTC date.
///
pub async fn stats(store: &dyn DocumentStore, requester: &Identity) -> Result<Stats, Error> {
    requester.require_admin()?;
    let started = Instant::now();

    let doctors = store
        .query_as::<User>(&Query::collection(USERS).filter("role", "doctor"))
        .await?;
    let patients = store
        .query(&Query::collection(USERS).filter("role", "patient"))
        .await?;
    let appointments = store
        .query_as::<Appointment>(&Query::collection(APPOINTMENTS))
        .await?;

    let today = Utc::now().date_naive();
    let verified_doctors = doctors.iter().filter(|d| d.is_verified).count();

    let stats = Stats {
        total_doctors: doctors.len(),
        verified_doctors,
        pending_doctors: doctors.len() - verified_doctors,
        total_patients: patients.len(),
        total_appointments: appointments.len(),
        today_appointments: appointments.iter().filter(|a| a.date == today).count(),
        total_revenue: appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .map(|a| a.fee)
            .sum(),
    };

    histogram!(ADMIN_STATS_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    debug!(target: ADMIN, msg = "Computed stats", elapsed_ms = started.elapsed().as_millis() as u64);

    Ok(stats)
}

pub async fn list_doctors(
    store: &dyn DocumentStore,
    requester: &Identity,
    filter: DoctorListFilter,
) -> Result<Vec<User>, Error> {
    requester.require_admin()?;

    let mut query = Query::collection(USERS).filter("role", "doctor");
    if let Some(status) = filter.status {
        query = query.filter("isVerified", status == VerificationStatus::Verified);
    }

    store
        .query_as(&query.limit(bounded_limit(filter.limit, 20, MAX_LIMIT)))
        .await
}

pub async fn list_patients(
    store: &dyn DocumentStore,
    requester: &Identity,
    filter: PatientListFilter,
) -> Result<Vec<PatientSummary>, Error> {
    requester.require_admin()?;

    let patients = store
        .query_as::<User>(&Query::collection(USERS).filter("role", "patient"))
        .await?;

    let search = filter.search.filter(|s| !s.trim().is_empty());
    Ok(patients
        .into_iter()
        .filter(|p| search.as_ref().is_none_or(|s| p.matches_search(s)))
        .take(bounded_limit(filter.limit, 20, MAX_LIMIT))
        .map(PatientSummary::from)
        .collect())
}

pub async fn list_appointments(
    store: &dyn DocumentStore,
    requester: &Identity,
    filter: AppointmentListFilter,
) -> Result<Vec<Appointment>, Error> {
    requester.require_admin()?;

    let mut query = Query::collection(APPOINTMENTS);
    if let Some(status) = filter.status.filter(|s| !s.is_empty() && s != "all") {
        query = query.filter("status", status);
    }
    if let Some(date) = filter.date {
        query = query.filter("date", date.to_string());
    }

    let query = query
        .order_by("date", Direction::Descending)
        .limit(bounded_limit(filter.limit, 50, MAX_LIMIT));

    store.query_as(&query).await
}

///
/// Grants or revokes verification. A missing flag means verify.
///
pub async fn verify_doctor(
    store: &dyn DocumentStore,
    requester: &Identity,
    doctor_id: &str,
    verification: Verification,
) -> Result<bool, Error> {
    requester.require_admin()?;
    find_doctor(store, doctor_id).await?;

    let verified = verification.is_verified.unwrap_or(true);

    let mut changes = Changes::new();
    changes
        .value("isVerified", Some(verified))
        .value("verifiedAt", Some(super::now()))
        .value("verifiedBy", Some(requester.id.as_str()));
    store.update(USERS, doctor_id, changes.touch()).await?;

    info!(target: ADMIN, msg = "Doctor verification changed", doctor_id, verified, by = requester.id);
    Ok(verified)
}

///
/// Removes the account and the user profile.
/// Appointments, prescriptions and reviews are kept with their copied names.
///
pub async fn delete_user(
    store: &dyn DocumentStore,
    provider: &dyn IdentityProvider,
    requester: &Identity,
    id: &str,
) -> Result<(), Error> {
    requester.require_admin()?;

    if requester.id == id {
        return Err(Error::invalid_argument("Admins cannot delete their own account"));
    }

    let profile = find_user(store, id).await?;

    match provider.delete_account(id).await {
        Ok(()) => {}
        // Profiles can outlive their account, keep going so the profile is removed
        Err(err) if err.kind() == ErrorKind::NotFound && profile.is_some() => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(Error::NotFound("User")),
        Err(err) => return Err(err),
    }

    if profile.is_some() {
        store.delete(USERS, id).await?;
    }

    info!(target: ADMIN, msg = "User deleted", id, by = requester.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::identity::LocalIdentityProvider;
    use crate::models::Role;
    use crate::services::accounts::{self, Registration};
    use crate::services::appointments::{self, NewAppointment};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn identity(id: &str, role: Role) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            role,
        }
    }

    async fn put(store: &MemoryStore, user: User) {
        store.set(USERS, &user.id.clone(), &user, false).await.unwrap();
    }

    fn doctor(id: &str, verified: bool, fee: f64) -> User {
        User {
            id: id.to_string(),
            role: Role::Doctor,
            display_name: format!("Dr {id}"),
            consultation_fee: Some(fee),
            is_verified: verified,
            ..Default::default()
        }
    }

    fn patient(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            role: Role::Patient,
            display_name: name.to_string(),
            email: format!("{id}@example.com"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stats_count_doctors_patients_and_revenue() {
        let store = MemoryStore::new();
        put(&store, doctor("d1", true, 1000.0)).await;
        put(&store, doctor("d2", false, 3000.0)).await;
        put(&store, patient("p1", "Ann")).await;
        put(&store, patient("p2", "Bob")).await;

        let admin = identity("admin", Role::Admin);
        let p1 = identity("p1", Role::Patient);
        let today = Utc::now().date_naive().to_string();

        let book = |doctor: &str, date: &str| NewAppointment {
            doctor_id: doctor.to_string(),
            date: date.to_string(),
            time: "09:00".to_string(),
            notes: None,
        };

        let first = appointments::create(&store, &p1, book("d1", &today)).await.unwrap();
        let second = appointments::create(&store, &p1, book("d2", "2026-01-10")).await.unwrap();
        appointments::create(&store, &p1, book("d2", "2026-01-11")).await.unwrap();

        appointments::update_status(&store, &admin, &first.id, "completed").await.unwrap();
        appointments::update_status(&store, &admin, &second.id, "completed").await.unwrap();

        let stats = stats(&store, &admin).await.unwrap();
        assert_eq!(
            stats,
            Stats {
                total_doctors: 2,
                verified_doctors: 1,
                pending_doctors: 1,
                total_patients: 2,
                total_appointments: 3,
                today_appointments: 1,
                total_revenue: 4000.0,
            }
        );

        let err = super::stats(&store, &p1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn doctor_list_filters_by_verification() {
        let store = MemoryStore::new();
        put(&store, doctor("d1", true, 1000.0)).await;
        put(&store, doctor("d2", false, 3000.0)).await;
        let admin = identity("admin", Role::Admin);

        let all = list_doctors(&store, &admin, DoctorListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = list_doctors(
            &store,
            &admin,
            DoctorListFilter {
                status: Some(VerificationStatus::Pending),
                limit: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "d2");
    }

    #[tokio::test]
    async fn patient_list_searches_names_and_emails() {
        let store = MemoryStore::new();
        put(&store, patient("p1", "Ann Perera")).await;
        put(&store, patient("p2", "Bob Silva")).await;
        let admin = identity("admin", Role::Admin);

        let found = list_patients(
            &store,
            &admin,
            PatientListFilter {
                search: Some("perera".to_string()),
                limit: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name, "Ann Perera");

        let by_email = list_patients(
            &store,
            &admin,
            PatientListFilter {
                search: Some("P2@EXAMPLE".to_string()),
                limit: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(by_email[0].id, "p2");
    }

    #[tokio::test]
    async fn appointment_list_filters_by_status_and_date() {
        let store = MemoryStore::new();
        put(&store, doctor("d1", true, 1000.0)).await;
        put(&store, patient("p1", "Ann")).await;
        let admin = identity("admin", Role::Admin);
        let p1 = identity("p1", Role::Patient);

        for date in ["2026-01-10", "2026-01-12", "2026-01-11"] {
            appointments::create(
                &store,
                &p1,
                NewAppointment {
                    doctor_id: "d1".to_string(),
                    date: date.to_string(),
                    time: "09:00".to_string(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        }

        let all = list_appointments(&store, &admin, AppointmentListFilter::default())
            .await
            .unwrap();
        assert_eq!(all[0].date.to_string(), "2026-01-12");

        let on_day = list_appointments(
            &store,
            &admin,
            AppointmentListFilter {
                date: NaiveDate::from_ymd_opt(2026, 1, 11),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(on_day.len(), 1);

        let confirmed = list_appointments(
            &store,
            &admin,
            AppointmentListFilter {
                status: Some("confirmed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(confirmed.is_empty());
    }

    #[tokio::test]
    async fn verification_records_the_admin() {
        let store = MemoryStore::new();
        put(&store, doctor("d1", false, 1000.0)).await;
        put(&store, patient("p1", "Ann")).await;
        let admin = identity("admin-1", Role::Admin);

        let verified = verify_doctor(&store, &admin, "d1", Verification::default())
            .await
            .unwrap();
        assert!(verified);

        let user = find_user(&store, "d1").await.unwrap().unwrap();
        assert!(user.is_verified);
        assert_eq!(user.verified_by.as_deref(), Some("admin-1"));
        assert!(user.verified_at.is_some());

        let revoked = verify_doctor(
            &store,
            &admin,
            "d1",
            Verification {
                is_verified: Some(false),
            },
        )
        .await
        .unwrap();
        assert!(!revoked);

        let err = verify_doctor(&store, &admin, "p1", Verification::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Doctor not found");
    }

    #[tokio::test]
    async fn deleted_users_cannot_sign_in_and_appointments_remain() {
        let store = Arc::new(MemoryStore::new());
        let config = IdentityConfig {
            token_secret: "test-signing-key-do-not-use-in-production".to_string(),
            token_ttl: 3600,
            admin_email: None,
            admin_password: None,
        };
        let provider = LocalIdentityProvider::new(store.clone(), &config);
        put(&store, doctor("d1", true, 1000.0)).await;

        let ann = accounts::register(
            store.as_ref(),
            &provider,
            Registration {
                email: "ann@example.com".to_string(),
                password: "secret1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let ann_identity = identity(&ann.user.id, Role::Patient);
        let appointment = appointments::create(
            store.as_ref(),
            &ann_identity,
            NewAppointment {
                doctor_id: "d1".to_string(),
                date: "2026-01-10".to_string(),
                time: "09:00".to_string(),
                notes: None,
            },
        )
        .await
        .unwrap();

        let admin = identity("admin", Role::Admin);
        delete_user(store.as_ref(), &provider, &admin, &ann.user.id)
            .await
            .unwrap();

        assert!(find_user(store.as_ref(), &ann.user.id).await.unwrap().is_none());
        assert!(provider.verify_token(&ann.token).await.is_err());

        let kept = appointments::get(store.as_ref(), &admin, &appointment.id)
            .await
            .unwrap();
        assert_eq!(kept.patient_email, "ann@example.com");

        let err = delete_user(store.as_ref(), &provider, &admin, &ann.user.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = delete_user(store.as_ref(), &provider, &admin, "admin")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
