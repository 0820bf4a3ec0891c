use super::{bounded_limit, find_doctor, find_user, Changes};
use crate::auth::Identity;
use crate::error::Error;
use crate::fields;
use crate::log::DIRECTORY;
use crate::models::{
    DoctorDetail, DoctorSummary, Review, Schedule, User, APPOINTMENTS, REVIEWS, SCHEDULES, USERS,
};
use crate::prometheus::REVIEWS_TOTAL;
use crate::store::{to_document, Direction, Document, DocumentStore, DocumentStoreExt, Query, WriteBatch};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::info;
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;
const RECENT_REVIEWS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoctorSort {
    /// Highest rated first
    Rating,
    /// Most experienced first
    Experience,
    /// Cheapest first
    Fee,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DoctorFilter {
    pub specialty: Option<String>,
    pub sort: Option<DoctorSort>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct DoctorPage {
    pub doctors: Vec<DoctorSummary>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfileUpdate {
    pub specialty: Option<String>,
    pub qualification: Option<String>,
    pub hospital: Option<String>,
    pub location: Option<String>,
    pub experience: Option<u32>,
    pub consultation_fee: Option<f64>,
    pub about: Option<String>,
    pub education: Option<Vec<String>>,
    pub services: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewReview {
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

fn compare_doctors(sort: DoctorSort, a: &User, b: &User) -> Ordering {
    match sort {
        DoctorSort::Rating => b.rating.total_cmp(&a.rating),
        DoctorSort::Experience => b.experience.cmp(&a.experience),
        DoctorSort::Fee => a
            .consultation_fee
            .unwrap_or(0.0)
            .total_cmp(&b.consultation_fee.unwrap_or(0.0)),
    }
}

///
/// Public doctor search. Unverified doctors are never listed.
///
pub async fn list_doctors(store: &dyn DocumentStore, filter: DoctorFilter) -> Result<DoctorPage, Error> {
    let mut query = Query::collection(USERS)
        .filter("role", "doctor")
        .filter("isVerified", true);

    if let Some(specialty) = filter.specialty.filter(|s| !s.is_empty()) {
        query = query.filter("specialty", specialty);
    }

    let mut doctors = store.query_as::<User>(&query).await?;

    if let Some(sort) = filter.sort {
        doctors.sort_by(|a, b| compare_doctors(sort, a, b));
    }

    let limit = bounded_limit(filter.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let page = filter.page.unwrap_or(1).max(1);
    let total = doctors.len();

    let doctors = doctors
        .iter()
        .skip(page.saturating_sub(1).saturating_mul(limit))
        .take(limit)
        .map(DoctorSummary::from)
        .collect();

    Ok(DoctorPage {
        doctors,
        pagination: Pagination { page, limit, total },
    })
}

/// Schedule document without its store id, or an empty object
async fn schedule_document(store: &dyn DocumentStore, doctor_id: &str) -> Result<Value, Error> {
    let mut document = store.get(SCHEDULES, doctor_id).await?.unwrap_or_default();
    document.remove("id");
    Ok(Value::Object(document))
}

pub async fn get_doctor(store: &dyn DocumentStore, id: &str) -> Result<DoctorDetail, Error> {
    let doctor = find_doctor(store, id).await?;
    let schedule = schedule_document(store, id).await?;

    let reviews = store
        .query_as::<Review>(
            &Query::collection(REVIEWS)
                .filter("doctorId", id)
                .order_by("createdAt", Direction::Descending)
                .limit(RECENT_REVIEWS),
        )
        .await?;

    Ok(DoctorDetail {
        summary: DoctorSummary::from(&doctor),
        patient_count: doctor.patient_count,
        about: doctor.about,
        education: doctor.education,
        services: doctor.services,
        schedule,
        reviews,
    })
}

pub async fn update_profile(
    store: &dyn DocumentStore,
    requester: &Identity,
    update: DoctorProfileUpdate,
) -> Result<(), Error> {
    requester.require_doctor()?;
    find_user(store, &requester.id)
        .await?
        .ok_or(Error::NotFound("User"))?;

    let mut changes = Changes::new();
    changes
        .text("specialty", update.specialty)
        .text("qualification", update.qualification)
        .text("hospital", update.hospital)
        .text("location", update.location)
        .value("experience", update.experience)
        .value("consultationFee", update.consultation_fee)
        .text("about", update.about)
        .list("education", update.education)
        .list("services", update.services)
        .list("languages", update.languages);

    store.update(USERS, &requester.id, changes.touch()).await?;

    info!(target: DIRECTORY, msg = "Doctor profile updated", id = requester.id);
    Ok(())
}

///
/// Merges the given weekdays into the requesting doctor's schedule.
/// Booked appointments are not checked against the new slots.
///
pub async fn set_schedule(
    store: &dyn DocumentStore,
    requester: &Identity,
    mut schedule: Schedule,
) -> Result<(), Error> {
    requester.require_doctor()?;
    schedule.validate()?;

    schedule.updated_at = Some(Utc::now());
    store.set(SCHEDULES, &requester.id, &schedule, true).await?;

    info!(target: DIRECTORY, msg = "Schedule updated", id = requester.id);
    Ok(())
}

pub async fn get_schedule(store: &dyn DocumentStore, doctor_id: &str) -> Result<Value, Error> {
    schedule_document(store, doctor_id).await
}

///
/// Records a review and recomputes the doctor's rating in one batch.
/// Only patients with a completed appointment with the doctor may review.
///
pub async fn add_review(
    store: &dyn DocumentStore,
    requester: &Identity,
    doctor_id: &str,
    request: NewReview,
) -> Result<Review, Error> {
    requester.require_patient()?;

    if !(1..=5).contains(&request.rating) {
        return Err(Error::invalid_argument("Rating must be between 1 and 5"));
    }

    let doctor = find_doctor(store, doctor_id).await?;
    let patient = find_user(store, &requester.id)
        .await?
        .ok_or(Error::NotFound("User"))?;

    let completed = store
        .query(
            &Query::collection(APPOINTMENTS)
                .filter("doctorId", doctor_id)
                .filter("patientId", requester.id.as_str())
                .filter("status", "completed")
                .limit(1),
        )
        .await?;

    if completed.is_empty() {
        return Err(Error::forbidden(
            "Only patients with a completed appointment can review",
        ));
    }

    let previous = store
        .query(&Query::collection(REVIEWS).filter("doctorId", doctor_id))
        .await?;
    let total = previous.iter().map(review_rating).sum::<f64>() + f64::from(request.rating);
    let count = previous.len() + 1;
    let rating = (total / count as f64 * 10.0).round() / 10.0;

    let review = Review {
        id: Uuid::new_v4().to_string(),
        doctor_id: doctor.id.clone(),
        patient_id: patient.id,
        patient_name: patient.display_name,
        rating: request.rating,
        comment: request.comment,
        created_at: Utc::now(),
    };

    let mut batch = WriteBatch::new();
    batch.insert_with_id(REVIEWS, &review.id, to_document(&review)?);
    batch.update(
        USERS,
        &doctor.id,
        fields! {"rating" => rating, "reviewCount" => count, "updatedAt" => super::now()},
    );
    store.commit(batch).await?;

    counter!(REVIEWS_TOTAL).increment(1);
    info!(target: DIRECTORY, msg = "Review added", doctor_id, rating = review.rating);

    Ok(review)
}

fn review_rating(document: &Document) -> f64 {
    document.get("rating").and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{Role, TimeSlot};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn doctor(id: &str, verified: bool, rating: f64, experience: u32, fee: f64) -> User {
        User {
            id: id.to_string(),
            role: Role::Doctor,
            display_name: format!("Dr {id}"),
            email: format!("{id}@example.com"),
            phone: "0112345678".to_string(),
            specialty: Some("Cardiology".to_string()),
            experience: Some(experience),
            consultation_fee: Some(fee),
            rating,
            is_verified: verified,
            ..Default::default()
        }
    }

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

    #[tokio::test]
    async fn listing_only_shows_verified_doctors() {
        let store = MemoryStore::new();
        put(&store, doctor("a", true, 4.0, 5, 1000.0)).await;
        put(&store, doctor("b", false, 5.0, 20, 500.0)).await;
        put(&store, doctor("c", true, 4.5, 10, 2000.0)).await;
        put(
            &store,
            User {
                id: "p".to_string(),
                role: Role::Patient,
                is_verified: true,
                ..Default::default()
            },
        )
        .await;

        let page = list_doctors(&store, DoctorFilter::default()).await.unwrap();
        assert!(page.doctors.iter().all(|d| d.is_verified));
        assert_eq!(page.pagination, Pagination { page: 1, limit: 10, total: 2 });

        let listed = serde_json::to_value(&page.doctors[0]).unwrap();
        assert!(listed.get("email").is_none());
        assert!(listed.get("phone").is_none());
    }

    #[tokio::test]
    async fn listing_sorts_and_pages() {
        let store = MemoryStore::new();
        put(&store, doctor("a", true, 4.0, 5, 1000.0)).await;
        put(&store, doctor("b", true, 4.9, 2, 3000.0)).await;
        put(&store, doctor("c", true, 4.5, 10, 2000.0)).await;

        let ids = |page: DoctorPage| page.doctors.into_iter().map(|d| d.id).collect::<Vec<_>>();

        let by_rating = DoctorFilter {
            sort: Some(DoctorSort::Rating),
            ..Default::default()
        };
        assert_eq!(ids(list_doctors(&store, by_rating).await.unwrap()), ["b", "c", "a"]);

        let by_experience = DoctorFilter {
            sort: Some(DoctorSort::Experience),
            ..Default::default()
        };
        assert_eq!(ids(list_doctors(&store, by_experience).await.unwrap()), ["c", "a", "b"]);

        let second_page = DoctorFilter {
            sort: Some(DoctorSort::Fee),
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        };
        let page = list_doctors(&store, second_page).await.unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(ids(page), ["b"]);
    }

    #[tokio::test]
    async fn pages_past_the_end_are_empty() {
        let store = MemoryStore::new();
        put(&store, doctor("a", true, 4.0, 5, 1000.0)).await;

        let filter = DoctorFilter {
            page: Some(usize::MAX),
            limit: Some(10),
            ..Default::default()
        };
        let page = list_doctors(&store, filter).await.unwrap();

        assert!(page.doctors.is_empty());
        assert_eq!(page.pagination.page, usize::MAX);
        assert_eq!(page.pagination.total, 1);
    }

    #[tokio::test]
    async fn detail_joins_schedule_and_reviews() {
        let store = MemoryStore::new();
        put(&store, doctor("a", false, 0.0, 5, 1000.0)).await;

        let detail = get_doctor(&store, "a").await.unwrap();
        assert_eq!(detail.schedule, json!({}));
        assert!(detail.reviews.is_empty());

        let schedule = Schedule {
            monday: Some(vec![TimeSlot {
                start: "09:00".to_string(),
                end: "12:00".to_string(),
            }]),
            ..Default::default()
        };
        set_schedule(&store, &identity("a", Role::Doctor), schedule)
            .await
            .unwrap();

        let detail = get_doctor(&store, "a").await.unwrap();
        assert_eq!(detail.schedule["Monday"][0]["end"], json!("12:00"));
        assert!(detail.schedule.get("id").is_none());

        let err = get_doctor(&store, "missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Doctor not found");
    }

    #[tokio::test]
    async fn schedule_updates_merge_weekdays() {
        let store = MemoryStore::new();
        let doctor = identity("a", Role::Doctor);
        let slot = |start: &str, end: &str| TimeSlot {
            start: start.to_string(),
            end: end.to_string(),
        };

        set_schedule(
            &store,
            &doctor,
            Schedule {
                monday: Some(vec![slot("09:00", "12:00")]),
                friday: Some(vec![slot("14:00", "17:00")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        set_schedule(
            &store,
            &doctor,
            Schedule {
                monday: Some(vec![slot("08:00", "10:00")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let schedule = get_schedule(&store, "a").await.unwrap();
        assert_eq!(schedule["Monday"][0]["start"], json!("08:00"));
        assert_eq!(schedule["Friday"][0]["start"], json!("14:00"));

        let err = set_schedule(
            &store,
            &identity("p", Role::Patient),
            Schedule::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = set_schedule(
            &store,
            &doctor,
            Schedule {
                tuesday: Some(vec![slot("", "10:00")]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(get_schedule(&store, "nobody").await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn profile_updates_skip_empty_fields() {
        let store = MemoryStore::new();
        put(&store, doctor("a", true, 4.0, 5, 1000.0)).await;

        update_profile(
            &store,
            &identity("a", Role::Doctor),
            DoctorProfileUpdate {
                hospital: Some("City Hospital".to_string()),
                specialty: Some(String::new()),
                consultation_fee: Some(1500.0),
                languages: Some(vec!["English".to_string(), "Sinhala".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let user = store.get_as::<User>(USERS, "a").await.unwrap().unwrap();
        assert_eq!(user.hospital.as_deref(), Some("City Hospital"));
        assert_eq!(user.specialty.as_deref(), Some("Cardiology"));
        assert_eq!(user.consultation_fee, Some(1500.0));
        assert_eq!(user.languages, vec!["English", "Sinhala"]);
        assert!(user.updated_at.is_some());
    }

    #[tokio::test]
    async fn reviews_require_a_completed_visit() {
        let store = MemoryStore::new();
        put(&store, doctor("d", true, 0.0, 5, 1000.0)).await;
        put(
            &store,
            User {
                id: "p".to_string(),
                role: Role::Patient,
                display_name: "Pat".to_string(),
                ..Default::default()
            },
        )
        .await;
        let patient = identity("p", Role::Patient);

        let review = |rating| NewReview {
            rating,
            comment: "Very thorough".to_string(),
        };

        let err = add_review(&store, &patient, "d", review(5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        store
            .set(
                APPOINTMENTS,
                "a1",
                &json!({"doctorId": "d", "patientId": "p", "status": "completed"}),
                false,
            )
            .await
            .unwrap();

        let err = add_review(&store, &patient, "d", review(6)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        add_review(&store, &patient, "d", review(5)).await.unwrap();
        add_review(&store, &patient, "d", review(4)).await.unwrap();

        let detail = get_doctor(&store, "d").await.unwrap();
        assert_eq!(detail.summary.review_count, 2);
        assert_eq!(detail.summary.rating, 4.5);
        assert_eq!(detail.reviews.len(), 2);
        assert_eq!(detail.reviews[0].patient_name, "Pat");

        let err = add_review(&store, &identity("d", Role::Doctor), "d", review(5))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Patient access required");
    }
}
