use super::{bounded_limit, find_doctor, find_user, Changes};
use crate::auth::Identity;
use crate::error::Error;
use crate::fields;
use crate::log::APPOINTMENT;
use crate::models::{
    Appointment, AppointmentStatus, Prescription, APPOINTMENTS, PRESCRIPTIONS, QUEUE_COUNTERS,
};
use crate::prometheus::{
    APPOINTMENTS_BOOKED_TOTAL, APPOINTMENTS_CANCELLED_TOTAL, APPOINTMENT_STATUS_UPDATES_TOTAL,
    PRESCRIPTIONS_TOTAL,
};
use crate::store::{
    to_document, Direction, DocumentStore, DocumentStoreExt, FieldRef, Query, WriteBatch,
};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppointmentFilter {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrescription {
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub medications: Value,
    #[serde(default)]
    pub instructions: String,
    pub follow_up_date: Option<NaiveDate>,
}

/// Counter document for the queue of one doctor on one day
fn queue_key(doctor_id: &str, date: NaiveDate) -> String {
    format!("{doctor_id}_{date}")
}

///
/// Books an appointment with a doctor.
///
/// The appointment insert and the per-doctor, per-day queue counter are one batch,
/// so concurrent bookings never share a number and a failed booking uses none.
/// Doctor and patient details are copied onto the appointment as they are now.
///
pub async fn create(
    store: &dyn DocumentStore,
    requester: &Identity,
    request: NewAppointment,
) -> Result<Appointment, Error> {
    if request.doctor_id.trim().is_empty() || request.time.trim().is_empty() {
        return Err(Error::invalid_argument("Doctor, date and time are required"));
    }

    let date = NaiveDate::parse_from_str(&request.date, "%Y-%m-%d")
        .map_err(|_| Error::invalid_argument("Invalid date, expected YYYY-MM-DD"))?;

    let doctor = find_doctor(store, &request.doctor_id).await?;
    let patient = find_user(store, &requester.id)
        .await?
        .ok_or(Error::NotFound("User"))?;

    let now = Utc::now();
    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        doctor_id: doctor.id.clone(),
        patient_id: patient.id.clone(),
        date,
        time: request.time,
        doctor_name: doctor.display_name,
        doctor_specialty: doctor.specialty,
        doctor_photo: doctor.photo_url,
        hospital: doctor.hospital,
        patient_name: patient.display_name,
        patient_email: patient.email,
        patient_phone: patient.phone,
        fee: doctor.consultation_fee.unwrap_or(0.0),
        // Assigned by the counter when the batch commits
        queue_number: 0,
        status: AppointmentStatus::Pending,
        notes: request.notes.unwrap_or_default(),
        has_prescription: false,
        cancelled_by: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    };

    let mut batch = WriteBatch::new();
    batch
        .insert_with_id(APPOINTMENTS, &appointment.id, to_document(&appointment)?)
        .increment(
            QUEUE_COUNTERS,
            &queue_key(&appointment.doctor_id, date),
            "value",
            Some(FieldRef::new(APPOINTMENTS, &appointment.id, "queueNumber")),
        );
    store.commit(batch).await?;

    let appointment = find(store, &appointment.id).await?;

    counter!(APPOINTMENTS_BOOKED_TOTAL).increment(1);
    info!(
        target: APPOINTMENT,
        msg = "Appointment booked",
        id = appointment.id,
        doctor_id = appointment.doctor_id,
        %date,
        queue_number = appointment.queue_number
    );

    Ok(appointment)
}

///
/// Doctors see the appointments booked with them, everyone else sees their own bookings
///
pub async fn list_mine(
    store: &dyn DocumentStore,
    requester: &Identity,
    filter: AppointmentFilter,
) -> Result<Vec<Appointment>, Error> {
    let owner = if requester.is_doctor() {
        "doctorId"
    } else {
        "patientId"
    };

    let mut query = Query::collection(APPOINTMENTS).filter(owner, requester.id.as_str());

    if let Some(status) = filter.status.filter(|s| !s.is_empty() && s != "all") {
        query = query.filter("status", status);
    }

    let query = query
        .order_by("date", Direction::Descending)
        .limit(bounded_limit(filter.limit, DEFAULT_LIMIT, MAX_LIMIT));

    store.query_as(&query).await
}

async fn find(store: &dyn DocumentStore, id: &str) -> Result<Appointment, Error> {
    store
        .get_as::<Appointment>(APPOINTMENTS, id)
        .await?
        .ok_or(Error::NotFound("Appointment"))
}

pub async fn get(
    store: &dyn DocumentStore,
    requester: &Identity,
    id: &str,
) -> Result<Appointment, Error> {
    let appointment = find(store, id).await?;

    if !appointment.is_participant(&requester.id) && !requester.is_admin() {
        return Err(Error::forbidden("Access denied"));
    }

    Ok(appointment)
}

///
/// Sets any status except `pending`.
/// There is no transition table, a completed appointment can be confirmed again.
///
pub async fn update_status(
    store: &dyn DocumentStore,
    requester: &Identity,
    id: &str,
    status: &str,
) -> Result<AppointmentStatus, Error> {
    requester.require_doctor_or_admin()?;

    let status = status
        .parse::<AppointmentStatus>()
        .ok()
        .filter(AppointmentStatus::is_assignable)
        .ok_or_else(|| Error::invalid_argument("Invalid status"))?;

    find(store, id).await?;

    let mut changes = Changes::new();
    changes.value("status", Some(status.as_str()));
    store.update(APPOINTMENTS, id, changes.touch()).await?;

    counter!(APPOINTMENT_STATUS_UPDATES_TOTAL, "status" => status.as_str()).increment(1);
    info!(target: APPOINTMENT, msg = "Appointment status updated", id, %status, by = requester.id);

    Ok(status)
}

pub async fn cancel(store: &dyn DocumentStore, requester: &Identity, id: &str) -> Result<(), Error> {
    let appointment = find(store, id).await?;

    if appointment.patient_id != requester.id {
        return Err(Error::forbidden("Access denied"));
    }

    if !appointment.status.is_cancellable() {
        debug!(target: APPOINTMENT, msg = "Cancel rejected", id, status = %appointment.status);
        return Err(Error::invalid_state("Cannot cancel this appointment"));
    }

    let cancelled_at = super::now();
    let mut changes = Changes::new();
    changes
        .value("status", Some(AppointmentStatus::Cancelled.as_str()))
        .value("cancelledBy", Some("patient"))
        .value("cancelledAt", Some(cancelled_at));
    store.update(APPOINTMENTS, id, changes.touch()).await?;

    counter!(APPOINTMENTS_CANCELLED_TOTAL).increment(1);
    info!(target: APPOINTMENT, msg = "Appointment cancelled", id);

    Ok(())
}

///
/// Writes a prescription for an appointment of the requesting doctor.
/// The prescription and the appointment's `hasPrescription` flag are committed together.
///
pub async fn add_prescription(
    store: &dyn DocumentStore,
    requester: &Identity,
    appointment_id: &str,
    request: NewPrescription,
) -> Result<Prescription, Error> {
    requester.require_doctor()?;

    let appointment = find(store, appointment_id).await?;

    if appointment.doctor_id != requester.id {
        return Err(Error::forbidden("Access denied"));
    }

    let prescription = Prescription {
        id: Uuid::new_v4().to_string(),
        appointment_id: appointment.id.clone(),
        doctor_id: requester.id.clone(),
        patient_id: appointment.patient_id,
        diagnosis: request.diagnosis,
        medications: request.medications,
        instructions: request.instructions,
        follow_up_date: request.follow_up_date,
        created_at: Utc::now(),
    };

    let mut batch = WriteBatch::new();
    batch.insert_with_id(PRESCRIPTIONS, &prescription.id, to_document(&prescription)?);
    batch.update(
        APPOINTMENTS,
        &appointment.id,
        fields! {"hasPrescription" => true, "updatedAt" => super::now()},
    );
    store.commit(batch).await?;

    counter!(PRESCRIPTIONS_TOTAL).increment(1);
    info!(
        target: APPOINTMENT,
        msg = "Prescription added",
        id = prescription.id,
        appointment_id = appointment.id
    );

    Ok(prescription)
}
