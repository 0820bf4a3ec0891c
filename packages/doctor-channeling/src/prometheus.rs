use crate::config::PrometheusConfig;
use crate::error::{ConfigError, Error};
use crate::log::DEVELOPMENT;
use metrics::{counter, describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{debug, info};

// See https://prometheus.io/docs/practices/naming/
pub const APPOINTMENTS_BOOKED_TOTAL: &str = "doctor_channeling_appointments_booked_total";
pub const APPOINTMENTS_CANCELLED_TOTAL: &str = "doctor_channeling_appointments_cancelled_total";
pub const APPOINTMENT_STATUS_UPDATES_TOTAL: &str =
    "doctor_channeling_appointment_status_updates_total";
pub const PRESCRIPTIONS_TOTAL: &str = "doctor_channeling_prescriptions_total";
pub const REVIEWS_TOTAL: &str = "doctor_channeling_reviews_total";

pub const REGISTRATIONS_TOTAL: &str = "doctor_channeling_registrations_total";
pub const SIGN_INS_TOTAL: &str = "doctor_channeling_sign_ins_total";
pub const AUTHENTICATION_FAILURES_TOTAL: &str = "doctor_channeling_authentication_failures_total";

pub const HTTP_ERRORS_TOTAL: &str = "doctor_channeling_http_errors_total";
pub const ADMIN_STATS_DURATION_SECONDS: &str = "doctor_channeling_admin_stats_duration_seconds";

pub fn start(host: &str, config: &PrometheusConfig) -> Result<(), Error> {
    let port = config.port;
    let address = format!("{}:{}", host, port);
    let socket_address: SocketAddr = address
        .parse()
        .map_err(|_| ConfigError::InvalidServerAddress { address })?;

    debug!(target: DEVELOPMENT, msg = "Starting Prometheus exporter", port);

    PrometheusBuilder::new()
        .with_http_listener(socket_address)
        .install()?;

    describe_counter!(APPOINTMENTS_BOOKED_TOTAL, "Number of appointments booked");
    describe_counter!(
        APPOINTMENTS_CANCELLED_TOTAL,
        "Number of appointments cancelled by patients"
    );
    describe_counter!(
        APPOINTMENT_STATUS_UPDATES_TOTAL,
        "Number of appointment status changes made by doctors or admins"
    );
    describe_counter!(PRESCRIPTIONS_TOTAL, "Number of prescriptions written");
    describe_counter!(REVIEWS_TOTAL, "Number of doctor reviews submitted");

    describe_counter!(REGISTRATIONS_TOTAL, "Number of accounts registered");
    describe_counter!(SIGN_INS_TOTAL, "Number of successful sign ins");
    describe_counter!(
        AUTHENTICATION_FAILURES_TOTAL,
        "Number of requests rejected for a missing or invalid token"
    );

    describe_counter!(
        HTTP_ERRORS_TOTAL,
        "Number of API responses with an error status"
    );
    describe_histogram!(
        ADMIN_STATS_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of the admin statistics scan"
    );

    // Prometheus endpoint is empty on startup and looks like an error
    // Explicitly set count to zero
    counter!(APPOINTMENTS_BOOKED_TOTAL).absolute(0);

    info!(msg = "Prometheus exporter started", port);
    Ok(())
}
