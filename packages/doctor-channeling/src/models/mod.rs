mod appointment;
mod records;
mod schedule;
mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use records::{ContactMessage, Prescription, Review};
pub use schedule::{Schedule, TimeSlot};
pub use user::{DoctorDetail, DoctorSummary, Role, User};

/// Collection names in the document store
pub const USERS: &str = "users";
pub const APPOINTMENTS: &str = "appointments";
pub const SCHEDULES: &str = "schedules";
pub const PRESCRIPTIONS: &str = "prescriptions";
pub const REVIEWS: &str = "reviews";
pub const CONTACT_MESSAGES: &str = "contact_messages";
pub const QUEUE_COUNTERS: &str = "queue_counters";
pub const IDENTITIES: &str = "identities";
pub const IDENTITY_EMAILS: &str = "identity_emails";
