use crate::error::Error;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Patient,
    Doctor,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::invalid_argument(format!("Invalid role {s}"))),
        }
    }
}

///
/// A user profile document.
/// Doctor-only fields stay empty for patients and admins.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub blood_group: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,

    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub patient_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    ///
    /// Age in whole years on `today`, from a `YYYY-MM-DD` date of birth.
    /// Returns `None` if the date of birth is missing, malformed, or in the future.
    ///
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d").ok()?;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    pub fn matches_search(&self, search: &str) -> bool {
        let search = search.to_lowercase();
        self.display_name.to_lowercase().contains(&search)
            || self.email.to_lowercase().contains(&search)
    }
}

///
/// Public projection of a doctor, without contact or audit fields
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    pub id: String,
    pub display_name: String,
    pub specialty: Option<String>,
    pub qualification: Option<String>,
    pub hospital: Option<String>,
    pub location: Option<String>,
    pub experience: Option<u32>,
    pub rating: f64,
    pub review_count: u32,
    pub fee: Option<f64>,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub is_verified: bool,
    pub languages: Vec<String>,
}

impl From<&User> for DoctorSummary {
    fn from(user: &User) -> Self {
        DoctorSummary {
            id: user.id.clone(),
            display_name: user.display_name.clone(),
            specialty: user.specialty.clone(),
            qualification: user.qualification.clone(),
            hospital: user.hospital.clone(),
            location: user.location.clone(),
            experience: user.experience,
            rating: user.rating,
            review_count: user.review_count,
            fee: user.consultation_fee,
            photo_url: user.photo_url.clone(),
            is_verified: user.is_verified,
            languages: user.languages.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorDetail {
    #[serde(flatten)]
    pub summary: DoctorSummary,
    pub patient_count: u32,
    pub about: Option<String>,
    pub education: Vec<String>,
    pub services: Vec<String>,
    pub schedule: Value,
    pub reviews: Vec<super::Review>,
}
