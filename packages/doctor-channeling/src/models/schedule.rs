use crate::error::Error;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

impl TimeSlot {
    /// Slots are `HH:MM` ranges where `start` is before `end`
    pub fn validate(&self) -> Result<(), Error> {
        let start = parse_time(&self.start)?;
        let end = parse_time(&self.end)?;
        if start >= end {
            return Err(Error::invalid_argument(format!(
                "Slot {}-{} must start before it ends",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| Error::invalid_argument(format!("Invalid slot time {value:?}")))
}

///
/// Weekly availability keyed by weekday name.
/// Days that are absent are left untouched by a merge.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "Monday", alias = "monday", default, skip_serializing_if = "Option::is_none")]
    pub monday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Tuesday", alias = "tuesday", default, skip_serializing_if = "Option::is_none")]
    pub tuesday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Wednesday", alias = "wednesday", default, skip_serializing_if = "Option::is_none")]
    pub wednesday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Thursday", alias = "thursday", default, skip_serializing_if = "Option::is_none")]
    pub thursday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Friday", alias = "friday", default, skip_serializing_if = "Option::is_none")]
    pub friday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Saturday", alias = "saturday", default, skip_serializing_if = "Option::is_none")]
    pub saturday: Option<Vec<TimeSlot>>,
    #[serde(rename = "Sunday", alias = "sunday", default, skip_serializing_if = "Option::is_none")]
    pub sunday: Option<Vec<TimeSlot>>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn days(&self) -> impl Iterator<Item = &Vec<TimeSlot>> {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
        .into_iter()
        .flatten()
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.days().flatten().try_for_each(TimeSlot::validate)
    }
}
