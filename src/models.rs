use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `GET /clubs/{club_id}/sessions/timetable`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableResponse {
    #[serde(default)]
    pub sessions_details: Vec<ClassOccurrence>,
}

/// One scheduled instance of a course as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassOccurrence {
    pub course_id: u64,
    pub course_instance_id: u64,
    #[serde(default)]
    pub course_template_id: u64,
    #[serde(default)]
    pub course_group_id: u64,
    pub site_id: u32,
    pub date: NaiveDate,
    /// Local club time, `HH:MM`.
    pub start_time: String,
    #[serde(default)]
    pub duration: u32,
    pub name: String,
    #[serde(default)]
    pub class_sport: String,
    #[serde(default)]
    pub class_type_id: i64,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub level_translation_key: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub standard_price: f64,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_part_of_a_course: bool,
    #[serde(default)]
    pub is_junior: bool,
    #[serde(default)]
    pub is_senior: bool,
    #[serde(default)]
    pub is_club_event: bool,
    #[serde(default)]
    pub min_age: i32,
    #[serde(default = "no_max_age")]
    pub max_age: i32,
    #[serde(default)]
    pub instructor_names: Vec<String>,
    #[serde(default)]
    pub status: String,
    pub one_click_booking_url: Option<String>,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub uses_stations: bool,
    pub current_course_occupancy: Option<u32>,
    pub max_course_occupancy: Option<u32>,
    pub course_booking_reference: Option<String>,
    pub course_location_ids: Option<Vec<String>>,
    #[serde(default)]
    pub is_all_stars: bool,
    #[serde(default)]
    pub standard_price_decimal: f64,
    #[serde(default)]
    pub instances_for_booking: Vec<Value>,
}

fn no_max_age() -> i32 {
    -1
}

impl ClassOccurrence {
    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        let time = NaiveTime::parse_from_str(self.start_time.trim(), "%H:%M").ok()?;
        Some(NaiveDateTime::new(self.date, time))
    }

    /// Streamed classes carry a pseudo-instructor called "Virtual".
    pub fn is_virtual(&self) -> bool {
        self.instructor_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case("virtual"))
    }

    pub fn age_range(&self) -> String {
        if self.max_age == -1 {
            format!("{}+", self.min_age)
        } else {
            format!("{}-{}", self.min_age, self.max_age)
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.course_instance_id,
            course_id: self.course_id,
            name: self.name.clone(),
            time: self.start_time.clone(),
            date: self.date,
            duration: self.duration,
            location: self.locations.join(", "),
            instructor: self.instructor_names.join(", "),
            age_range: self.age_range(),
            is_virtual: self.is_virtual(),
        }
    }
}

/// Flattened view of an occurrence for listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub id: u64,
    pub course_id: u64,
    pub name: String,
    pub time: String,
    pub date: NaiveDate,
    pub duration: u32,
    pub location: String,
    pub instructor: String,
    pub age_range: String,
    pub is_virtual: bool,
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn occurrence_json(course_id: u64, instance_id: u64, date: &str) -> Value {
        json!({
            "courseId": course_id,
            "courseInstanceId": instance_id,
            "courseTemplateId": 11,
            "courseGroupId": 12,
            "siteId": 42,
            "date": date,
            "startTime": "18:30",
            "duration": 60,
            "name": "Tennis Advanced",
            "classSport": "Tennis",
            "classTypeId": 3,
            "level": "Advanced",
            "levelTranslationKey": "level.advanced",
            "locations": ["Court 1", "Court 2"],
            "standardPrice": 0.0,
            "currency": null,
            "isPartOfACourse": true,
            "isJunior": false,
            "isSenior": false,
            "isClubEvent": false,
            "minAge": 16,
            "maxAge": -1,
            "instructorNames": ["Sam Coach"],
            "status": "AVAILABLE",
            "oneClickBookingUrl": null,
            "lastModified": "2026-10-01T10:00:00Z",
            "usesStations": false,
            "currentCourseOccupancy": 3,
            "maxCourseOccupancy": 8,
            "courseBookingReference": null,
            "courseLocationIds": null,
            "isAllStars": false,
            "standardPriceDecimal": 0.0,
            "instancesForBooking": [],
            "description": "dropped on the floor",
            "liveStreamDetails": {"url": "ignored"}
        })
    }

    pub(crate) fn occurrence(course_id: u64, instance_id: u64, date: &str) -> ClassOccurrence {
        serde_json::from_value(occurrence_json(course_id, instance_id, date)).unwrap()
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let parsed = occurrence(101786949, 555, "2026-10-25");
        assert_eq!(parsed.course_id, 101786949);
        assert_eq!(parsed.course_instance_id, 555);
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2026, 10, 25).unwrap());
        assert_eq!(parsed.max_course_occupancy, Some(8));
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let parsed: ClassOccurrence = serde_json::from_value(json!({
            "courseId": 1,
            "courseInstanceId": 2,
            "siteId": 42,
            "date": "2026-10-25",
            "startTime": "07:00",
            "name": "Spin"
        }))
        .unwrap();
        assert_eq!(parsed.age_range(), "0+");
        assert!(parsed.locations.is_empty());
    }

    #[test]
    fn test_start_datetime() {
        let parsed = occurrence(1, 2, "2026-10-25");
        let expected = NaiveDate::from_ymd_opt(2026, 10, 25)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        assert_eq!(parsed.start_datetime(), Some(expected));

        let mut broken = parsed.clone();
        broken.start_time = "half past six".to_string();
        assert!(broken.start_datetime().is_none());
    }

    #[test]
    fn test_is_virtual() {
        let mut parsed = occurrence(1, 2, "2026-10-25");
        assert!(!parsed.is_virtual());
        parsed.instructor_names = vec!["VIRTUAL".to_string()];
        assert!(parsed.is_virtual());
    }

    #[test]
    fn test_age_range() {
        let mut parsed = occurrence(1, 2, "2026-10-25");
        assert_eq!(parsed.age_range(), "16+");
        parsed.min_age = 5;
        parsed.max_age = 11;
        assert_eq!(parsed.age_range(), "5-11");
    }

    #[test]
    fn test_summary_joins_lists() {
        let summary = occurrence(1, 2, "2026-10-25").summary();
        assert_eq!(summary.id, 2);
        assert_eq!(summary.location, "Court 1, Court 2");
        assert_eq!(summary.instructor, "Sam Coach");
        assert!(!summary.is_virtual);
    }
}
