use chrono::Duration;
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarDateTime, Component, Event, EventLike};

use crate::catalog::ClassCatalog;

#[derive(Clone)]
pub struct ICalExporter {
    tz: Tz,
}

impl ICalExporter {
    /// Timetable times are club-local, so events are tagged with `tz`.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn generate(&self, catalog: &ClassCatalog) -> Vec<u8> {
        let sessions = catalog.adult_sessions();
        if sessions.is_empty() {
            return Vec::new();
        }

        let mut calendar = Calendar::new();
        calendar.name(&format!("Club {} timetable", catalog.club_id));

        for occurrence in sessions {
            let Some(start) = occurrence.start_datetime() else {
                continue;
            };
            let minutes = if occurrence.duration > 0 {
                occurrence.duration as i64
            } else {
                60
            };
            let end = start + Duration::minutes(minutes);

            let mut event = Event::new();
            event.summary(&occurrence.name);
            event.starts(CalendarDateTime::WithTimezone {
                date_time: start,
                tzid: self.tz.name().to_string(),
            });
            event.ends(CalendarDateTime::WithTimezone {
                date_time: end,
                tzid: self.tz.name().to_string(),
            });
            if !occurrence.locations.is_empty() {
                event.location(&occurrence.locations.join(", "));
            }
            event.description(&format!(
                "{} ({})\nInstructor: {}\nAges: {}\nCourse: {}",
                occurrence.class_sport,
                occurrence.level,
                occurrence.instructor_names.join(", "),
                occurrence.age_range(),
                occurrence.course_id,
            ));
            event.uid(&format!(
                "{}-{}@club-{}",
                occurrence.course_instance_id, occurrence.date, catalog.club_id
            ));
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}
