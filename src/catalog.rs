use chrono::NaiveDate;

use crate::models::{ClassOccurrence, SessionSummary, TimetableResponse};

/// Timetable of one club as fetched, in backend order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassCatalog {
    pub club_id: u32,
    occurrences: Vec<ClassOccurrence>,
}

impl ClassCatalog {
    pub fn new(club_id: u32, occurrences: Vec<ClassOccurrence>) -> Self {
        Self {
            club_id,
            occurrences,
        }
    }

    pub fn from_response(club_id: u32, response: TimetableResponse) -> Self {
        Self::new(club_id, response.sessions_details)
    }

    pub fn occurrences(&self) -> &[ClassOccurrence] {
        &self.occurrences
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Occurrences whose `attribute` equals `value`, in catalog order.
    pub fn filter_by<T, F>(&self, attribute: F, value: T) -> Vec<&ClassOccurrence>
    where
        T: PartialEq,
        F: Fn(&ClassOccurrence) -> T,
    {
        self.filter(|occurrence| attribute(occurrence) == value)
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&ClassOccurrence>
    where
        P: Fn(&ClassOccurrence) -> bool,
    {
        self.occurrences
            .iter()
            .filter(|occurrence| predicate(*occurrence))
            .collect()
    }

    pub fn adult_sessions(&self) -> Vec<&ClassOccurrence> {
        self.filter_by(|occurrence| occurrence.is_junior, false)
    }

    /// First occurrence of `course_id` on `date`. Duplicates resolve to the
    /// earliest one in catalog order.
    pub fn find_by_course_and_date(
        &self,
        course_id: u64,
        date: NaiveDate,
    ) -> Option<&ClassOccurrence> {
        self.occurrences
            .iter()
            .find(|occurrence| occurrence.course_id == course_id && occurrence.date == date)
    }

    /// Adult sessions flattened for display, ordered by date then start time.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .adult_sessions()
            .into_iter()
            .map(ClassOccurrence::summary)
            .collect();
        summaries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.time.cmp(&b.time)));
        summaries
    }
}
