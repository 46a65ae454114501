use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DEFAULT_SCHOOL_YEAR_START_MONTH: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Holiday,
    SecondSemesterEndViiiGrade,
    SecondSemesterEndXiiGrade,
    SecondSemesterEndTechnological,
    Corigente,
    Diferente,
}

/// Where an event type may be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    AnySemester,
    SecondSemester,
    AcademicYear,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Holiday,
        EventType::SecondSemesterEndViiiGrade,
        EventType::SecondSemesterEndXiiGrade,
        EventType::SecondSemesterEndTechnological,
        EventType::Corigente,
        EventType::Diferente,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Holiday => "holiday",
            EventType::SecondSemesterEndViiiGrade => "second_semester_end_viii_grade",
            EventType::SecondSemesterEndXiiGrade => "second_semester_end_xii_grade",
            EventType::SecondSemesterEndTechnological => "second_semester_end_technological",
            EventType::Corigente => "corigente",
            EventType::Diferente => "diferente",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            EventType::Holiday => "Holiday",
            EventType::SecondSemesterEndViiiGrade => {
                "End of the second semester for the VIII grade"
            }
            EventType::SecondSemesterEndXiiGrade => "End of the second semester for the XII grade",
            EventType::SecondSemesterEndTechnological => {
                "End of the second semester for technological IX-XI grades"
            }
            EventType::Corigente => "Corigente",
            EventType::Diferente => "Diferente",
        }
    }

    pub fn placement(self) -> Placement {
        match self {
            EventType::Holiday => Placement::AnySemester,
            EventType::SecondSemesterEndViiiGrade
            | EventType::SecondSemesterEndXiiGrade
            | EventType::SecondSemesterEndTechnological => Placement::SecondSemester,
            EventType::Corigente | EventType::Diferente => Placement::AcademicYear,
        }
    }

    pub fn is_second_semester_end(self) -> bool {
        self.placement() == Placement::SecondSemester
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOwner {
    FirstSemester,
    SecondSemester,
    AcademicYear,
}

impl EventOwner {
    pub fn as_str(self) -> &'static str {
        match self {
            EventOwner::FirstSemester => "first_semester",
            EventOwner::SecondSemester => "second_semester",
            EventOwner::AcademicYear => "academic_year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_semester" => Some(EventOwner::FirstSemester),
            "second_semester" => Some(EventOwner::SecondSemester),
            "academic_year" => Some(EventOwner::AcademicYear),
            _ => None,
        }
    }

    /// Wire path of the owning event list.
    fn events_path(self) -> &'static str {
        match self {
            EventOwner::FirstSemester => "firstSemester.events",
            EventOwner::SecondSemester => "secondSemester.events",
            EventOwner::AcademicYear => "events",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolEvent {
    pub id: String,
    pub event_type: EventType,
    pub name: String,
    pub starts_at: NaiveDate,
    pub ends_at: NaiveDate,
}

impl SchoolEvent {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.starts_at <= day && day <= self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterCalendar {
    pub id: String,
    pub starts_at: NaiveDate,
    pub ends_at: NaiveDate,
    pub weeks_count: u32,
    pub working_weeks_count: u32,
    pub events: Vec<SchoolEvent>,
}

impl SemesterCalendar {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.starts_at <= day && day <= self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearCalendar {
    pub id: String,
    pub academic_year: i32,
    pub first_semester: SemesterCalendar,
    pub second_semester: SemesterCalendar,
    pub events: Vec<SchoolEvent>,
}

impl AcademicYearCalendar {
    pub fn all_events(&self) -> impl Iterator<Item = (EventOwner, &SchoolEvent)> {
        self.first_semester
            .events
            .iter()
            .map(|e| (EventOwner::FirstSemester, e))
            .chain(
                self.second_semester
                    .events
                    .iter()
                    .map(|e| (EventOwner::SecondSemester, e)),
            )
            .chain(self.events.iter().map(|e| (EventOwner::AcademicYear, e)))
    }

    pub fn events_of_type(&self, event_type: EventType) -> impl Iterator<Item = &SchoolEvent> {
        self.all_events()
            .map(|(_, e)| e)
            .filter(move |e| e.event_type == event_type)
    }

    /// 1 or 2 when `day` falls inside a semester.
    pub fn semester_for(&self, day: NaiveDate) -> Option<u8> {
        if self.first_semester.contains(day) {
            Some(1)
        } else if self.second_semester.contains(day) {
            Some(2)
        } else {
            None
        }
    }
}

/// Academic year (its starting calendar year) that `day` belongs to.
pub fn academic_year_of(day: NaiveDate, start_month: u32) -> i32 {
    if day.month() >= start_month {
        day.year()
    } else {
        day.year() - 1
    }
}

/// Inclusive `[first day, last day]` of an academic year.
pub fn academic_year_bounds(academic_year: i32, start_month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(academic_year, start_month, 1)?;
    let end = NaiveDate::from_ymd_opt(academic_year.checked_add(1)?, start_month, 1)?.pred_opt()?;
    Some((start, end))
}

/// `(weeks_count, working_weeks_count)` for a semester interval and its events.
///
/// Weeks are counted over the inclusive day span; every full seven days of
/// holiday inside the semester removes one working week.
pub fn week_counters<I>(starts_at: NaiveDate, ends_at: NaiveDate, events: I) -> (u32, u32)
where
    I: IntoIterator<Item = (EventType, NaiveDate, NaiveDate)>,
{
    if ends_at < starts_at {
        return (0, 0);
    }
    let days = (ends_at - starts_at).num_days() + 1;
    let weeks = (days + 6) / 7;

    let mut holidays: Vec<(NaiveDate, NaiveDate)> = events
        .into_iter()
        .filter(|(event_type, _, _)| *event_type == EventType::Holiday)
        .map(|(_, s, e)| (s.max(starts_at), e.min(ends_at)))
        .filter(|(s, e)| e >= s)
        .collect();
    holidays.sort();

    // Touching holidays share a day; count each day once.
    let mut holiday_days: i64 = 0;
    let mut covered_until: Option<NaiveDate> = None;
    for (s, e) in holidays {
        let s = match covered_until {
            Some(c) if s <= c => match c.succ_opt() {
                Some(next) => next,
                None => continue,
            },
            _ => s,
        };
        if e >= s {
            holiday_days += (e - s).num_days() + 1;
            covered_until = Some(e);
        }
    }
    let working = (weeks - holiday_days / 7).max(0);
    (weeks as u32, working as u32)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub name: Option<String>,
    pub starts_at: NaiveDate,
    pub ends_at: NaiveDate,
}

impl EventPayload {
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => self.event_type.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterPayload {
    #[serde(default)]
    pub id: Option<String>,
    pub starts_at: NaiveDate,
    pub ends_at: NaiveDate,
    #[serde(default)]
    pub events: Vec<EventPayload>,
}

impl SemesterPayload {
    pub fn week_counters(&self) -> (u32, u32) {
        week_counters(
            self.starts_at,
            self.ends_at,
            self.events
                .iter()
                .map(|e| (e.event_type, e.starts_at, e.ends_at)),
        )
    }
}

/// Composite calendar payload: both semesters with their events plus the
/// year-level events. Always the full set; anything not listed is removed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPayload {
    pub first_semester: SemesterPayload,
    pub second_semester: SemesterPayload,
    #[serde(default)]
    pub events: Vec<EventPayload>,
}

impl CalendarPayload {
    pub fn collections(&self) -> [(EventOwner, &[EventPayload]); 3] {
        [
            (EventOwner::FirstSemester, &self.first_semester.events[..]),
            (EventOwner::SecondSemester, &self.second_semester.events[..]),
            (EventOwner::AcademicYear, &self.events[..]),
        ]
    }
}

pub const MSG_START_BEFORE_END: &str = "The start date must be before the end date.";
pub const MSG_SECOND_AFTER_FIRST: &str =
    "Second semester must start after the end of the first semester.";
pub const MSG_EVENT_IN_SEMESTER: &str =
    "The event must be between the semester's start and end dates.";
pub const MSG_EVENT_AFTER_SEMESTERS: &str =
    "The event must be between the end of the second semester and the end of the academic year.";
pub const MSG_EVENTS_OVERLAP: &str = "Events cannot overlap.";
pub const MSG_SEMESTER_NOT_OWNED: &str = "The semester must belong to this academic year.";
pub const MSG_EVENT_NOT_OWNED: &str = "The event must belong to the academic year.";
pub const MSG_EVENT_LISTED_TWICE: &str = "The event is listed more than once.";
pub const MSG_INVALID_ACADEMIC_YEAR: &str = "Invalid academic year.";

/// Validation failures keyed by dotted field path
/// (`firstSemester.events.2.startsAt`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors {
    entries: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        let slot = self.entries.entry(path.into()).or_default();
        if !slot.contains(&message) {
            slot.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[allow(dead_code)]
    pub fn messages(&self, path: &str) -> &[String] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    #[allow(dead_code)]
    pub fn contains(&self, path: &str, message: &str) -> bool {
        self.messages(path).iter().any(|m| m == message)
    }

    pub fn to_flat_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).unwrap_or(serde_json::Value::Null)
    }

    /// Nested object form: each path segment becomes an object key and the
    /// last segment holds the message list.
    pub fn to_nested_json(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for (path, messages) in &self.entries {
            let segments: Vec<&str> = path.split('.').collect();
            insert_nested(&mut root, &segments, messages);
        }
        serde_json::Value::Object(root)
    }
}

fn insert_nested(
    node: &mut serde_json::Map<String, serde_json::Value>,
    segments: &[&str],
    messages: &[String],
) {
    match segments {
        [] => {}
        [leaf] => {
            node.insert(leaf.to_string(), serde_json::json!(messages));
        }
        [head, rest @ ..] => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !child.is_object() {
                *child = serde_json::Value::Object(serde_json::Map::new());
            }
            if let Some(obj) = child.as_object_mut() {
                insert_nested(obj, rest, messages);
            }
        }
    }
}

/// Checks a composite calendar payload for `academic_year`.
///
/// `existing` is the stored calendar when updating; ids in the payload must
/// belong to it.
pub fn validate_calendar(
    payload: &CalendarPayload,
    academic_year: i32,
    start_month: u32,
    existing: Option<&AcademicYearCalendar>,
) -> FieldErrors {
    let mut errors = FieldErrors::default();

    let first = &payload.first_semester;
    let second = &payload.second_semester;

    let first_ok = first.starts_at < first.ends_at;
    if !first_ok {
        errors.add("firstSemester.startsAt", MSG_START_BEFORE_END);
    }
    let second_ok = second.starts_at < second.ends_at;
    if !second_ok {
        errors.add("secondSemester.startsAt", MSG_START_BEFORE_END);
    }
    if second.starts_at <= first.ends_at {
        errors.add("secondSemester.startsAt", MSG_SECOND_AFTER_FIRST);
    }

    check_semester_id(
        &mut errors,
        "firstSemester.id",
        first.id.as_deref(),
        existing.map(|c| c.first_semester.id.as_str()),
    );
    check_semester_id(
        &mut errors,
        "secondSemester.id",
        second.id.as_deref(),
        existing.map(|c| c.second_semester.id.as_str()),
    );

    let year_end = match academic_year_bounds(academic_year, start_month) {
        Some((_, end)) => Some(end),
        None => {
            errors.add("academicYear", MSG_INVALID_ACADEMIC_YEAR);
            None
        }
    };

    let known_ids: HashSet<&str> = existing
        .map(|c| c.all_events().map(|(_, e)| e.id.as_str()).collect())
        .unwrap_or_default();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_end_types: HashMap<EventType, usize> = HashMap::new();

    for (owner, events) in payload.collections() {
        let base = owner.events_path();
        let bounds = match owner {
            EventOwner::FirstSemester => first_ok.then_some((first.starts_at, first.ends_at)),
            EventOwner::SecondSemester => second_ok.then_some((second.starts_at, second.ends_at)),
            EventOwner::AcademicYear => {
                year_end.filter(|_| second_ok).map(|end| (second.ends_at, end))
            }
        };

        let mut intervals: Vec<(NaiveDate, NaiveDate)> = Vec::new();
        for (i, ev) in events.iter().enumerate() {
            let path = format!("{}.{}", base, i);

            if let Some(id) = ev.id.as_deref() {
                if !known_ids.contains(id) {
                    errors.add(format!("{}.id", path), MSG_EVENT_NOT_OWNED);
                } else if !seen_ids.insert(id) {
                    errors.add(format!("{}.id", path), MSG_EVENT_LISTED_TWICE);
                }
            }

            if let Some(msg) = placement_error(ev.event_type, owner) {
                errors.add(format!("{}.eventType", path), msg);
            } else if ev.event_type.is_second_semester_end() {
                let count = seen_end_types.entry(ev.event_type).or_insert(0);
                *count += 1;
                if *count > 1 {
                    errors.add(
                        format!("{}.eventType", path),
                        format!(
                            "There can be only one {} event per academic year.",
                            ev.event_type.label()
                        ),
                    );
                }
            }

            if ev.starts_at >= ev.ends_at {
                errors.add(format!("{}.startsAt", path), MSG_START_BEFORE_END);
                continue;
            }

            if let Some((lo, hi)) = bounds {
                if ev.starts_at < lo || ev.ends_at > hi {
                    let msg = match owner {
                        EventOwner::AcademicYear => MSG_EVENT_AFTER_SEMESTERS,
                        _ => MSG_EVENT_IN_SEMESTER,
                    };
                    errors.add(format!("{}.nonFieldErrors", path), msg);
                }
            }
            intervals.push((ev.starts_at, ev.ends_at));
        }

        if has_overlap(&intervals) {
            errors.add(format!("{}.nonFieldErrors", base), MSG_EVENTS_OVERLAP);
        }
    }

    errors
}

fn check_semester_id(
    errors: &mut FieldErrors,
    path: &str,
    supplied: Option<&str>,
    stored: Option<&str>,
) {
    let Some(id) = supplied else {
        return;
    };
    if stored != Some(id) {
        errors.add(path, MSG_SEMESTER_NOT_OWNED);
    }
}

fn placement_error(event_type: EventType, owner: EventOwner) -> Option<String> {
    match (event_type.placement(), owner) {
        (Placement::AnySemester, EventOwner::AcademicYear) => Some(format!(
            "{} events must belong to a semester.",
            event_type.label()
        )),
        (Placement::SecondSemester, EventOwner::SecondSemester) => None,
        (Placement::SecondSemester, _) => Some(format!(
            "{} event must belong to the second semester.",
            event_type.label()
        )),
        (Placement::AcademicYear, EventOwner::AcademicYear) => None,
        (Placement::AcademicYear, _) => Some(format!(
            "{} events cannot be inside semesters.",
            event_type.label()
        )),
        (Placement::AnySemester, _) => None,
    }
}

/// True when any two intervals satisfy `a.start < b.end && b.start < a.end`.
pub fn has_overlap(intervals: &[(NaiveDate, NaiveDate)]) -> bool {
    let mut sorted: Vec<(NaiveDate, NaiveDate)> = intervals.to_vec();
    sorted.sort();
    let mut max_end: Option<NaiveDate> = None;
    for (start, end) in sorted {
        if let Some(prev_end) = max_end {
            if start < prev_end {
                return true;
            }
        }
        max_end = Some(max_end.map_or(end, |m| m.max(end)));
    }
    false
}
