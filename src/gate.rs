use crate::calendar::{AcademicYearCalendar, EventType};
use crate::catalog::{StudyClass, Track};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditReason {
    NoCalendar,
    ClassNotInCurrentYear,
    ExamSession,
    SemesterEndWindow,
    SemesterEndedForGrade,
    InsideSemester,
    OutsideSemesters,
}

impl EditReason {
    pub fn message(self) -> &'static str {
        match self {
            EditReason::NoCalendar => "There is no academic calendar for the current year.",
            EditReason::ClassNotInCurrentYear => {
                "The study class does not belong to the current academic year."
            }
            EditReason::ExamSession => {
                "Grades and absences cannot be changed during Corigente or Diferente."
            }
            EditReason::SemesterEndWindow => "Inside the semester end window for this grade.",
            EditReason::SemesterEndedForGrade => "The second semester has ended for this grade.",
            EditReason::InsideSemester => "Inside a semester.",
            EditReason::OutsideSemesters => {
                "Grades and absences can only be changed during the semesters."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditWindow {
    pub allowed: bool,
    pub reason: EditReason,
    /// Semester the edit is attributed to when allowed.
    pub semester: Option<u8>,
}

impl EditWindow {
    fn denied(reason: EditReason) -> Self {
        Self {
            allowed: false,
            reason,
            semester: None,
        }
    }

    fn allowed(reason: EditReason, semester: u8) -> Self {
        Self {
            allowed: true,
            reason,
            semester: Some(semester),
        }
    }
}

/// The second-semester-end event type that closes the year early for a class,
/// if its grade has one.
pub fn semester_end_type_for(class: &StudyClass) -> Option<EventType> {
    match (class.class_grade, class.track) {
        (8, _) => Some(EventType::SecondSemesterEndViiiGrade),
        (12 | 13, _) => Some(EventType::SecondSemesterEndXiiGrade),
        (9..=11, Track::Technological) => Some(EventType::SecondSemesterEndTechnological),
        _ => None,
    }
}

/// Decides whether grades and absences of `class` may be changed on `today`.
pub fn edit_window(
    class: &StudyClass,
    today: NaiveDate,
    calendar: Option<&AcademicYearCalendar>,
) -> EditWindow {
    let Some(calendar) = calendar else {
        return EditWindow::denied(EditReason::NoCalendar);
    };
    if class.academic_year != calendar.academic_year {
        return EditWindow::denied(EditReason::ClassNotInCurrentYear);
    }

    let in_exam_session = calendar
        .events_of_type(EventType::Corigente)
        .chain(calendar.events_of_type(EventType::Diferente))
        .any(|e| e.contains(today));
    if in_exam_session {
        return EditWindow::denied(EditReason::ExamSession);
    }

    if let Some(end_type) = semester_end_type_for(class) {
        if let Some(end_event) = calendar.events_of_type(end_type).next() {
            if end_event.contains(today) {
                return EditWindow::allowed(EditReason::SemesterEndWindow, 2);
            }
            if today > end_event.ends_at && calendar.second_semester.contains(today) {
                return EditWindow::denied(EditReason::SemesterEndedForGrade);
            }
        }
    }

    match calendar.semester_for(today) {
        Some(semester) => EditWindow::allowed(EditReason::InsideSemester, semester),
        None => EditWindow::denied(EditReason::OutsideSemesters),
    }
}

/// Dates an entry allowed by `window` may carry: the semester it is filed
/// under, or from the second semester start to the end of the grade's
/// semester-end event inside that window.
pub fn filing_period(
    class: &StudyClass,
    window: &EditWindow,
    calendar: &AcademicYearCalendar,
) -> Option<(NaiveDate, NaiveDate)> {
    if !window.allowed {
        return None;
    }
    let first = &calendar.first_semester;
    let second = &calendar.second_semester;
    match (window.reason, window.semester) {
        (EditReason::SemesterEndWindow, _) => {
            let end_type = semester_end_type_for(class)?;
            let end_event = calendar.events_of_type(end_type).next()?;
            Some((second.starts_at, end_event.ends_at))
        }
        (_, Some(1)) => Some((first.starts_at, first.ends_at)),
        (_, Some(2)) => Some((second.starts_at, second.ends_at)),
        _ => None,
    }
}
