use crate::calendar::{self, AcademicYearCalendar};
use crate::catalog::{self, Student, StudyClass, MAX_GRADE, MIN_GRADE};
use crate::gate::{self, EditWindow};
use crate::ipc::helpers::{
    db_query_failed, db_write_failed, get_i64_in_range, get_required_str, parse_date,
    today_param, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::risk;
use crate::{settings, store};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

fn current_calendar(conn: &Connection, today: NaiveDate) -> Result<Option<AcademicYearCalendar>, HandlerErr> {
    let start_month = settings::school_year_start_month(conn).map_err(db_query_failed)?;
    let year = calendar::academic_year_of(today, start_month);
    store::load_calendar_for_year(conn, year).map_err(db_query_failed)
}

fn require_class(conn: &Connection, class_id: &str) -> Result<StudyClass, HandlerErr> {
    catalog::get_class(conn, class_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("class not found"))
}

fn require_student(conn: &Connection, student_id: &str) -> Result<(Student, StudyClass), HandlerErr> {
    let student = catalog::get_student(conn, student_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let class = require_class(conn, &student.class_id)?;
    Ok((student, class))
}

/// Open edit window for a catalog write.
struct OpenWindow {
    semester: u8,
    period: (NaiveDate, NaiveDate),
}

/// Gate check shared by every catalog write; returns the semester to file
/// the entry under and the dates it may carry.
fn require_open_window(
    conn: &Connection,
    class: &StudyClass,
    today: NaiveDate,
) -> Result<OpenWindow, HandlerErr> {
    let cal = current_calendar(conn, today)?;
    let window = gate::edit_window(class, today, cal.as_ref());
    let period = cal
        .as_ref()
        .and_then(|c| gate::filing_period(class, &window, c));
    match (window.semester, period) {
        (Some(semester), Some(period)) => Ok(OpenWindow { semester, period }),
        _ => {
            tracing::info!(
                class_id = %class.id,
                %today,
                reason = ?window.reason,
                "catalog edit denied"
            );
            Err(
                HandlerErr::new("edit_window_closed", window.reason.message())
                    .with_details(json!({ "reason": window.reason })),
            )
        }
    }
}

fn taken_at_param(params: &serde_json::Value, today: NaiveDate) -> Result<NaiveDate, HandlerErr> {
    let taken_at = match params.get("takenAt").and_then(|v| v.as_str()) {
        Some(raw) => parse_date(raw, "takenAt")?,
        None => today,
    };
    if taken_at > today {
        return Err(HandlerErr::bad_params("takenAt must not be after today"));
    }
    Ok(taken_at)
}

fn check_taken_at(taken_at: NaiveDate, window: &OpenWindow) -> Result<(), HandlerErr> {
    let (lo, hi) = window.period;
    if taken_at < lo || taken_at > hi {
        return Err(HandlerErr::bad_params(format!(
            "takenAt must be between {} and {}",
            lo, hi
        ))
        .with_details(json!({ "semester": window.semester })));
    }
    Ok(())
}

fn window_json(window: &EditWindow) -> serde_json::Value {
    json!({
        "allowed": window.allowed,
        "reason": window.reason,
        "message": window.reason.message(),
        "semester": window.semester,
    })
}

fn catalog_can_modify(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let today = today_param(params)?;
    let class = require_class(conn, &class_id)?;
    let cal = current_calendar(conn, today)?;
    let window = gate::edit_window(&class, today, cal.as_ref());
    Ok(window_json(&window))
}

fn catalog_add_grade(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let grade = get_i64_in_range(params, "grade", MIN_GRADE.into(), MAX_GRADE.into())? as u8;
    let today = today_param(params)?;
    let taken_at = taken_at_param(params, today)?;

    let (student, class) = require_student(conn, &student_id)?;
    let window = require_open_window(conn, &class, today)?;
    check_taken_at(taken_at, &window)?;
    let id = catalog::insert_grade(conn, &student.id, &subject, window.semester, grade, taken_at)
        .map_err(db_write_failed)?;
    Ok(json!({ "gradeId": id, "semester": window.semester }))
}

fn catalog_add_absence(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject = get_required_str(params, "subject")?;
    let is_founded = match params.get("isFounded") {
        None | Some(serde_json::Value::Null) => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("isFounded must be boolean"))?,
    };
    let today = today_param(params)?;
    let taken_at = taken_at_param(params, today)?;

    let (student, class) = require_student(conn, &student_id)?;
    let window = require_open_window(conn, &class, today)?;
    check_taken_at(taken_at, &window)?;
    let id = catalog::insert_absence(
        conn,
        &student.id,
        &subject,
        window.semester,
        taken_at,
        is_founded,
    )
    .map_err(db_write_failed)?;
    Ok(json!({ "absenceId": id, "semester": window.semester }))
}

fn catalog_set_behavior_grade(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let grade = get_i64_in_range(params, "grade", MIN_GRADE.into(), MAX_GRADE.into())? as u8;
    let today = today_param(params)?;

    let (student, class) = require_student(conn, &student_id)?;
    require_open_window(conn, &class, today)?;
    catalog::set_behavior_grade(conn, &student.id, grade).map_err(db_write_failed)?;
    Ok(json!({ "studentId": student.id, "behaviorGrade": grade }))
}

fn catalog_student_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let semester = match params.get("semester") {
        Some(v) if !v.is_null() => Some(get_i64_in_range(params, "semester", 1, 2)? as u8),
        _ => None,
    };
    let (student, class) = require_student(conn, &student_id)?;
    let record =
        catalog::load_student_record(conn, &student, &class, semester).map_err(db_query_failed)?;
    let thresholds = settings::risk_thresholds(conn).map_err(db_query_failed)?;
    let assessed = risk::assess_student(&record, &thresholds);
    Ok(json!({
        "student": student,
        "class": class,
        "semester": semester,
        "average": assessed.average,
        "subjects": assessed.subjects,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.canModify" => Some(with_conn(state, req, catalog_can_modify)),
        "catalog.addGrade" => Some(with_conn(state, req, catalog_add_grade)),
        "catalog.addAbsence" => Some(with_conn(state, req, catalog_add_absence)),
        "catalog.setBehaviorGrade" => Some(with_conn(state, req, catalog_set_behavior_grade)),
        "catalog.studentOpen" => Some(with_conn(state, req, catalog_student_open)),
        _ => None,
    }
}
