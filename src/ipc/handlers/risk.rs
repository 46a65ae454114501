use crate::catalog::{self, StudyClass};
use crate::ipc::helpers::{
    db_query_failed, get_academic_year, get_i64_in_range, get_required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::risk::{self, RiskThresholds, StudentRisk};
use crate::settings;
use rusqlite::Connection;
use serde_json::json;

fn semester_param(params: &serde_json::Value) -> Result<Option<u8>, HandlerErr> {
    match params.get("semester") {
        Some(v) if !v.is_null() => Ok(Some(get_i64_in_range(params, "semester", 1, 2)? as u8)),
        _ => Ok(None),
    }
}

fn assess_class(
    conn: &Connection,
    class: &StudyClass,
    semester: Option<u8>,
    thresholds: &RiskThresholds,
) -> Result<Vec<StudentRisk>, HandlerErr> {
    let students = catalog::list_students(conn, &class.id).map_err(db_query_failed)?;
    let mut out = Vec::with_capacity(students.len());
    for s in &students {
        let record = catalog::load_student_record(conn, s, class, semester).map_err(db_query_failed)?;
        out.push(risk::assess_student(&record, thresholds));
    }
    Ok(out)
}

fn risk_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let semester = semester_param(params)?;
    let student = catalog::get_student(conn, &student_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let class = catalog::get_class(conn, &student.class_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    let thresholds = settings::risk_thresholds(conn).map_err(db_query_failed)?;
    let record =
        catalog::load_student_record(conn, &student, &class, semester).map_err(db_query_failed)?;
    Ok(json!({ "student": risk::assess_student(&record, &thresholds) }))
}

fn risk_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let semester = semester_param(params)?;
    let class = catalog::get_class(conn, &class_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    let thresholds = settings::risk_thresholds(conn).map_err(db_query_failed)?;
    let students = assess_class(conn, &class, semester, &thresholds)?;
    let summary = risk::summarize(&students);
    Ok(json!({
        "class": class,
        "summary": summary,
        "students": students,
    }))
}

fn risk_school(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_unit_id = get_required_str(params, "schoolUnitId")?;
    let academic_year = get_academic_year(params)?;
    let semester = semester_param(params)?;
    let classes = catalog::list_classes(conn, Some(&school_unit_id), Some(academic_year))
        .map_err(db_query_failed)?;
    if classes.is_empty() {
        return Err(HandlerErr::not_found("no study classes for this school unit and year"));
    }
    let thresholds = settings::risk_thresholds(conn).map_err(db_query_failed)?;

    let mut all_students: Vec<StudentRisk> = Vec::new();
    let mut per_class = Vec::with_capacity(classes.len());
    for class in &classes {
        let students = assess_class(conn, class, semester, &thresholds)?;
        per_class.push(json!({
            "classId": class.id,
            "classGrade": class.class_grade,
            "classLetter": class.class_letter,
            "summary": risk::summarize(&students),
        }));
        all_students.extend(students);
    }
    tracing::debug!(
        school_unit_id = %school_unit_id,
        classes = classes.len(),
        students = all_students.len(),
        "school risk computed"
    );
    Ok(json!({
        "schoolUnitId": school_unit_id,
        "academicYear": academic_year,
        "summary": risk::summarize(&all_students),
        "classes": per_class,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "risk.student" => Some(with_conn(state, req, risk_student)),
        "risk.class" => Some(with_conn(state, req, risk_class)),
        "risk.school" => Some(with_conn(state, req, risk_school)),
        _ => None,
    }
}
