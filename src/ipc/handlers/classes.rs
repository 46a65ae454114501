use crate::catalog::{self, Track};
use crate::ipc::helpers::{
    db_query_failed, db_write_failed, get_academic_year, get_i64_in_range, get_optional_str,
    get_required_str, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_unit_id = get_required_str(params, "schoolUnitId")?;
    let academic_year = get_academic_year(params)?;
    let class_grade = get_i64_in_range(params, "classGrade", 0, 13)? as u8;
    let class_letter = get_required_str(params, "classLetter")?.to_uppercase();
    if class_letter.chars().count() > 3 {
        return Err(HandlerErr::bad_params("classLetter length must be <= 3"));
    }
    let track = match get_optional_str(params, "track") {
        Some(raw) => Track::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("track must be one of: theoretical, technological, vocational")
        })?,
        None => Track::Theoretical,
    };

    if catalog::class_exists_with_name(conn, &school_unit_id, academic_year, class_grade, &class_letter)
        .map_err(db_query_failed)?
    {
        return Err(HandlerErr::new(
            "conflict",
            "A study class with this grade and letter already exists.",
        ));
    }

    let class = catalog::insert_class(
        conn,
        &school_unit_id,
        academic_year,
        class_grade,
        &class_letter,
        track,
    )
    .map_err(db_write_failed)?;
    tracing::info!(class_id = %class.id, school_unit_id = %school_unit_id, "study class created");
    Ok(json!({ "class": class }))
}

fn classes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_unit_id = get_optional_str(params, "schoolUnitId");
    let academic_year = match params.get("academicYear") {
        Some(v) if !v.is_null() => Some(get_academic_year(params)?),
        _ => None,
    };
    let classes = catalog::list_classes(conn, school_unit_id.as_deref(), academic_year)
        .map_err(db_query_failed)?;
    Ok(json!({ "classes": classes }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let full_name = get_required_str(params, "fullName")?;
    if catalog::get_class(conn, &class_id)
        .map_err(db_query_failed)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class not found"));
    }
    let student = catalog::insert_student(conn, &class_id, &full_name).map_err(db_write_failed)?;
    Ok(json!({ "student": student }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if catalog::get_class(conn, &class_id)
        .map_err(db_query_failed)?
        .is_none()
    {
        return Err(HandlerErr::not_found("class not found"));
    }
    let students = catalog::list_students(conn, &class_id).map_err(db_query_failed)?;
    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(with_conn(state, req, classes_create)),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        _ => None,
    }
}
