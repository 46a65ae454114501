use crate::calendar::{self, AcademicYearCalendar, CalendarPayload, EventType, FieldErrors};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_query_failed, db_write_failed, get_academic_year, get_optional_str, parse_params,
    today_param, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::{settings, store};
use rusqlite::Connection;
use serde_json::json;

fn validation_failed(errors: &FieldErrors) -> HandlerErr {
    HandlerErr::new("validation_failed", "calendar validation failed").with_details(json!({
        "fields": errors.to_nested_json(),
        "flat": errors.to_flat_json(),
    }))
}

fn calendar_json(cal: &AcademicYearCalendar) -> serde_json::Value {
    serde_json::to_value(cal).unwrap_or(serde_json::Value::Null)
}

/// Finds the calendar addressed by `calendarId` or `academicYear`.
fn resolve_calendar(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<AcademicYearCalendar, HandlerErr> {
    let found = if let Some(id) = get_optional_str(params, "calendarId") {
        store::load_calendar(conn, &id).map_err(db_query_failed)?
    } else if params.get("academicYear").is_some() {
        let year = get_academic_year(params)?;
        store::load_calendar_for_year(conn, year).map_err(db_query_failed)?
    } else {
        return Err(HandlerErr::bad_params("missing calendarId or academicYear"));
    };
    found.ok_or_else(|| HandlerErr::not_found("academic year calendar not found"))
}

fn calendars_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let academic_year = get_academic_year(params)?;
    let payload: CalendarPayload = parse_params(params)?;

    if store::load_calendar_for_year(conn, academic_year)
        .map_err(db_query_failed)?
        .is_some()
    {
        return Err(HandlerErr::new(
            "conflict",
            "An academic year calendar already exists for this year.",
        ));
    }

    let start_month = settings::school_year_start_month(conn).map_err(db_query_failed)?;
    let errors = calendar::validate_calendar(&payload, academic_year, start_month, None);
    if !errors.is_empty() {
        tracing::info!(academic_year, failures = errors.len(), "calendar create rejected");
        return Err(validation_failed(&errors));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let calendar_id =
        store::insert_calendar(&tx, academic_year, &payload).map_err(db_write_failed)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(academic_year, calendar_id = %calendar_id, "calendar created");
    let cal = store::load_calendar(conn, &calendar_id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("academic year calendar not found"))?;
    Ok(json!({ "calendar": calendar_json(&cal) }))
}

fn calendars_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let existing = resolve_calendar(conn, params)?;
    let payload: CalendarPayload = parse_params(params)?;

    let start_month = settings::school_year_start_month(conn).map_err(db_query_failed)?;
    let errors = calendar::validate_calendar(
        &payload,
        existing.academic_year,
        start_month,
        Some(&existing),
    );
    if !errors.is_empty() {
        tracing::info!(
            calendar_id = %existing.id,
            failures = errors.len(),
            "calendar update rejected"
        );
        return Err(validation_failed(&errors));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let summary = store::replace_calendar(&tx, &existing, &payload).map_err(db_write_failed)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(
        calendar_id = %existing.id,
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        "calendar updated"
    );
    let cal = store::load_calendar(conn, &existing.id)
        .map_err(db_query_failed)?
        .ok_or_else(|| HandlerErr::not_found("academic year calendar not found"))?;
    Ok(json!({
        "calendar": calendar_json(&cal),
        "events": summary,
    }))
}

fn calendars_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let cal = resolve_calendar(conn, params)?;
    Ok(json!({ "calendar": calendar_json(&cal) }))
}

fn calendars_current(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = today_param(params)?;
    let start_month = settings::school_year_start_month(conn).map_err(db_query_failed)?;
    let academic_year = calendar::academic_year_of(today, start_month);
    let cal = store::load_calendar_for_year(conn, academic_year)
        .map_err(db_query_failed)?
        .ok_or_else(|| {
            HandlerErr::not_found("no academic year calendar for the current year")
                .with_details(json!({ "academicYear": academic_year }))
        })?;
    Ok(json!({
        "academicYear": academic_year,
        "calendar": calendar_json(&cal),
    }))
}

fn calendars_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let cals = store::list_calendars(conn).map_err(db_query_failed)?;
    Ok(json!({
        "calendars": cals.iter().map(calendar_json).collect::<Vec<_>>()
    }))
}

fn event_types() -> serde_json::Value {
    let types: Vec<serde_json::Value> = EventType::ALL
        .iter()
        .map(|t| {
            json!({
                "eventType": t,
                "label": t.label(),
                "placement": t.placement(),
            })
        })
        .collect();
    json!({ "eventTypes": types })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendars.create" => Some(with_conn(state, req, calendars_create)),
        "calendars.update" => Some(with_conn(state, req, calendars_update)),
        "calendars.get" => Some(with_conn(state, req, calendars_get)),
        "calendars.current" => Some(with_conn(state, req, calendars_current)),
        "calendars.list" => Some(with_conn(state, req, |conn, _| calendars_list(conn))),
        "calendars.eventTypes" => Some(ok(&req.id, event_types())),
        _ => None,
    }
}
