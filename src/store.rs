use crate::calendar::{
    AcademicYearCalendar, CalendarPayload, EventOwner, EventPayload, EventType, SchoolEvent,
    SemesterCalendar, SemesterPayload,
};
use crate::db::now_timestamp;
use anyhow::anyhow;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

pub fn load_calendar(conn: &Connection, calendar_id: &str) -> anyhow::Result<Option<AcademicYearCalendar>> {
    let year: Option<i32> = conn
        .query_row(
            "SELECT academic_year FROM academic_year_calendars WHERE id = ?",
            [calendar_id],
            |r| r.get(0),
        )
        .optional()?;
    match year {
        Some(y) => Ok(Some(load_full(conn, calendar_id, y)?)),
        None => Ok(None),
    }
}

pub fn load_calendar_for_year(
    conn: &Connection,
    academic_year: i32,
) -> anyhow::Result<Option<AcademicYearCalendar>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM academic_year_calendars WHERE academic_year = ?",
            [academic_year],
            |r| r.get(0),
        )
        .optional()?;
    match id {
        Some(id) => Ok(Some(load_full(conn, &id, academic_year)?)),
        None => Ok(None),
    }
}

pub fn list_calendars(conn: &Connection) -> anyhow::Result<Vec<AcademicYearCalendar>> {
    let mut stmt = conn.prepare(
        "SELECT id, academic_year FROM academic_year_calendars ORDER BY academic_year DESC",
    )?;
    let headers = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i32>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    headers
        .into_iter()
        .map(|(id, year)| load_full(conn, &id, year))
        .collect()
}

fn load_full(conn: &Connection, calendar_id: &str, academic_year: i32) -> anyhow::Result<AcademicYearCalendar> {
    let mut first_semester = load_semester(conn, calendar_id, 1)?;
    let mut second_semester = load_semester(conn, calendar_id, 2)?;
    let mut year_events = Vec::new();

    for (owner, event) in load_events(conn, calendar_id)? {
        match owner {
            EventOwner::FirstSemester => first_semester.events.push(event),
            EventOwner::SecondSemester => second_semester.events.push(event),
            EventOwner::AcademicYear => year_events.push(event),
        }
    }

    Ok(AcademicYearCalendar {
        id: calendar_id.to_string(),
        academic_year,
        first_semester,
        second_semester,
        events: year_events,
    })
}

fn load_semester(conn: &Connection, calendar_id: &str, position: i64) -> anyhow::Result<SemesterCalendar> {
    conn.query_row(
        "SELECT id, starts_at, ends_at, weeks_count, working_weeks_count
         FROM semester_calendars
         WHERE calendar_id = ? AND position = ?",
        (calendar_id, position),
        |r| {
            Ok(SemesterCalendar {
                id: r.get(0)?,
                starts_at: r.get(1)?,
                ends_at: r.get(2)?,
                weeks_count: r.get(3)?,
                working_weeks_count: r.get(4)?,
                events: Vec::new(),
            })
        },
    )
    .optional()?
    .ok_or_else(|| anyhow!("calendar {} is missing semester {}", calendar_id, position))
}

fn load_events(conn: &Connection, calendar_id: &str) -> anyhow::Result<Vec<(EventOwner, SchoolEvent)>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, event_type, name, starts_at, ends_at
         FROM school_events
         WHERE calendar_id = ?
         ORDER BY starts_at, rowid",
    )?;
    let rows = stmt
        .query_map([calendar_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, NaiveDate>(4)?,
                r.get::<_, NaiveDate>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, owner_raw, type_raw, name, starts_at, ends_at) in rows {
        let owner = EventOwner::parse(&owner_raw)
            .ok_or_else(|| anyhow!("event {} has unknown owner {}", id, owner_raw))?;
        let event_type = EventType::parse(&type_raw)
            .ok_or_else(|| anyhow!("event {} has unknown type {}", id, type_raw))?;
        out.push((
            owner,
            SchoolEvent {
                id,
                event_type,
                name,
                starts_at,
                ends_at,
            },
        ));
    }
    Ok(out)
}

/// Inserts a new calendar with both semesters and all events. The payload
/// must already be validated; run inside a transaction.
pub fn insert_calendar(
    conn: &Connection,
    academic_year: i32,
    payload: &CalendarPayload,
) -> anyhow::Result<String> {
    let calendar_id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO academic_year_calendars(id, academic_year, created_at, updated_at)
         VALUES(?, ?, ?, ?)",
        (&calendar_id, academic_year, &now, &now),
    )?;

    let first_id = Uuid::new_v4().to_string();
    let second_id = Uuid::new_v4().to_string();
    insert_semester(conn, &calendar_id, &first_id, 1, &payload.first_semester)?;
    insert_semester(conn, &calendar_id, &second_id, 2, &payload.second_semester)?;

    for (owner, events) in payload.collections() {
        let semester_id = semester_id_for(owner, &first_id, &second_id);
        for ev in events {
            insert_event(conn, &calendar_id, owner, semester_id, ev)?;
        }
    }
    Ok(calendar_id)
}

/// Replaces semesters and the full event set of `existing` with `payload`.
///
/// Events carrying an id are updated in place (possibly moving between
/// collections), events without one are inserted, and stored events missing
/// from the payload are deleted. The payload must already be validated
/// against `existing`; run inside a transaction.
pub fn replace_calendar(
    conn: &Connection,
    existing: &AcademicYearCalendar,
    payload: &CalendarPayload,
) -> anyhow::Result<ReplaceSummary> {
    let mut summary = ReplaceSummary::default();
    let first_id = existing.first_semester.id.as_str();
    let second_id = existing.second_semester.id.as_str();

    update_semester(conn, first_id, &payload.first_semester)?;
    update_semester(conn, second_id, &payload.second_semester)?;

    let keep: HashSet<&str> = payload
        .collections()
        .into_iter()
        .flat_map(|(_, events)| events.iter().filter_map(|e| e.id.as_deref()))
        .collect();
    for (_, stored) in existing.all_events() {
        if !keep.contains(stored.id.as_str()) {
            conn.execute(
                "DELETE FROM school_events WHERE id = ? AND calendar_id = ?",
                (&stored.id, &existing.id),
            )?;
            summary.deleted += 1;
        }
    }

    for (owner, events) in payload.collections() {
        let semester_id = semester_id_for(owner, first_id, second_id);
        for ev in events {
            match ev.id.as_deref() {
                Some(id) => {
                    let changed = conn.execute(
                        "UPDATE school_events
                         SET owner = ?, semester_id = ?, event_type = ?, name = ?,
                             starts_at = ?, ends_at = ?
                         WHERE id = ? AND calendar_id = ?",
                        (
                            owner.as_str(),
                            semester_id,
                            ev.event_type.as_str(),
                            ev.display_name(),
                            ev.starts_at,
                            ev.ends_at,
                            id,
                            &existing.id,
                        ),
                    )?;
                    if changed != 1 {
                        return Err(anyhow!("event {} does not belong to calendar {}", id, existing.id));
                    }
                    summary.updated += 1;
                }
                None => {
                    insert_event(conn, &existing.id, owner, semester_id, ev)?;
                    summary.created += 1;
                }
            }
        }
    }

    conn.execute(
        "UPDATE academic_year_calendars SET updated_at = ? WHERE id = ?",
        (now_timestamp(), &existing.id),
    )?;
    Ok(summary)
}

fn semester_id_for<'a>(owner: EventOwner, first_id: &'a str, second_id: &'a str) -> Option<&'a str> {
    match owner {
        EventOwner::FirstSemester => Some(first_id),
        EventOwner::SecondSemester => Some(second_id),
        EventOwner::AcademicYear => None,
    }
}

fn insert_semester(
    conn: &Connection,
    calendar_id: &str,
    semester_id: &str,
    position: i64,
    semester: &SemesterPayload,
) -> anyhow::Result<()> {
    let (weeks, working) = semester.week_counters();
    conn.execute(
        "INSERT INTO semester_calendars(
            id, calendar_id, position, starts_at, ends_at, weeks_count, working_weeks_count
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            semester_id,
            calendar_id,
            position,
            semester.starts_at,
            semester.ends_at,
            weeks,
            working,
        ),
    )?;
    Ok(())
}

fn update_semester(conn: &Connection, semester_id: &str, semester: &SemesterPayload) -> anyhow::Result<()> {
    let (weeks, working) = semester.week_counters();
    conn.execute(
        "UPDATE semester_calendars
         SET starts_at = ?, ends_at = ?, weeks_count = ?, working_weeks_count = ?
         WHERE id = ?",
        (
            semester.starts_at,
            semester.ends_at,
            weeks,
            working,
            semester_id,
        ),
    )?;
    Ok(())
}

fn insert_event(
    conn: &Connection,
    calendar_id: &str,
    owner: EventOwner,
    semester_id: Option<&str>,
    ev: &EventPayload,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO school_events(
            id, calendar_id, owner, semester_id, event_type, name, starts_at, ends_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            calendar_id,
            owner.as_str(),
            semester_id,
            ev.event_type.as_str(),
            ev.display_name(),
            ev.starts_at,
            ev.ends_at,
        ),
    )?;
    Ok(id)
}
