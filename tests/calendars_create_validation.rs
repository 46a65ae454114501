mod test_support;

use serde_json::json;
use test_support::{
    calendar_2020, error_code, field_messages, open_workspace, request, request_ok, spawn_sidecar,
};

#[test]
fn create_stores_calendar_with_week_counters() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-create");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calendars.create",
        calendar_2020(),
    );
    let cal = created.get("calendar").expect("calendar");
    assert_eq!(cal.get("academicYear").and_then(|v| v.as_i64()), Some(2020));

    let first = cal.get("firstSemester").expect("firstSemester");
    assert_eq!(first.get("startsAt").and_then(|v| v.as_str()), Some("2020-09-14"));
    assert_eq!(first.get("weeksCount").and_then(|v| v.as_u64()), Some(20));
    assert_eq!(first.get("workingWeeksCount").and_then(|v| v.as_u64()), Some(16));
    let first_events = first.get("events").and_then(|v| v.as_array()).expect("events");
    assert_eq!(first_events.len(), 2);
    assert!(first_events
        .iter()
        .any(|e| e.get("name").and_then(|v| v.as_str()) == Some("Winter holiday")));
    // Unnamed events take their type label.
    assert!(first_events
        .iter()
        .any(|e| e.get("name").and_then(|v| v.as_str()) == Some("Holiday")));

    let year_events = cal.get("events").and_then(|v| v.as_array()).expect("year events");
    assert_eq!(year_events.len(), 1);
    assert_eq!(
        year_events[0].get("eventType").and_then(|v| v.as_str()),
        Some("corigente")
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calendars.get",
        json!({ "academicYear": 2020 }),
    );
    assert_eq!(fetched.get("calendar"), Some(cal));

    let dup = request(&mut stdin, &mut reader, "3", "calendars.create", calendar_2020());
    assert_eq!(error_code(&dup), Some("conflict"));

    let _ = child.kill();
}

#[test]
fn second_semester_must_start_after_first_ends() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-order");

    let mut payload = calendar_2020();
    payload["firstSemester"] = json!({
        "startsAt": "2020-09-14",
        "endsAt": "2021-02-20",
        "events": []
    });
    let resp = request(&mut stdin, &mut reader, "1", "calendars.create", payload);
    assert_eq!(error_code(&resp), Some("validation_failed"));
    assert_eq!(
        field_messages(&resp, "secondSemester.startsAt"),
        vec!["Second semester must start after the end of the first semester.".to_string()]
    );
    let nested = resp
        .pointer("/error/details/fields/secondSemester/startsAt/0")
        .and_then(|v| v.as_str());
    assert_eq!(
        nested,
        Some("Second semester must start after the end of the first semester.")
    );

    // Nothing was stored.
    let listed = request_ok(&mut stdin, &mut reader, "2", "calendars.list", json!({}));
    assert_eq!(
        listed.get("calendars").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = child.kill();
}

#[test]
fn create_reports_dates_bounds_and_overlap() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-bounds");

    let mut payload = calendar_2020();
    payload["firstSemester"]["events"] = json!([
        { "eventType": "holiday", "startsAt": "2020-11-10", "endsAt": "2020-11-01" },
        { "eventType": "holiday", "startsAt": "2020-09-01", "endsAt": "2020-09-20" },
        { "eventType": "holiday", "startsAt": "2020-12-21", "endsAt": "2021-01-03" },
        { "eventType": "holiday", "startsAt": "2021-01-02", "endsAt": "2021-01-10" }
    ]);
    payload["events"] = json!([
        { "eventType": "diferente", "startsAt": "2021-08-20", "endsAt": "2021-09-05" }
    ]);

    let resp = request(&mut stdin, &mut reader, "1", "calendars.create", payload);
    assert_eq!(error_code(&resp), Some("validation_failed"));
    assert_eq!(
        field_messages(&resp, "firstSemester.events.0.startsAt"),
        vec!["The start date must be before the end date.".to_string()]
    );
    assert_eq!(
        field_messages(&resp, "firstSemester.events.1.nonFieldErrors"),
        vec!["The event must be between the semester's start and end dates.".to_string()]
    );
    assert_eq!(
        field_messages(&resp, "firstSemester.events.nonFieldErrors"),
        vec!["Events cannot overlap.".to_string()]
    );
    assert_eq!(
        field_messages(&resp, "events.0.nonFieldErrors"),
        vec![
            "The event must be between the end of the second semester and the end of the academic year."
                .to_string()
        ]
    );

    let _ = child.kill();
}

#[test]
fn touching_events_do_not_overlap() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-touching");

    let mut payload = calendar_2020();
    payload["firstSemester"]["events"] = json!([
        { "eventType": "holiday", "startsAt": "2020-12-21", "endsAt": "2021-01-03" },
        { "eventType": "holiday", "startsAt": "2021-01-03", "endsAt": "2021-01-10" }
    ]);
    let _ = request_ok(&mut stdin, &mut reader, "1", "calendars.create", payload);

    let _ = child.kill();
}

#[test]
fn create_rejects_unknown_ids_and_bad_year() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-ids");

    let mut payload = calendar_2020();
    payload["firstSemester"]["id"] = json!("not-a-stored-semester");
    payload["events"][0]["id"] = json!("not-a-stored-event");
    let resp = request(&mut stdin, &mut reader, "1", "calendars.create", payload);
    assert_eq!(error_code(&resp), Some("validation_failed"));
    assert_eq!(
        field_messages(&resp, "firstSemester.id"),
        vec!["The semester must belong to this academic year.".to_string()]
    );
    assert_eq!(
        field_messages(&resp, "events.0.id"),
        vec!["The event must belong to the academic year.".to_string()]
    );

    let mut bad_year = calendar_2020();
    bad_year["academicYear"] = json!("twenty");
    let resp = request(&mut stdin, &mut reader, "2", "calendars.create", bad_year);
    assert_eq!(error_code(&resp), Some("bad_params"));

    let _ = child.kill();
}
