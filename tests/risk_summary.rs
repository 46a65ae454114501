mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{calendar_2020, error_code, open_workspace, request, request_ok, spawn_sidecar};

const OPEN_DAY: &str = "2020-10-05";

fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    class_id: &str,
    name: &str,
    grades: &[u8],
    behavior: Option<u8>,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        "s",
        "students.create",
        json!({ "classId": class_id, "fullName": name }),
    );
    let student_id = created
        .pointer("/student/id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();
    for g in grades {
        let _ = request_ok(
            stdin,
            reader,
            "g",
            "catalog.addGrade",
            json!({ "studentId": student_id, "subject": "Math", "grade": g, "today": OPEN_DAY }),
        );
    }
    if let Some(b) = behavior {
        let _ = request_ok(
            stdin,
            reader,
            "b",
            "catalog.setBehaviorGrade",
            json!({ "studentId": student_id, "grade": b, "today": OPEN_DAY }),
        );
    }
    student_id
}

fn class_id_of(created: &serde_json::Value) -> String {
    created
        .pointer("/class/id")
        .and_then(|v| v.as_str())
        .expect("class id")
        .to_string()
}

fn reason_kinds(student: &serde_json::Value) -> Vec<String> {
    student
        .get("reasons")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|r| r.get("kind").and_then(|v| v.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn risk_summaries_roll_up_from_students() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "schoolcal-risk");
    let _ = request_ok(&mut stdin, &mut reader, "cal", "calendars.create", calendar_2020());

    let ix = class_id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "classes.create",
        json!({ "schoolUnitId": "school-1", "academicYear": 2020, "classGrade": 9, "classLetter": "A" }),
    ));
    let v = class_id_of(&request_ok(
        &mut stdin,
        &mut reader,
        "c2",
        "classes.create",
        json!({ "schoolUnitId": "school-1", "academicYear": 2020, "classGrade": 5, "classLetter": "A" }),
    ));

    let low_avg = add_student(&mut stdin, &mut reader, &ix, "Low Average", &[4, 5], None);
    let _ = add_student(&mut stdin, &mut reader, &ix, "Low Behavior", &[9, 10], Some(5));
    let steady = add_student(&mut stdin, &mut reader, &ix, "Steady", &[8], None);
    let _ = add_student(&mut stdin, &mut reader, &v, "Young", &[7], Some(7));

    let one = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "risk.student",
        json!({ "studentId": low_avg }),
    );
    let student = one.get("student").expect("student");
    assert_eq!(student.get("atRisk").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(student.get("average").and_then(|v| v.as_f64()), Some(4.5));
    assert_eq!(reason_kinds(student), vec!["low_average".to_string()]);

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "risk.class",
        json!({ "classId": ix }),
    );
    let summary = class.get("summary").expect("summary");
    assert_eq!(summary.get("studentsCount").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(summary.get("studentsAtRiskCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(summary.get("average").and_then(|v| v.as_f64()), Some(7.33));
    assert_eq!(
        summary.get("behaviorGradeAverage").and_then(|v| v.as_f64()),
        Some(8.33)
    );

    let school = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "risk.school",
        json!({ "schoolUnitId": "school-1", "academicYear": 2020 }),
    );
    assert_eq!(
        school.pointer("/summary/studentsCount").and_then(|v| v.as_u64()),
        Some(4)
    );
    // Grade V uses the gymnasium behavior limit of 8.
    assert_eq!(
        school.pointer("/summary/studentsAtRiskCount").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        school.get("classes").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    // Second semester has no grades yet.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "r4",
        "risk.class",
        json!({ "classId": ix, "semester": 2 }),
    );
    assert_eq!(
        second.pointer("/summary/average"),
        Some(&serde_json::Value::Null)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "set",
        "setup.update",
        json!({ "section": "risk", "patch": { "unfoundedAbsencesLimit": 2, "behaviorGradeLimitGymnasium": 6 } }),
    );
    for i in 0..2 {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("abs{}", i),
            "catalog.addAbsence",
            json!({ "studentId": steady, "subject": "Math", "today": OPEN_DAY }),
        );
    }
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "r5",
        "risk.school",
        json!({ "schoolUnitId": "school-1", "academicYear": 2020 }),
    );
    assert_eq!(
        after.pointer("/summary/studentsAtRiskCount").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        after.pointer("/summary/unfoundedAbsences").and_then(|v| v.as_u64()),
        Some(2)
    );
    let steady_risk = request_ok(
        &mut stdin,
        &mut reader,
        "r6",
        "risk.student",
        json!({ "studentId": steady }),
    );
    assert_eq!(
        reason_kinds(steady_risk.get("student").expect("student")),
        vec!["unfounded_absences".to_string()]
    );

    let empty = request(
        &mut stdin,
        &mut reader,
        "r7",
        "risk.school",
        json!({ "schoolUnitId": "school-2", "academicYear": 2020 }),
    );
    assert_eq!(error_code(&empty), Some("not_found"));

    let _ = child.kill();
}
