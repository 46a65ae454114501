use crate::db::now_timestamp;
use crate::risk::{StudentRecord, SubjectRecord};
use anyhow::anyhow;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const MIN_GRADE: u8 = 1;
pub const MAX_GRADE: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Theoretical,
    Technological,
    Vocational,
}

impl Track {
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Theoretical => "theoretical",
            Track::Technological => "technological",
            Track::Vocational => "vocational",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "theoretical" => Some(Track::Theoretical),
            "technological" => Some(Track::Technological),
            "vocational" => Some(Track::Vocational),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyClass {
    pub id: String,
    pub school_unit_id: String,
    pub academic_year: i32,
    /// 0 is the preparatory grade, 1..=13 the regular ones.
    pub class_grade: u8,
    pub class_letter: String,
    pub track: Track,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub full_name: String,
    pub behavior_grade: u8,
}

fn class_from_row(
    id: String,
    school_unit_id: String,
    academic_year: i32,
    class_grade: u8,
    class_letter: String,
    track_raw: String,
) -> anyhow::Result<StudyClass> {
    let track = Track::parse(&track_raw)
        .ok_or_else(|| anyhow!("class {} has unknown track {}", id, track_raw))?;
    Ok(StudyClass {
        id,
        school_unit_id,
        academic_year,
        class_grade,
        class_letter,
        track,
    })
}

type ClassRow = (String, String, i32, u8, String, String);

fn read_class_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
    ))
}

pub fn insert_class(
    conn: &Connection,
    school_unit_id: &str,
    academic_year: i32,
    class_grade: u8,
    class_letter: &str,
    track: Track,
) -> anyhow::Result<StudyClass> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO study_classes(id, school_unit_id, academic_year, class_grade, class_letter, track)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            school_unit_id,
            academic_year,
            class_grade,
            class_letter,
            track.as_str(),
        ),
    )?;
    Ok(StudyClass {
        id,
        school_unit_id: school_unit_id.to_string(),
        academic_year,
        class_grade,
        class_letter: class_letter.to_string(),
        track,
    })
}

pub fn class_exists_with_name(
    conn: &Connection,
    school_unit_id: &str,
    academic_year: i32,
    class_grade: u8,
    class_letter: &str,
) -> anyhow::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM study_classes
             WHERE school_unit_id = ? AND academic_year = ? AND class_grade = ? AND class_letter = ?",
            (school_unit_id, academic_year, class_grade, class_letter),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn get_class(conn: &Connection, class_id: &str) -> anyhow::Result<Option<StudyClass>> {
    let row = conn
        .query_row(
            "SELECT id, school_unit_id, academic_year, class_grade, class_letter, track
             FROM study_classes WHERE id = ?",
            [class_id],
            read_class_row,
        )
        .optional()?;
    match row {
        Some((id, school, year, grade, letter, track)) => {
            Ok(Some(class_from_row(id, school, year, grade, letter, track)?))
        }
        None => Ok(None),
    }
}

pub fn list_classes(
    conn: &Connection,
    school_unit_id: Option<&str>,
    academic_year: Option<i32>,
) -> anyhow::Result<Vec<StudyClass>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_unit_id, academic_year, class_grade, class_letter, track
         FROM study_classes
         WHERE (?1 IS NULL OR school_unit_id = ?1)
           AND (?2 IS NULL OR academic_year = ?2)
         ORDER BY academic_year DESC, class_grade, class_letter",
    )?;
    let rows = stmt
        .query_map((school_unit_id, academic_year), read_class_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, school, year, grade, letter, track)| {
            class_from_row(id, school, year, grade, letter, track)
        })
        .collect()
}

pub fn insert_student(conn: &Connection, class_id: &str, full_name: &str) -> anyhow::Result<Student> {
    let id = Uuid::new_v4().to_string();
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO students(id, class_id, full_name, sort_order, behavior_grade)
         VALUES(?, ?, ?, ?, ?)",
        (&id, class_id, full_name, next_sort, MAX_GRADE),
    )?;
    Ok(Student {
        id,
        class_id: class_id.to_string(),
        full_name: full_name.to_string(),
        behavior_grade: MAX_GRADE,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            "SELECT id, class_id, full_name, behavior_grade FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(Student {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    full_name: r.get(2)?,
                    behavior_grade: r.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn list_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, full_name, behavior_grade
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(Student {
                id: r.get(0)?,
                class_id: r.get(1)?,
                full_name: r.get(2)?,
                behavior_grade: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_grade(
    conn: &Connection,
    student_id: &str,
    subject: &str,
    semester: u8,
    grade: u8,
    taken_at: NaiveDate,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO catalog_grades(id, student_id, subject, semester, grade, taken_at, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            student_id,
            subject,
            semester,
            grade,
            taken_at,
            now_timestamp(),
        ),
    )?;
    Ok(id)
}

pub fn insert_absence(
    conn: &Connection,
    student_id: &str,
    subject: &str,
    semester: u8,
    taken_at: NaiveDate,
    is_founded: bool,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO catalog_absences(id, student_id, subject, semester, taken_at, is_founded, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            student_id,
            subject,
            semester,
            taken_at,
            is_founded,
            now_timestamp(),
        ),
    )?;
    Ok(id)
}

pub fn set_behavior_grade(conn: &Connection, student_id: &str, grade: u8) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE students SET behavior_grade = ? WHERE id = ?",
        (grade, student_id),
    )?;
    Ok(())
}

/// Per-subject grades and absence counts for one student, optionally limited
/// to one semester.
pub fn load_student_record(
    conn: &Connection,
    student: &Student,
    class: &StudyClass,
    semester: Option<u8>,
) -> anyhow::Result<StudentRecord> {
    let mut subjects: BTreeMap<String, SubjectRecord> = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT subject, grade
         FROM catalog_grades
         WHERE student_id = ?1 AND (?2 IS NULL OR semester = ?2)
         ORDER BY taken_at, rowid",
    )?;
    let grades = stmt
        .query_map((&student.id, semester), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, u8>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (subject, grade) in grades {
        subjects
            .entry(subject.clone())
            .or_insert_with(|| SubjectRecord {
                subject,
                ..SubjectRecord::default()
            })
            .grades
            .push(grade);
    }

    let mut stmt = conn.prepare(
        "SELECT subject, SUM(CASE WHEN is_founded != 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN is_founded = 0 THEN 1 ELSE 0 END)
         FROM catalog_absences
         WHERE student_id = ?1 AND (?2 IS NULL OR semester = ?2)
         GROUP BY subject",
    )?;
    let absences = stmt
        .query_map((&student.id, semester), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, u32>(1)?,
                r.get::<_, u32>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (subject, founded, unfounded) in absences {
        let entry = subjects
            .entry(subject.clone())
            .or_insert_with(|| SubjectRecord {
                subject,
                ..SubjectRecord::default()
            });
        entry.founded_absences = founded;
        entry.unfounded_absences = unfounded;
    }

    Ok(StudentRecord {
        student_id: student.id.clone(),
        full_name: student.full_name.clone(),
        class_grade: class.class_grade,
        behavior_grade: student.behavior_grade,
        subjects: subjects.into_values().collect(),
    })
}
