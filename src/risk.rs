use serde::{Deserialize, Serialize};

/// Thresholds past which a student counts as at risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskThresholds {
    pub average_limit: f64,
    pub unfounded_absences_limit: u32,
    pub behavior_grade_limit_gymnasium: u8,
    pub behavior_grade_limit_high_school: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            average_limit: 5.0,
            unfounded_absences_limit: 10,
            behavior_grade_limit_gymnasium: 8,
            behavior_grade_limit_high_school: 6,
        }
    }
}

impl RiskThresholds {
    pub fn behavior_limit_for(&self, class_grade: u8) -> u8 {
        if class_grade >= 9 {
            self.behavior_grade_limit_high_school
        } else {
            self.behavior_grade_limit_gymnasium
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubjectRecord {
    pub subject: String,
    pub grades: Vec<u8>,
    pub founded_absences: u32,
    pub unfounded_absences: u32,
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub student_id: String,
    pub full_name: String,
    pub class_grade: u8,
    pub behavior_grade: u8,
    pub subjects: Vec<SubjectRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskReason {
    LowAverage { subject: String, average: f64 },
    UnfoundedAbsences { count: u32 },
    LowBehaviorGrade { grade: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub average: Option<f64>,
    pub grades_count: usize,
    pub founded_absences: u32,
    pub unfounded_absences: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRisk {
    pub student_id: String,
    pub full_name: String,
    pub at_risk: bool,
    pub reasons: Vec<RiskReason>,
    pub average: Option<f64>,
    pub behavior_grade: u8,
    pub founded_absences: u32,
    pub unfounded_absences: u32,
    pub subjects: Vec<SubjectAverage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRisk {
    pub students_count: usize,
    pub students_at_risk_count: usize,
    pub average: Option<f64>,
    pub behavior_grade_average: Option<f64>,
    pub founded_absences: u32,
    pub unfounded_absences: u32,
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut n = 0usize;
    let mut sum = 0.0;
    for v in values {
        n += 1;
        sum += v;
    }
    if n == 0 {
        None
    } else {
        Some(round2(sum / n as f64))
    }
}

pub fn subject_average(grades: &[u8]) -> Option<f64> {
    mean(grades.iter().map(|g| f64::from(*g)))
}

pub fn assess_student(record: &StudentRecord, thresholds: &RiskThresholds) -> StudentRisk {
    let mut reasons = Vec::new();
    let mut subjects = Vec::with_capacity(record.subjects.len());
    let mut founded = 0u32;
    let mut unfounded = 0u32;

    for s in &record.subjects {
        let average = subject_average(&s.grades);
        if let Some(avg) = average {
            if avg < thresholds.average_limit {
                reasons.push(RiskReason::LowAverage {
                    subject: s.subject.clone(),
                    average: avg,
                });
            }
        }
        founded += s.founded_absences;
        unfounded += s.unfounded_absences;
        subjects.push(SubjectAverage {
            subject: s.subject.clone(),
            average,
            grades_count: s.grades.len(),
            founded_absences: s.founded_absences,
            unfounded_absences: s.unfounded_absences,
        });
    }

    if unfounded >= thresholds.unfounded_absences_limit {
        reasons.push(RiskReason::UnfoundedAbsences { count: unfounded });
    }
    if record.behavior_grade < thresholds.behavior_limit_for(record.class_grade) {
        reasons.push(RiskReason::LowBehaviorGrade {
            grade: record.behavior_grade,
        });
    }

    let average = mean(subjects.iter().filter_map(|s| s.average));

    StudentRisk {
        student_id: record.student_id.clone(),
        full_name: record.full_name.clone(),
        at_risk: !reasons.is_empty(),
        reasons,
        average,
        behavior_grade: record.behavior_grade,
        founded_absences: founded,
        unfounded_absences: unfounded,
        subjects,
    }
}

pub fn summarize<'a, I>(students: I) -> GroupRisk
where
    I: IntoIterator<Item = &'a StudentRisk>,
{
    let mut out = GroupRisk::default();
    let mut averages = Vec::new();
    let mut behavior = Vec::new();
    for s in students {
        out.students_count += 1;
        if s.at_risk {
            out.students_at_risk_count += 1;
        }
        if let Some(a) = s.average {
            averages.push(a);
        }
        behavior.push(f64::from(s.behavior_grade));
        out.founded_absences += s.founded_absences;
        out.unfounded_absences += s.unfounded_absences;
    }
    out.average = mean(averages);
    out.behavior_grade_average = mean(behavior);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str, grades: &[u8], unfounded: u32) -> SubjectRecord {
        SubjectRecord {
            subject: name.to_string(),
            grades: grades.to_vec(),
            founded_absences: 0,
            unfounded_absences: unfounded,
        }
    }

    fn student(class_grade: u8, behavior: u8, subjects: Vec<SubjectRecord>) -> StudentRecord {
        StudentRecord {
            student_id: "s".into(),
            full_name: "Popescu Ana".into(),
            class_grade,
            behavior_grade: behavior,
            subjects,
        }
    }

    #[test]
    fn averages_round_to_two_decimals() {
        assert_eq!(subject_average(&[7, 8, 8]), Some(7.67));
        assert_eq!(subject_average(&[]), None);
    }

    #[test]
    fn low_average_marks_student_at_risk() {
        let r = assess_student(
            &student(6, 10, vec![subject("Math", &[4, 5], 0), subject("History", &[9], 0)]),
            &RiskThresholds::default(),
        );
        assert!(r.at_risk);
        assert_eq!(
            r.reasons,
            vec![RiskReason::LowAverage {
                subject: "Math".into(),
                average: 4.5
            }]
        );
        assert_eq!(r.average, Some(6.75));
    }

    #[test]
    fn behavior_limit_depends_on_level() {
        let t = RiskThresholds::default();
        let gymnasium = assess_student(&student(7, 7, vec![]), &t);
        assert!(gymnasium.at_risk);
        let high_school = assess_student(&student(10, 7, vec![]), &t);
        assert!(!high_school.at_risk);
    }

    #[test]
    fn unfounded_absences_accumulate_across_subjects() {
        let t = RiskThresholds::default();
        let r = assess_student(
            &student(10, 10, vec![subject("Math", &[9], 6), subject("Art", &[], 4)]),
            &t,
        );
        assert_eq!(r.unfounded_absences, 10);
        assert_eq!(r.reasons, vec![RiskReason::UnfoundedAbsences { count: 10 }]);
    }

    #[test]
    fn summary_counts_students_at_risk() {
        let t = RiskThresholds::default();
        let a = assess_student(&student(10, 10, vec![subject("Math", &[10], 0)]), &t);
        let b = assess_student(&student(10, 5, vec![subject("Math", &[6], 2)]), &t);
        let g = summarize([&a, &b]);
        assert_eq!(g.students_count, 2);
        assert_eq!(g.students_at_risk_count, 1);
        assert_eq!(g.average, Some(8.0));
        assert_eq!(g.behavior_grade_average, Some(7.5));
        assert_eq!(g.unfounded_absences, 2);
    }
}
