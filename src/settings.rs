use crate::calendar::DEFAULT_SCHOOL_YEAR_START_MONTH;
use crate::db;
use crate::risk::RiskThresholds;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSection {
    Calendar,
    Risk,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 2] = [SettingsSection::Calendar, SettingsSection::Risk];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calendar" => Some(Self::Calendar),
            "risk" => Some(Self::Risk),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Risk => "risk",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Calendar => "setup.calendar",
            Self::Risk => "setup.risk",
        }
    }
}

fn default_section(section: SettingsSection) -> Value {
    match section {
        SettingsSection::Calendar => json!({
            "schoolYearStartMonth": DEFAULT_SCHOOL_YEAR_START_MONTH
        }),
        SettingsSection::Risk => {
            let t = RiskThresholds::default();
            json!({
                "averageLimit": t.average_limit,
                "unfoundedAbsencesLimit": t.unfounded_absences_limit,
                "behaviorGradeLimitGymnasium": t.behavior_grade_limit_gymnasium,
                "behaviorGradeLimitHighSchool": t.behavior_grade_limit_high_school
            })
        }
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

/// Applies a validated patch onto `current`. Unknown keys are rejected.
pub fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal settings object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SettingsSection::Calendar => match k.as_str() {
                "schoolYearStartMonth" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 12)?));
                }
                _ => return Err(format!("unknown calendar field: {}", k)),
            },
            SettingsSection::Risk => match k.as_str() {
                "averageLimit" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 1.0, 10.0)?));
                }
                "unfoundedAbsencesLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "behaviorGradeLimitGymnasium" | "behaviorGradeLimitHighSchool" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10)?));
                }
                _ => return Err(format!("unknown risk field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SettingsSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                if let Err(e) = merge_section_patch(section, &mut current, &single) {
                    tracing::warn!(section = section.name(), error = %e, "ignoring stored setting");
                }
            }
        }
    }
    Ok(current)
}

pub fn save_section(conn: &Connection, section: SettingsSection, value: &Value) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

pub fn school_year_start_month(conn: &Connection) -> anyhow::Result<u32> {
    let v = load_section(conn, SettingsSection::Calendar)?;
    Ok(v.get("schoolYearStartMonth")
        .and_then(|m| m.as_u64())
        .and_then(|m| u32::try_from(m).ok())
        .unwrap_or(DEFAULT_SCHOOL_YEAR_START_MONTH))
}

pub fn risk_thresholds(conn: &Connection) -> anyhow::Result<RiskThresholds> {
    let v = load_section(conn, SettingsSection::Risk)?;
    Ok(serde_json::from_value(v)?)
}
