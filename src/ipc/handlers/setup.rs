use crate::ipc::helpers::{db_query_failed, db_write_failed, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, SettingsSection};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn setup_get(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let mut out = Map::new();
    for section in SettingsSection::ALL {
        let v = settings::load_section(conn, section).map_err(db_query_failed)?;
        out.insert(section.name().to_string(), v);
    }
    Ok(Value::Object(out))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(section_raw) = params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing section"));
    };
    let Some(section) = SettingsSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = settings::load_section(conn, section).map_err(db_query_failed)?;
    settings::merge_section_patch(section, &mut current, patch_obj)
        .map_err(HandlerErr::bad_params)?;
    settings::save_section(conn, section, &current).map_err(db_write_failed)?;
    tracing::info!(section = section.name(), "settings updated");
    let mut out = Map::new();
    out.insert("ok".to_string(), json!(true));
    out.insert(section.name().to_string(), current);
    Ok(Value::Object(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_conn(state, req, setup_get)),
        "setup.update" => Some(with_conn(state, req, setup_update)),
        _ => None,
    }
}
