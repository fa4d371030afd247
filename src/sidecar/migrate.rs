//! Read-side sidecar schema migration.
//!
//! Sidecars written by older tool versions are upgraded in memory before
//! deserialization into the typed record; writes always emit the current
//! schema. A payload claiming a schema version newer than this build is
//! rejected and its asset skipped without being rewritten.

use std::path::Path;

use serde_json::{Map, Value};

use crate::core::errors::{QcError, Result};

/// Default schema identity for sidecars this build writes.
pub const SCHEMA_NAME: &str = "qc.sidecar";
pub const SCHEMA_VERSION: &str = "1.1.0";

/// Version assumed for sidecars that predate the `schema_version` field.
const LEGACY_VERSION: &str = "1.0.0";

type Migration = fn(&mut Map<String, Value>);

/// Ordered migration registry: `(from, to, step)`.
const MIGRATIONS: &[(&str, &str, Migration)] = &[(LEGACY_VERSION, "1.1.0", migrate_1_0_0)];

/// Upgrade a raw sidecar payload to the current schema version.
///
/// Missing or null `schema_name`/`schema_version` are coerced to the legacy
/// defaults first, then migrations are applied in order until the payload is
/// current.
pub fn migrate_to_current(map: &mut Map<String, Value>, origin: &Path) -> Result<()> {
    coerce_schema_identity(map);

    loop {
        let version = map
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or(LEGACY_VERSION)
            .to_string();

        if version == SCHEMA_VERSION {
            return Ok(());
        }

        match MIGRATIONS.iter().find(|(from, _, _)| *from == version) {
            Some((_, to, step)) => {
                step(map);
                map.insert(
                    "schema_version".to_string(),
                    Value::String((*to).to_string()),
                );
            }
            None => {
                return Err(QcError::SchemaTooNew {
                    path: origin.to_path_buf(),
                    found: version,
                    supported: SCHEMA_VERSION.to_string(),
                });
            }
        }
    }
}

fn coerce_schema_identity(map: &mut Map<String, Value>) {
    let name_missing = !matches!(map.get("schema_name"), Some(Value::String(_)));
    if name_missing {
        map.insert(
            "schema_name".to_string(),
            Value::String(SCHEMA_NAME.to_string()),
        );
    }
    let version_missing = !matches!(map.get("schema_version"), Some(Value::String(_)));
    if version_missing {
        map.insert(
            "schema_version".to_string(),
            Value::String(LEGACY_VERSION.to_string()),
        );
    }
}

/// 1.0.0 -> 1.1.0: the `sequence` field became mandatory (null for singles),
/// `content_state` was introduced, and the singular `note` field was renamed.
fn migrate_1_0_0(map: &mut Map<String, Value>) {
    if !map.contains_key("sequence") {
        map.insert("sequence".to_string(), Value::Null);
    }
    if !map.contains_key("content_state") {
        map.insert(
            "content_state".to_string(),
            Value::String("unchanged".to_string()),
        );
    }
    if let Some(note) = map.remove("note") {
        map.entry("notes".to_string()).or_insert(note);
    }
    if !map.contains_key("notes") {
        map.insert("notes".to_string(), Value::String(String::new()));
    }
}
