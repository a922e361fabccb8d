//! `unit` perk: composed child units.
//!
//! ```json
//! {
//!   "unit": {
//!     "header": { "tag": "x-header", "name": "top", "attributes": { "view.title": "Hi" } },
//!     "list":   { "tag": "x-list", "settings": { "basic": { "fetch": false } } }
//!   }
//! }
//! ```
//!
//! Each entry creates a child (id `<parent id>.<key>`, parent set to the
//! composing unit) and connects it before the parent starts. `settings` are
//! flattened into dot-path attributes, so they rank with attribute settings.
//! On detach the children are disconnected in reverse creation order.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::Runtime;
use crate::error::UnitError;
use crate::perks::Perk;
use crate::units::{UnitRef, UnitSpec};

/// Inventory key listing the ids of the children created by this perk.
pub const CHILDREN_KEY: &str = "unit.children";

/// Built-in `unit` perk.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitPerk;

fn child_spec(parent: &UnitRef, key: &str, decl: &Value) -> Result<UnitSpec, UnitError> {
    let path = format!("unit.{key}");
    let invalid = |reason: &str| UnitError::InvalidSetting {
        path: path.clone(),
        reason: reason.to_string(),
    };
    let Value::Object(decl) = decl else {
        return Err(invalid("expected child declaration object"));
    };
    let tag = decl
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing \"tag\""))?;

    let id = decl
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| format!("{}.{key}", parent.id()), str::to_string);
    let mut spec = UnitSpec::new(tag).with_id(id).with_parent(parent.id());
    if let Some(name) = decl.get("name").and_then(Value::as_str) {
        spec = spec.with_name(name);
    }

    match decl.get("attributes") {
        None => {}
        Some(Value::Object(attrs)) => {
            for (k, v) in attrs {
                let raw = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                spec.attributes.insert(k.clone(), raw);
            }
        }
        Some(_) => return Err(invalid("\"attributes\" must be an object")),
    }

    match decl.get("settings") {
        None => {}
        Some(Value::Object(settings)) => flatten("", settings, &mut spec.attributes),
        Some(_) => return Err(invalid("\"settings\" must be an object")),
    }
    Ok(spec)
}

/// Flattens nested objects to `a.b.c` attribute names with JSON-encoded leaves.
fn flatten(prefix: &str, map: &Map<String, Value>, out: &mut BTreeMap<String, String>) {
    for (k, v) in map {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            Value::Object(inner) if !inner.is_empty() => flatten(&path, inner, out),
            leaf => {
                out.entry(path).or_insert_with(|| leaf.to_string());
            }
        }
    }
}

#[async_trait]
impl Perk for UnitPerk {
    fn name(&self) -> &str {
        "unit"
    }

    fn order(&self) -> Option<i32> {
        Some(1000)
    }

    async fn init_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        let decls = match unit.settings().get("unit") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(m)) => m,
            Some(other) => {
                return Err(UnitError::InvalidSetting {
                    path: "unit".into(),
                    reason: format!("expected child map, got {other}"),
                })
            }
        };

        let mut children = Vec::with_capacity(decls.len());
        for (key, decl) in &decls {
            let child = rt.create(child_spec(unit, key, decl)?)?;
            children.push(Value::String(child.id().to_string()));
            unit.stash(CHILDREN_KEY, Value::Array(children.clone()));
            rt.connected(&child).await?;
        }
        Ok(())
    }

    async fn deinit_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        let Some(Value::Array(ids)) = unit.unstash(CHILDREN_KEY) else {
            return Ok(());
        };
        let mut first_err = None;
        for id in ids.iter().rev().filter_map(Value::as_str) {
            if let Some(child) = rt.unit(id) {
                if let Err(e) = rt.disconnected(&child).await {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
