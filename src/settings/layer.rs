//! # Settings resolution.
//!
//! [`SettingsLayer`] builds a unit's local settings layer before any perk sees
//! it. Precedence, later wins:
//!
//! ```text
//! 1. class defaults         (base class → derived class)
//! 2. attribute settings     ("a.b" = "1"  →  {"a": {"b": 1}})
//! 3. external settings      (only when referenced, loaded through Loader)
//! 4. attribute settings     (again: attributes beat external settings)
//! ```
//!
//! The result replaces the unit's local layer; reads still fall back to the
//! global store the unit's [`ChainableStore`](crate::ChainableStore) is parented to.
//!
//! ## External reference
//! - enabled by a truthy `setting.external` (attribute, class default or global),
//!   or by a `settings` attribute;
//! - directory from `setting.path` (default [`RuntimeConfig::settings_path`](crate::RuntimeConfig));
//! - file name from `setting.file`, else the `settings` attribute value when it is
//!   not a boolean, else `<tag>.json`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::UnitError;
use crate::settings::loader::Loader;
use crate::store::HierarchicalStore;
use crate::units::Unit;

/// Attribute that references external settings.
pub const SETTINGS_ATTRIBUTE: &str = "settings";

/// Parses one attribute value: JSON when it parses, plain string otherwise.
///
/// ```rust
/// use unitvisor::settings::parse_attribute;
/// use serde_json::json;
///
/// assert_eq!(parse_attribute("false"), json!(false));
/// assert_eq!(parse_attribute("[1, 2]"), json!([1, 2]));
/// assert_eq!(parse_attribute("fast"), json!("fast"));
/// ```
pub fn parse_attribute(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Builds the attribute-derived settings document.
///
/// Attribute names are dot paths; the reserved `settings` attribute is skipped.
pub fn attribute_settings(attributes: &BTreeMap<String, String>) -> Result<Value, UnitError> {
    let mut doc = HierarchicalStore::new();
    for (name, raw) in attributes {
        if name == SETTINGS_ATTRIBUTE {
            continue;
        }
        doc.set(name, parse_attribute(raw))?;
    }
    Ok(doc.to_value())
}

/// Resolves layered unit settings.
pub struct SettingsLayer {
    loader: Arc<dyn Loader>,
    default_path: String,
}

impl SettingsLayer {
    /// Layer loading external settings through `loader`, below `default_path`.
    pub fn new(loader: Arc<dyn Loader>, default_path: impl Into<String>) -> Self {
        Self {
            loader,
            default_path: default_path.into(),
        }
    }

    /// The loader used for external settings.
    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    /// Computes the unit's local settings layer and installs it.
    pub async fn resolve(&self, unit: &Unit) -> Result<(), UnitError> {
        let local = self.compute(unit).await?;
        unit.settings().replace_local(local);
        Ok(())
    }

    /// Recomputes `path` from class defaults, external settings and the
    /// current attributes, replacing or removing the local value.
    ///
    /// Other local paths, including values written at runtime, are kept.
    pub async fn restore(&self, unit: &Unit, path: &str) -> Result<(), UnitError> {
        let fresh = self.compute(unit).await?;
        match fresh.get(path) {
            Some(v) => unit.settings().set(path, v.clone()),
            None => {
                unit.settings().remove(path);
                Ok(())
            }
        }
    }

    async fn compute(&self, unit: &Unit) -> Result<HierarchicalStore, UnitError> {
        let attributes = unit.attributes();
        let from_attributes = attribute_settings(&attributes)?;

        let mut local = HierarchicalStore::from_value(unit.class().default_settings());
        local.merge("", &from_attributes)?;

        if let Some(resource) = self.external_resource(unit, &local, &attributes) {
            tracing::debug!(unit = unit.id(), %resource, "loading external settings");
            let external = self.loader.load_json(&resource).await?;
            if !external.is_object() {
                return Err(UnitError::Load {
                    resource,
                    reason: "settings document is not an object".into(),
                });
            }
            local.merge("", &external)?;
            local.merge("", &from_attributes)?;
        }
        Ok(local)
    }

    /// Re-applies the current attribute settings on top of the local layer.
    pub fn apply_attributes(&self, unit: &Unit) -> Result<(), UnitError> {
        let from_attributes = attribute_settings(&unit.attributes())?;
        unit.settings().merge("", &from_attributes)
    }

    /// Location of the external settings document, or `None` if not referenced.
    fn external_resource(
        &self,
        unit: &Unit,
        local: &HierarchicalStore,
        attributes: &BTreeMap<String, String>,
    ) -> Option<String> {
        let lookup = |path: &str| -> Option<Value> {
            local.get(path).cloned().or_else(|| {
                unit.settings()
                    .parent()
                    .and_then(|global| global.get(path))
            })
        };

        let attr = attributes.get(SETTINGS_ATTRIBUTE).map(|raw| parse_attribute(raw));
        let enabled = match (&attr, lookup("setting.external")) {
            (Some(Value::Bool(false)), _) => false,
            (Some(_), _) => true,
            (None, Some(v)) => truthy(&v),
            (None, None) => false,
        };
        if !enabled {
            return None;
        }

        let dir = lookup("setting.path")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.default_path.clone());
        let file = lookup("setting.file")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| match &attr {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| format!("{}.json", unit.tag()));

        Some(join(&dir, &file))
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn join(dir: &str, file: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{file}")
    } else {
        format!("{dir}/{file}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::loader::StaticLoader;
    use crate::store::ChainableStore;
    use crate::units::{UnitClass, UnitRef, UnitSpec};
    use serde_json::json;

    fn unit(spec: UnitSpec, global: Value) -> UnitRef {
        let base = Arc::new(UnitClass::new("base").with_defaults(json!({
            "basic": {"refresh": true, "fetch": true},
            "view": {"title": "base", "size": 1}
        })));
        let class = UnitClass::new("card")
            .extends(base)
            .with_defaults(json!({"view": {"title": "card"}}));
        Unit::new(
            spec,
            Arc::new(class),
            Arc::new(ChainableStore::from_value(global)),
        )
    }

    fn layer(loader: StaticLoader) -> SettingsLayer {
        SettingsLayer::new(Arc::new(loader), "settings/")
    }

    #[test]
    fn attribute_names_are_dot_paths() {
        let mut attrs = BTreeMap::new();
        attrs.insert("basic.fetch".to_string(), "false".to_string());
        attrs.insert("view.title".to_string(), "Hello".to_string());
        attrs.insert("settings".to_string(), "true".to_string());
        assert_eq!(
            attribute_settings(&attrs).unwrap(),
            json!({"basic": {"fetch": false}, "view": {"title": "Hello"}})
        );

        let mut clash = BTreeMap::new();
        clash.insert("a".to_string(), "1".to_string());
        clash.insert("a.b".to_string(), "2".to_string());
        assert_eq!(attribute_settings(&clash).unwrap_err().as_label(), "unit_path_type");
    }

    #[tokio::test]
    async fn class_defaults_then_attributes() {
        let u = unit(
            UnitSpec::new("x-card").with_attribute("view.size", "3"),
            json!({}),
        );
        layer(StaticLoader::new()).resolve(&u).await.unwrap();
        assert_eq!(
            u.settings().get("view"),
            Some(json!({"title": "card", "size": 3}))
        );
        assert_eq!(u.settings().get("basic.fetch"), Some(json!(true)));
    }

    #[tokio::test]
    async fn attributes_beat_external_settings() {
        let loader = StaticLoader::new().with(
            "settings/x-card.json",
            json!({"view": {"title": "external", "size": 9}, "status": {"timeout": 50}}),
        );
        let u = unit(
            UnitSpec::new("x-card")
                .with_attribute("settings", "true")
                .with_attribute("view.size", "3"),
            json!({}),
        );
        layer(loader).resolve(&u).await.unwrap();

        assert_eq!(u.settings().get("view.title"), Some(json!("external")));
        assert_eq!(u.settings().get("view.size"), Some(json!(3)));
        assert_eq!(u.settings().get("status.timeout"), Some(json!(50)));
    }

    #[tokio::test]
    async fn external_location_overrides() {
        let loader = StaticLoader::new()
            .with("conf/custom.json", json!({"a": 1}))
            .with("global/x-card.json", json!({"a": 2}))
            .with("settings/named.json", json!({"a": 3}));

        let u = unit(
            UnitSpec::new("x-card")
                .with_attribute("setting.external", "true")
                .with_attribute("setting.path", "conf")
                .with_attribute("setting.file", "custom.json"),
            json!({}),
        );
        let l = layer(loader);
        l.resolve(&u).await.unwrap();
        assert_eq!(u.settings().get("a"), Some(json!(1)));

        let u = unit(
            UnitSpec::new("x-card"),
            json!({"setting": {"external": true, "path": "global/"}}),
        );
        l.resolve(&u).await.unwrap();
        assert_eq!(u.settings().get("a"), Some(json!(2)));

        let u = unit(UnitSpec::new("x-card").with_attribute("settings", "named.json"), json!({}));
        l.resolve(&u).await.unwrap();
        assert_eq!(u.settings().get("a"), Some(json!(3)));
    }

    #[tokio::test]
    async fn missing_external_settings_fail_the_load() {
        let u = unit(UnitSpec::new("x-card").with_attribute("settings", "true"), json!({}));
        let err = layer(StaticLoader::new()).resolve(&u).await.unwrap_err();
        assert_eq!(
            err,
            UnitError::Load {
                resource: "settings/x-card.json".into(),
                reason: "no such resource".into()
            }
        );
    }

    #[tokio::test]
    async fn no_reference_means_no_load() {
        let u = unit(
            UnitSpec::new("x-card").with_attribute("settings", "false"),
            json!({"setting": {"external": false}}),
        );
        layer(StaticLoader::new()).resolve(&u).await.unwrap();
        assert_eq!(u.settings().get("view.title"), Some(json!("card")));
    }
}
