//! `event` perk: declarative listener bindings.
//!
//! ```json
//! {
//!   "event": {
//!     "self":     { "afterReady": "announce" },
//!     ".save":    { "click": { "handler": "save", "order": 10, "stopPropagation": true } },
//!     ".reload":  { "click": ["clear", { "handler": "reload", "once": true }] }
//!   }
//! }
//! ```
//!
//! `self` is the unit's own element; any other key is a selector within it.
//! Handler names resolve against the unit's skills, then its spells; an
//! unknown name fails the attachment.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::Runtime;
use crate::dispatch::{Element, ListenOptions};
use crate::error::UnitError;
use crate::perks::Perk;
use crate::units::UnitRef;

/// Element key addressing the unit itself.
pub const SELF_ELEMENT: &str = "self";

/// Built-in `event` perk.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventPerk;

#[derive(Debug)]
struct Binding {
    handler: String,
    options: ListenOptions,
}

fn binding(path: &str, value: &Value) -> Result<Vec<Binding>, UnitError> {
    let invalid = |reason: String| UnitError::InvalidSetting {
        path: path.to_string(),
        reason,
    };
    match value {
        Value::String(name) => Ok(vec![Binding {
            handler: name.clone(),
            options: ListenOptions::default(),
        }]),
        Value::Object(m) => {
            let handler = m
                .get("handler")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing \"handler\"".into()))?;
            let mut options = ListenOptions::default();
            if let Some(order) = m.get("order") {
                let order = order
                    .as_i64()
                    .and_then(|o| i32::try_from(o).ok())
                    .ok_or_else(|| invalid(format!("order must be an integer, got {order}")))?;
                options.order = order;
            }
            options.stop_propagation = flag(m, "stopPropagation");
            options.once = flag(m, "once");
            Ok(vec![Binding {
                handler: handler.to_string(),
                options,
            }])
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if item.is_array() {
                    return Err(invalid("nested lists are not allowed".into()));
                }
                out.extend(binding(path, item)?);
            }
            Ok(out)
        }
        other => Err(invalid(format!("expected handler name, object or list, got {other}"))),
    }
}

fn flag(m: &Map<String, Value>, key: &str) -> bool {
    m.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[async_trait]
impl Perk for EventPerk {
    fn name(&self) -> &str {
        "event"
    }

    /// Late, so handlers registered by default-ordered perks already exist.
    fn order(&self) -> Option<i32> {
        Some(900)
    }

    async fn init_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        let section = match unit.settings().get("event") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(m)) => m,
            Some(other) => {
                return Err(UnitError::InvalidSetting {
                    path: "event".into(),
                    reason: format!("expected element map, got {other}"),
                })
            }
        };

        let own = unit.element();
        for (selector, events) in &section {
            let element = if selector == SELF_ELEMENT {
                own.clone()
            } else {
                Element::within(&own, selector)
            };
            let Value::Object(events) = events else {
                return Err(UnitError::InvalidSetting {
                    path: format!("event.{selector}"),
                    reason: format!("expected event map, got {events}"),
                });
            };
            for (event, value) in events {
                let path = format!("event.{selector}.{event}");
                for b in binding(&path, value)? {
                    let handler = unit
                        .handler(&b.handler)
                        .ok_or_else(|| UnitError::not_found("handler", b.handler.clone()))?;
                    rt.add_listener(&element, event, handler, b.options.bind(unit.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binding_forms() {
        let b = binding("p", &json!("save")).unwrap();
        assert_eq!(b[0].handler, "save");
        assert_eq!(b[0].options.order, ListenOptions::DEFAULT_ORDER);

        let b = binding("p", &json!({"handler": "h", "order": 5, "stopPropagation": true, "once": true}))
            .unwrap();
        assert_eq!(b[0].options.order, 5);
        assert!(b[0].options.stop_propagation && b[0].options.once);

        let b = binding("p", &json!(["a", {"handler": "b"}])).unwrap();
        assert_eq!(b.iter().map(|b| b.handler.as_str()).collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn malformed_bindings_are_rejected() {
        for bad in [json!(1), json!({"order": 1}), json!([["a"]]), json!({"handler": "h", "order": "x"})] {
            let err = binding("event.self.click", &bad).unwrap_err();
            assert_eq!(err.as_label(), "unit_invalid_setting", "{bad}");
        }
    }
}
