//! # Perk registry and attachment protocol.
//!
//! [`PerkRegistry`] stores every registered perk by name and by section, plans
//! dependency-ordered attachment and drives per-unit init/deinit.
//!
//! ## Architecture
//! ```text
//! register(perk)
//!     ├─► normalize: order (default 500), depends, section
//!     ├─► name taken     → Err(DuplicatePerk)
//!     ├─► section taken  → Err(SectionConflict)
//!     ├─► perk.global_init(&mut hooks) → hooks stamped with the perk name
//!     └─► publish PerkRegistered
//!
//! attach_all(unit)
//!     ├─► candidates = defaults ∪ settings["perks"] ∪ {perk | section ∈ top-level settings keys}
//!     ├─► plan(candidates, skip attached):
//!     │       roots sorted by order (stable) → depth-first, deps first
//!     │       back edge → Err(DependencyCycle [a -> b -> a])
//!     └─► for each planned perk: mark unit → init_for_unit().await → PerkAttached
//!
//! detach_all(unit)
//!     └─► take unit perks → deinit_for_unit() in reverse order → PerkDetached
//! ```
//!
//! ## Rules
//! - Attachment is idempotent per unit: an attached perk is never re-initialized.
//! - Dependencies are always initialized before their dependents.
//! - The unit is marked before `init_for_unit` runs, so a re-entrant attach of
//!   the same perk is a no-op.
//! - No lock is held while a perk initializer runs.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::core::Runtime;
use crate::error::UnitError;
use crate::events::{Bus, Event, EventKind};
use crate::perks::hooks::{Hook, HookEntry, HookPoint, Hooks};
use crate::perks::perk::PerkRef;
use crate::units::{Unit, UnitRef};

/// Settings key listing perks to attach explicitly.
pub const PERKS_KEY: &str = "perks";

/// Normalized registration record of one perk.
pub struct PerkDescriptor {
    perk: PerkRef,
    name: Arc<str>,
    section: Arc<str>,
    order: i32,
    depends: Vec<String>,
}

impl PerkDescriptor {
    /// Perk name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claimed settings section.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Normalized attachment order.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Declared dependencies.
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// The perk itself.
    pub fn perk(&self) -> &PerkRef {
        &self.perk
    }
}

impl fmt::Debug for PerkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerkDescriptor")
            .field("name", &self.name)
            .field("section", &self.section)
            .field("order", &self.order)
            .field("depends", &self.depends)
            .finish()
    }
}

#[derive(Default)]
struct Tables {
    by_name: HashMap<Arc<str>, Arc<PerkDescriptor>>,
    by_section: HashMap<Arc<str>, Arc<PerkDescriptor>>,
}

/// Registry of perks, keyed by name and by section.
pub struct PerkRegistry {
    tables: RwLock<Tables>,
    hooks: RwLock<Vec<HookEntry>>,
    default_order: i32,
    bus: Bus,
}

impl PerkRegistry {
    /// Creates an empty registry; perks without an order get `default_order`.
    pub fn new(default_order: i32, bus: Bus) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            hooks: RwLock::new(Vec::new()),
            default_order,
            bus,
        }
    }

    /// Registers a perk and runs its global initializer.
    ///
    /// A name or section already claimed by another perk is an error; the
    /// registry is left unchanged in that case.
    pub fn register(&self, perk: PerkRef) -> Result<Arc<PerkDescriptor>, UnitError> {
        let desc = Arc::new(PerkDescriptor {
            name: Arc::from(perk.name()),
            section: Arc::from(perk.section()),
            order: perk.order().unwrap_or(self.default_order),
            depends: perk.depends(),
            perk,
        });

        {
            let tables = self.read();
            if tables.by_name.contains_key(&desc.name) {
                return Err(UnitError::DuplicatePerk {
                    name: desc.name.to_string(),
                });
            }
            if let Some(existing) = tables.by_section.get(&desc.section) {
                return Err(UnitError::SectionConflict {
                    section: desc.section.to_string(),
                    existing: existing.name.to_string(),
                    perk: desc.name.to_string(),
                });
            }
        }

        let mut hooks = Hooks::default();
        desc.perk.global_init(&mut hooks)?;

        {
            let mut tables = self.write();
            if tables.by_name.contains_key(&desc.name) || tables.by_section.contains_key(&desc.section) {
                return Err(UnitError::DuplicatePerk {
                    name: desc.name.to_string(),
                });
            }
            tables.by_name.insert(desc.name.clone(), desc.clone());
            tables.by_section.insert(desc.section.clone(), desc.clone());
        }

        let stamped = hooks.entries.into_iter().map(|mut e| {
            e.owner = desc.name.clone();
            e
        });
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(stamped);

        tracing::debug!(perk = %desc.name, section = %desc.section, order = desc.order, "perk registered");
        self.bus.publish(
            Event::new(EventKind::PerkRegistered)
                .with_perk(desc.name.clone())
                .with_reason(format!("section={} order={}", desc.section, desc.order)),
        );
        Ok(desc)
    }

    /// Looks a perk up by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<PerkDescriptor>, UnitError> {
        self.read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| UnitError::not_found("perk", name))
    }

    /// Looks a perk up by the section it claims.
    pub fn resolve_by_section(&self, section: &str) -> Result<Arc<PerkDescriptor>, UnitError> {
        self.read()
            .by_section
            .get(section)
            .cloned()
            .ok_or_else(|| UnitError::not_found("perk section", section))
    }

    /// Names of all registered perks, sorted by order then name.
    pub fn names(&self) -> Vec<String> {
        let tables = self.read();
        let mut all: Vec<_> = tables.by_name.values().collect();
        all.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        all.into_iter().map(|d| d.name.to_string()).collect()
    }

    /// Dependency-ordered attachment plan for `names`; nothing is attached.
    pub fn plan(&self, names: &[String]) -> Result<Vec<Arc<PerkDescriptor>>, UnitError> {
        self.plan_skipping(names, |_| false)
    }

    /// Hooks registered for `point`, in registration order.
    pub fn hooks(&self, point: HookPoint) -> Vec<Hook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.point == point)
            .map(|e| e.hook.clone())
            .collect()
    }

    /// Perk names a unit should carry: `defaults`, the names listed under the
    /// `perks` settings key, then perks whose section is a top-level settings key.
    pub fn candidates(&self, unit: &Unit, defaults: &[String]) -> Result<Vec<String>, UnitError> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |name: String| {
            if !out.contains(&name) {
                out.push(name);
            }
        };

        for name in defaults {
            push(name.clone());
        }

        match unit.settings().get(PERKS_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::String(name)) => push(name),
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(name) => push(name.clone()),
                        other => {
                            return Err(UnitError::InvalidSetting {
                                path: PERKS_KEY.into(),
                                reason: format!("expected perk name, got {other}"),
                            })
                        }
                    }
                }
            }
            Some(other) => {
                return Err(UnitError::InvalidSetting {
                    path: PERKS_KEY.into(),
                    reason: format!("expected list of perk names, got {other}"),
                })
            }
        }

        if let Value::Object(settings) = unit.settings().snapshot() {
            let tables = self.read();
            for key in settings.keys() {
                if let Some(desc) = tables.by_section.get(key.as_str()) {
                    push(desc.name.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Attaches every candidate perk not yet attached to `unit`.
    ///
    /// Returns the names attached by this call, in attachment order.
    pub async fn attach_all(
        &self,
        rt: &Runtime,
        unit: &UnitRef,
        defaults: &[String],
    ) -> Result<Vec<String>, UnitError> {
        let names = self.candidates(unit, defaults)?;
        let plan = self.plan_skipping(&names, |n| unit.has_perk(n))?;
        self.run_plan(rt, unit, plan).await
    }

    /// Attaches one perk (dependencies first). Already attached perks are skipped.
    pub async fn attach(&self, rt: &Runtime, unit: &UnitRef, name: &str) -> Result<Vec<String>, UnitError> {
        let plan = self.plan_skipping(&[name.to_string()], |n| unit.has_perk(n))?;
        self.run_plan(rt, unit, plan).await
    }

    /// Runs `deinit_for_unit` for every attached perk in reverse attachment order
    /// and clears the unit's perk namespace.
    ///
    /// Every perk is deinitialized even if an earlier one fails; the first
    /// failure is returned.
    pub async fn detach_all(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        let mut first_err = None;
        for name in unit.take_perks().into_iter().rev() {
            let desc = match self.resolve(&name) {
                Ok(d) => d,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            if let Err(e) = desc.perk.deinit_for_unit(rt, unit).await {
                tracing::warn!(unit = unit.id(), perk = %name, error = %e, "perk deinit failed");
                first_err.get_or_insert(e);
                continue;
            }
            self.bus.publish(
                Event::new(EventKind::PerkDetached)
                    .with_unit(unit.id())
                    .with_perk(name),
            );
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn run_plan(
        &self,
        rt: &Runtime,
        unit: &UnitRef,
        plan: Vec<Arc<PerkDescriptor>>,
    ) -> Result<Vec<String>, UnitError> {
        let mut attached = Vec::with_capacity(plan.len());
        for desc in plan {
            if !unit.mark_perk(&desc.name) {
                continue;
            }
            tracing::debug!(unit = unit.id(), perk = %desc.name, order = desc.order, "attaching perk");
            desc.perk.init_for_unit(rt, unit).await?;
            self.bus.publish(
                Event::new(EventKind::PerkAttached)
                    .with_unit(unit.id())
                    .with_perk(desc.name.clone()),
            );
            attached.push(desc.name.to_string());
        }
        Ok(attached)
    }

    fn plan_skipping(
        &self,
        names: &[String],
        skip: impl Fn(&str) -> bool,
    ) -> Result<Vec<Arc<PerkDescriptor>>, UnitError> {
        let mut roots = names
            .iter()
            .map(|n| self.resolve(n))
            .collect::<Result<Vec<_>, _>>()?;
        roots.sort_by_key(|d| d.order);

        let mut planner = Planner {
            registry: self,
            skip: &skip,
            done: HashSet::new(),
            path: Vec::new(),
            out: Vec::new(),
        };
        for root in roots {
            planner.visit(root)?;
        }
        Ok(planner.out)
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Depth-first topological walk with cycle detection.
struct Planner<'a> {
    registry: &'a PerkRegistry,
    skip: &'a dyn Fn(&str) -> bool,
    done: HashSet<Arc<str>>,
    path: Vec<Arc<str>>,
    out: Vec<Arc<PerkDescriptor>>,
}

impl Planner<'_> {
    fn visit(&mut self, desc: Arc<PerkDescriptor>) -> Result<(), UnitError> {
        if self.done.contains(&desc.name) || (self.skip)(&desc.name) {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|n| *n == desc.name) {
            let mut cycle: Vec<String> = self.path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(desc.name.to_string());
            return Err(UnitError::DependencyCycle { path: cycle });
        }

        self.path.push(desc.name.clone());
        for dep in &desc.depends {
            let dep = self.registry.resolve(dep)?;
            self.visit(dep)?;
        }
        self.path.pop();

        self.done.insert(desc.name.clone());
        self.out.push(desc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perks::perk_fn::PerkFn;
    use crate::store::ChainableStore;
    use crate::units::{UnitClass, UnitSpec};

    fn perk(name: &str, order: Option<i32>, deps: &[&str]) -> PerkRef {
        let mut p = PerkFn::new(name, |_rt, _unit| async { Ok(()) });
        if let Some(o) = order {
            p = p.with_order(o);
        }
        for d in deps {
            p = p.depends_on(*d);
        }
        p.into_ref()
    }

    fn registry() -> PerkRegistry {
        PerkRegistry::new(500, Bus::new(16))
    }

    fn names(plan: &[Arc<PerkDescriptor>]) -> Vec<&str> {
        plan.iter().map(|d| d.name()).collect()
    }

    #[test]
    fn order_defaults_to_registry_default() {
        let reg = registry();
        let d = reg.register(perk("a", None, &[])).unwrap();
        assert_eq!(d.order(), 500);
        assert_eq!(d.section(), "a");
        assert_eq!(reg.resolve_by_section("a").unwrap().name(), "a");
    }

    #[test]
    fn duplicate_name_and_section_are_rejected() {
        let reg = registry();
        reg.register(perk("a", None, &[])).unwrap();

        let err = reg.register(perk("a", Some(1), &[])).unwrap_err();
        assert_eq!(err, UnitError::DuplicatePerk { name: "a".into() });

        let clash = PerkFn::new("b", |_rt, _unit| async { Ok(()) })
            .with_section("a")
            .into_ref();
        let err = reg.register(clash).unwrap_err();
        assert_eq!(err.as_label(), "unit_section_conflict");
        assert!(reg.resolve("b").is_err());
    }

    #[test]
    fn dependencies_come_before_lower_ordered_dependents() {
        let reg = registry();
        reg.register(perk("x", Some(100), &[])).unwrap();
        reg.register(perk("y", Some(50), &["x"])).unwrap();

        let plan = reg.plan(&["y".into(), "x".into()]).unwrap();
        assert_eq!(names(&plan), ["x", "y"]);
    }

    #[test]
    fn roots_are_sorted_stably_by_order() {
        let reg = registry();
        reg.register(perk("late", Some(900), &[])).unwrap();
        reg.register(perk("first", Some(10), &[])).unwrap();
        reg.register(perk("tie-a", None, &[])).unwrap();
        reg.register(perk("tie-b", None, &[])).unwrap();

        let plan = reg
            .plan(&["late".into(), "tie-b".into(), "first".into(), "tie-a".into()])
            .unwrap();
        assert_eq!(names(&plan), ["first", "tie-b", "tie-a", "late"]);
    }

    #[test]
    fn cycles_are_reported_with_their_path() {
        let reg = registry();
        reg.register(perk("a", None, &["b"])).unwrap();
        reg.register(perk("b", None, &["c"])).unwrap();
        reg.register(perk("c", None, &["a"])).unwrap();

        let err = reg.plan(&["a".into()]).unwrap_err();
        assert_eq!(
            err,
            UnitError::DependencyCycle {
                path: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
        assert!(err.to_string().contains("a -> b -> c -> a"));
    }

    #[test]
    fn unknown_dependency_is_not_found() {
        let reg = registry();
        reg.register(perk("a", None, &["ghost"])).unwrap();
        assert_eq!(reg.plan(&["a".into()]).unwrap_err().as_label(), "unit_not_found");
    }

    #[test]
    fn candidates_merge_defaults_list_and_sections() {
        let reg = registry();
        for n in ["status", "event", "chart", "extra"] {
            reg.register(perk(n, None, &[])).unwrap();
        }
        let unit = Unit::new(
            UnitSpec::new("x"),
            Arc::new(UnitClass::new("plain")),
            Arc::new(ChainableStore::new()),
        );
        unit.settings()
            .merge("", &serde_json::json!({"perks": ["extra", "status"], "chart": {"kind": "bar"}}))
            .unwrap();

        let got = reg.candidates(&unit, &["status".into(), "event".into()]).unwrap();
        assert_eq!(got, ["status", "event", "extra", "chart"]);

        unit.settings().set(PERKS_KEY, serde_json::json!([1])).unwrap();
        assert_eq!(
            reg.candidates(&unit, &[]).unwrap_err().as_label(),
            "unit_invalid_setting"
        );
    }

    #[test]
    fn hooks_are_collected_at_registration() {
        struct Hooky;

        #[async_trait::async_trait]
        impl crate::perks::Perk for Hooky {
            fn name(&self) -> &str {
                "hooky"
            }
            fn global_init(&self, hooks: &mut Hooks) -> Result<(), UnitError> {
                hooks.on(HookPoint::Adopted, |_rt, _unit| Ok(()));
                hooks.on(HookPoint::Connected, |_rt, _unit| Ok(()));
                Ok(())
            }
            async fn init_for_unit(&self, _rt: &Runtime, _unit: &UnitRef) -> Result<(), UnitError> {
                Ok(())
            }
        }

        let reg = registry();
        reg.register(Arc::new(Hooky)).unwrap();
        assert_eq!(reg.hooks(HookPoint::Adopted).len(), 1);
        assert_eq!(reg.hooks(HookPoint::Connected).len(), 1);
        assert!(reg.hooks(HookPoint::Disconnected).is_empty());
    }
}
