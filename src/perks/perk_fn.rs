//! # Function-backed perk (`PerkFn`)
//!
//! [`PerkFn`] wraps a closure `F: Fn(Runtime, UnitRef) -> Fut`, producing a fresh
//! future per attachment. Order, section and dependencies are set with builder
//! methods.
//!
//! ## Example
//! ```rust
//! use unitvisor::{Perk, PerkFn, PerkRef, UnitError};
//!
//! let p: PerkRef = PerkFn::new("greet", |_rt, unit| async move {
//!     unit.stash("greeting", serde_json::json!("hello"));
//!     Ok::<_, UnitError>(())
//! })
//! .with_order(50)
//! .depends_on("status")
//! .into_ref();
//!
//! assert_eq!(p.name(), "greet");
//! assert_eq!(p.order(), Some(50));
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Runtime;
use crate::error::UnitError;
use crate::perks::perk::{Perk, PerkRef};
use crate::units::UnitRef;

/// Closure-backed perk.
pub struct PerkFn<F> {
    name: String,
    section: Option<String>,
    order: Option<i32>,
    depends: Vec<String>,
    f: F,
}

impl<F> PerkFn<F> {
    /// Claims a section other than the perk name.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Sets the attachment order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, perk: impl Into<String>) -> Self {
        self.depends.push(perk.into());
        self
    }
}

impl<F, Fut> PerkFn<F>
where
    F: Fn(Runtime, UnitRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    /// Creates a perk whose per-unit initializer is `f`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            section: None,
            order: None,
            depends: Vec::new(),
            f,
        }
    }

    /// Returns the perk as a shared handle.
    pub fn into_ref(self) -> PerkRef {
        Arc::new(self)
    }
}

#[async_trait]
impl<F, Fut> Perk for PerkFn<F>
where
    F: Fn(Runtime, UnitRef) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn section(&self) -> &str {
        self.section.as_deref().unwrap_or(&self.name)
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn depends(&self) -> Vec<String> {
        self.depends.clone()
    }

    async fn init_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        (self.f)(rt.clone(), unit.clone()).await
    }
}
