//! Units: managed objects, their classes, statuses and the global index.
//!
//! - [`Unit`] / [`UnitRef`] one lifecycle-managed entity and its shared handle
//! - [`UnitSpec`] creation parameters supplied by the host
//! - [`UnitClass`] named kind with inheritable default settings
//! - [`Status`] open status enum with busy/completion and match rules
//! - [`UnitIndex`] lookup by id, tag, class and name

mod class;
mod index;
mod status;
mod unit;

pub use class::UnitClass;
pub use index::UnitIndex;
pub use status::Status;
pub use unit::{Unit, UnitRef, UnitSpec};
