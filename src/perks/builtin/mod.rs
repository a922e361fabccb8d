//! Built-in perks, registered by default by the [`RuntimeBuilder`](crate::RuntimeBuilder).
//!
//! | perk     | section  | order | purpose                                   |
//! |----------|----------|-------|-------------------------------------------|
//! | `status` | `status` | 100   | wait timeout default, `waitFor` on start  |
//! | `event`  | `event`  | 900   | declarative element/event bindings        |
//! | `unit`   | `unit`   | 1000  | composed child units                      |

mod event;
mod status;
mod unit;

use std::sync::Arc;

use crate::perks::PerkRef;

pub use event::{EventPerk, SELF_ELEMENT};
pub use status::StatusPerk;
pub use unit::{UnitPerk, CHILDREN_KEY};

/// All built-in perks, in registration order.
pub fn all() -> Vec<PerkRef> {
    vec![Arc::new(StatusPerk), Arc::new(EventPerk), Arc::new(UnitPerk)]
}
