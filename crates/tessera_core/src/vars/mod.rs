//! # Entity Variables
//!
//! Object type layouts and the per-entity variable store built on them.
//!
//! Hot variables (position, icon, layer, ...) sit at fixed indices known at
//! compile time through [`BuiltinVar`]; everything else is resolved by name
//! once and then accessed by index.

mod store;
mod types;
mod value;

pub use store::VariableStore;
pub use types::{BuiltinVar, ObjectType, ObjectTypeRegistry, TypeDef};
pub use value::Value;
