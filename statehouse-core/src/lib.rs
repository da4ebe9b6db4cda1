//! Statehouse Core
//!
//! Types shared by the statehouse store and its HTTP front end.

pub mod name;
pub mod value;

pub use name::{NameError, StateName};
pub use value::Value;
