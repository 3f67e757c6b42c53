#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` pick up every type.

pub mod child;
pub mod feeding;
pub mod invitation;
pub mod invitation_event;
pub mod user;

// Re-export all types at the `crate::db::models` namespace.
pub use self::child::*;
pub use self::feeding::*;
pub use self::invitation::*;
pub use self::invitation_event::*;
pub use self::user::*;
