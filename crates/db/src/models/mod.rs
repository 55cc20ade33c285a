//! Row structs for every table, with conversions into the `keeper-core`
//! domain types.

pub mod lock;
pub mod project;
pub mod session;
pub mod user;
