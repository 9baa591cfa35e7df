//! Database repositories for the data access layer.
//!
//! Each repository owns one domain entity and provides CRUD plus the
//! specialized atomic queries called out in the component design.

pub mod chunks;
pub mod quotas;
pub mod tasks;
pub mod uploads;
