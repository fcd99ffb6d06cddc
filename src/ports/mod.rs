//! Port traits between the domain and the outside world.

pub mod alert_port;
pub mod config_port;
pub mod snapshot_port;
pub mod workspace_port;
