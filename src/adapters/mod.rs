//! Concrete adapter implementations for ports.

pub mod console_alert_adapter;
pub mod csv_snapshot_adapter;
pub mod file_config_adapter;
pub mod history_csv_adapter;
pub mod json_snapshot_adapter;
pub mod json_workspace_adapter;
pub mod tick_feed_adapter;
