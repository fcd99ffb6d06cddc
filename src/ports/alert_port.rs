//! Alert action port trait.

/// Side effects an alert rule can trigger.
pub trait AlertSink {
    fn notify(&mut self, title: &str, body: &str);
    fn sound(&mut self);
}
