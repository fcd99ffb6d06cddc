//! Terminal alert sink: notifications as text, sounds as the terminal bell.

use crate::domain::config_validation::AlertSettings;
use crate::ports::alert_port::AlertSink;
use std::io::{self, Write};

const BELL: &[u8] = b"\x07";

pub struct ConsoleAlertAdapter<W: Write> {
    out: W,
    settings: AlertSettings,
}

impl ConsoleAlertAdapter<io::Stderr> {
    pub fn stderr(settings: AlertSettings) -> Self {
        Self::new(io::stderr(), settings)
    }
}

impl<W: Write> ConsoleAlertAdapter<W> {
    pub fn new(out: W, settings: AlertSettings) -> Self {
        Self { out, settings }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, bytes: &[u8]) {
        // A closed terminal must not stop the engine.
        if let Err(e) = self.out.write_all(bytes).and_then(|_| self.out.flush()) {
            log::debug!("alert output failed: {}", e);
        }
    }
}

impl<W: Write> AlertSink for ConsoleAlertAdapter<W> {
    fn notify(&mut self, title: &str, body: &str) {
        if !self.settings.notify {
            return;
        }
        log::warn!("{}: {}", title, body);
        self.emit(format!("[ALERT] {}: {}\n", title, body).as_bytes());
    }

    fn sound(&mut self) {
        if self.settings.sound {
            self.emit(BELL);
        }
    }
}
