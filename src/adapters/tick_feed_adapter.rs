//! Line-delimited tick feed reader.
//!
//! One batch per line. Accepted line shapes:
//! - a JSON array of tick objects
//! - the push payload `{"data": [...]}`
//! - either of the above behind a `data:` prefix, as on an event stream
//!
//! Blank lines and lines starting with `:` are skipped. `event: reset`
//! asks the caller to clear the engine, as a dropped connection would.

use crate::domain::error::TickwatchError;
use serde_json::Value;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Batch(Vec<Value>),
    Reset,
}

/// Parse one feed line. `Ok(None)` for lines that carry nothing.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<FeedEvent>, TickwatchError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    if let Some(event) = line.strip_prefix("event:") {
        return match event.trim() {
            "reset" => Ok(Some(FeedEvent::Reset)),
            _ => Ok(None),
        };
    }

    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    let value: Value = serde_json::from_str(payload).map_err(|e| TickwatchError::Feed {
        line: line_no,
        reason: e.to_string(),
    })?;

    match value {
        Value::Array(items) => Ok(Some(FeedEvent::Batch(items))),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => Ok(Some(FeedEvent::Batch(items))),
            _ => Err(TickwatchError::Feed {
                line: line_no,
                reason: "object without a 'data' array".to_string(),
            }),
        },
        _ => Err(TickwatchError::Feed {
            line: line_no,
            reason: "expected a JSON array or object".to_string(),
        }),
    }
}

/// Iterator over the events of a feed, numbering lines from 1.
pub struct TickFeedReader<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> TickFeedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for TickFeedReader<R> {
    type Item = Result<FeedEvent, TickwatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            match parse_line(&self.buf, self.line_no) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
