//! Structured observability records.
//!
//! The pipeline emits discrete records rather than printing: a sink decides
//! whether they land in memory (tests, counters), a JSONL stream, or both.
//! One record per line keeps the stream replay- and grep-friendly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Record {
    SignalDecision {
        rule_id: String,
        symbol: String,
        direction: String,
        group: u64,
    },
    SignalRejected {
        reason: String,
    },
    DuplicateBlocked {
        rule_id: String,
    },
    DuplicateRejected {
        rule_id: String,
    },
    OrderCreated {
        order_id: String,
        rule_id: String,
    },
    OrderFailed {
        rule_id: String,
        reason: String,
    },
}

pub trait RecordSink: Send + Sync {
    fn record(&self, record: Record);
}

/// Collects records in memory. The test and inspection sink.
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, pred: impl Fn(&Record) -> bool) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| pred(r))
            .count()
    }

    pub fn count_blocked(&self) -> usize {
        self.count(|r| matches!(r, Record::DuplicateBlocked { .. }))
    }

    pub fn count_rejected(&self) -> usize {
        self.count(|r| matches!(r, Record::DuplicateRejected { .. }))
    }

    pub fn count_orders(&self) -> usize {
        self.count(|r| matches!(r, Record::OrderCreated { .. }))
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for MemorySink {
    fn record(&self, record: Record) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }
}

/// Writes one JSON object per line, stamped with a timestamp and a sequence
/// number for ordering across readers.
pub struct JsonlSink {
    writer: Mutex<Box<dyn Write + Send>>,
    seq: AtomicU64,
}

impl JsonlSink {
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(BufWriter::new(file))))
    }

    pub fn to_stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            seq: AtomicU64::new(0),
        }
    }
}

impl RecordSink for JsonlSink {
    fn record(&self, record: Record) {
        let mut line = match serde_json::to_value(&record) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        line.insert(
            "ts".to_string(),
            json!(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        line.insert(
            "seq".to_string(),
            json!(self.seq.fetch_add(1, Ordering::SeqCst)),
        );
        if let Ok(mut w) = self.writer.lock() {
            let _ = writeln!(w, "{}", serde_json::Value::Object(line));
            let _ = w.flush();
        }
    }
}

/// Fans one record out to several sinks (e.g. memory for counters plus a
/// JSONL stream for the external logger).
pub struct TeeSink {
    sinks: Vec<std::sync::Arc<dyn RecordSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn RecordSink>>) -> Self {
        Self { sinks }
    }
}

impl RecordSink for TeeSink {
    fn record(&self, record: Record) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_memory_sink_counts() {
        let sink = MemorySink::new();
        sink.record(Record::DuplicateBlocked {
            rule_id: "a".to_string(),
        });
        sink.record(Record::DuplicateBlocked {
            rule_id: "a".to_string(),
        });
        sink.record(Record::OrderCreated {
            order_id: "o1".to_string(),
            rule_id: "b".to_string(),
        });
        assert_eq!(sink.count_blocked(), 2);
        assert_eq!(sink.count_orders(), 1);
        assert_eq!(sink.count_rejected(), 0);
        assert_eq!(sink.records().len(), 3);
    }

    #[test]
    fn test_jsonl_sink_writes_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        {
            let sink = JsonlSink::to_file(&path).unwrap();
            sink.record(Record::SignalDecision {
                rule_id: "ma_MINI_BUY_group_1".to_string(),
                symbol: "MINI".to_string(),
                direction: "BUY".to_string(),
                group: 1,
            });
            sink.record(Record::DuplicateBlocked {
                rule_id: "ma_MINI_BUY_group_1".to_string(),
            });
        }
        let mut raw = String::new();
        File::open(&path).unwrap().read_to_string(&mut raw).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "signal_decision");
        assert_eq!(first["group"], 1);
        assert_eq!(first["seq"], 0);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "duplicate_blocked");
        assert_eq!(second["seq"], 1);
    }

    #[test]
    fn test_tee_sink_duplicates_records() {
        let a = std::sync::Arc::new(MemorySink::new());
        let b = std::sync::Arc::new(MemorySink::new());
        let tee = TeeSink::new(vec![a.clone(), b.clone()]);
        tee.record(Record::SignalRejected {
            reason: "missing_symbol".to_string(),
        });
        assert_eq!(a.records().len(), 1);
        assert_eq!(b.records(), a.records());
    }
}
