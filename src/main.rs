use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use signalgate::events::Direction;
use signalgate::pipeline::{Config, Pipeline};
use signalgate::records::{JsonlSink, MemorySink, RecordSink, TeeSink};

/// Demo driver: runs a scripted tick sequence through the full pipeline and
/// prints what happened. Duplicate decisions are deliberately replayed to
/// show both enforcement points doing their job.
fn main() -> Result<()> {
    let config = Config::from_env();

    let memory = Arc::new(MemorySink::new());
    let stream: Arc<dyn RecordSink> = match &config.records_path {
        Some(path) => Arc::new(JsonlSink::to_file(path)?),
        None => Arc::new(JsonlSink::to_stdout()),
    };
    let sink: Arc<dyn RecordSink> =
        Arc::new(TeeSink::new(vec![memory.clone() as Arc<dyn RecordSink>, stream]));

    let mut pipeline = Pipeline::new(config.clone(), sink);
    pipeline.start_run();

    let ticks = [
        ("MINI", Direction::Long, 101.0),
        ("MINI", Direction::Long, 101.2), // repeat: no decision
        ("MINI", Direction::Short, 100.4),
        ("MAXI", Direction::Long, 55.0),
        ("MINI", Direction::Short, 100.1), // repeat: no decision
        ("MINI", Direction::Long, 100.9),
    ];
    for (symbol, direction, price) in ticks {
        let report = pipeline.process(symbol, direction, price);
        if !report.ok() {
            for failure in &report.failures {
                eprintln!("handler {} failed: {}", failure.handler, failure.error);
            }
        }
    }

    // Replay an already-seen decision; the emission guard blocks it.
    let replay = signalgate::events::Event::signal(signalgate::events::SignalEvent {
        symbol: "MINI".to_string(),
        direction: Direction::Long,
        price: 100.9,
        rule_id: Some(format!("{}_MINI_BUY_group_1", config.strategy)),
        group: Some(1),
    });
    pipeline.emit(&replay);

    pipeline.check_run_integrity()?;

    let orders = pipeline.drain_orders();
    println!(
        "{}",
        json!({
            "event": "run_summary",
            "orders": orders.len(),
            "duplicate_blocked": memory.count_blocked(),
            "duplicate_rejected": memory.count_rejected(),
        })
    );
    for order in &orders {
        println!("{}", serde_json::to_string(order)?);
    }
    Ok(())
}
