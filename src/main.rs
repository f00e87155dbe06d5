//! Demo entry point: runs the engine for a fixed duration, prints aggregates
//! and periodic metrics from the sink, then dumps the final snapshot as JSON.
//!
//! Usage: `streampulse [--stress] [--seconds N]`

use std::thread;
use std::time::Duration;

use crossbeam::channel::bounded;
use log::{error, info};

use streampulse::engine::{EngineConfig, SinkMessage, run_engine};
use streampulse::signal::StopSignal;

const DEFAULT_RUN_SECS: u64 = 30;
const SINK_CAPACITY: usize = 1024;

fn parse_args() -> (EngineConfig, Duration) {
    let mut config = EngineConfig::default();
    let mut seconds = DEFAULT_RUN_SECS;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stress" => config.stress_mode = true,
            "--seconds" => {
                if let Some(value) = args.next().and_then(|v| v.parse().ok()) {
                    seconds = value;
                }
            }
            other => error!("ignoring unknown argument '{other}'"),
        }
    }

    (config, Duration::from_secs(seconds))
}

fn main() {
    env_logger::init();
    let (config, run_for) = parse_args();
    info!(
        "=== STREAMPULSE START === (stress={}, duration={}s)",
        config.stress_mode,
        run_for.as_secs()
    );

    let stop = StopSignal::new();
    let (out_tx, out_rx) = bounded::<SinkMessage>(SINK_CAPACITY);

    let printer = thread::spawn(move || {
        for message in out_rx {
            match message {
                SinkMessage::Metrics { data, .. } => {
                    println!(
                        "[metrics] ingested={} processed={} aggregated={} dropped={} drop_ratio={:.3} queues={:?}",
                        data.ingested_total,
                        data.processed_total,
                        data.aggregated_total,
                        data.dropped_total,
                        data.drop_ratio,
                        data.queue_sizes,
                    );
                }
                SinkMessage::Agg { data, .. } => {
                    let rendered =
                        serde_json::to_string(&data.payload).unwrap_or_else(|e| e.to_string());
                    println!("[agg] {} {}", data.source.as_str(), rendered);
                }
                SinkMessage::Event { .. } => {}
            }
        }
    });

    let engine = {
        let stop = stop.clone();
        thread::spawn(move || run_engine(stop, out_tx, config))
    };

    thread::sleep(run_for);
    stop.set();

    match engine.join() {
        Ok(snapshot) => {
            let _ = printer.join();
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(err) => error!("failed to render final snapshot: {err}"),
            }
        }
        Err(_) => error!("engine thread panicked"),
    }

    info!("=== STREAMPULSE FINISHED ===");
}
