//! Offline CAN frame decoder
//!
//! Reads `candump -L` style lines from stdin and decodes each frame with the
//! given DBC files, printing decoded messages and a summary. Handy for checking
//! a DBC against recorded traffic before pointing the exporter at a live bus.
//!
//! Usage:
//!   decode_candump --dbc <file.dbc> [--dbc <file.dbc>] [--limit <count>] [--verbose] < dump.log
//!
//! Accepted line forms:
//!   (1436509052.249713) vcan0 123#0A14
//!   123#0A14

use can_signal_decoder::{format_frame, Decoder, Frame};
use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;

#[derive(Default)]
struct Summary {
    lines: usize,
    malformed: usize,
    decoded: usize,
    unknown: usize,
    skipped_signals: usize,
    per_message: HashMap<String, usize>,
}

impl Summary {
    fn print(&self) {
        println!("\n=== SUMMARY ===");
        println!("Lines read: {}", self.lines);
        println!("Malformed lines: {}", self.malformed);
        println!("Decoded messages: {}", self.decoded);
        println!("Unknown frames: {}", self.unknown);
        println!("Skipped signals: {}", self.skipped_signals);

        let mut counts: Vec<_> = self.per_message.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (name, count) in counts.iter().take(10) {
            println!("  {}: {}", name, count);
        }
    }
}

/// Parse `[(<ts>)] [<iface>] <id>#<hex>`
fn parse_line(line: &str, fallback_ts: f64) -> Option<Frame> {
    let mut timestamp = fallback_ts;
    let mut frame_token = None;

    for token in line.split_whitespace() {
        if let Some(ts) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            timestamp = ts.parse().ok()?;
        } else if token.contains('#') {
            frame_token = Some(token);
        }
    }

    let (id, data) = frame_token?.split_once('#')?;
    let id = u32::from_str_radix(id, 16).ok()?;
    if !data.is_ascii() || data.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..data.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&data[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .ok()?;

    Frame::new(id, &bytes, timestamp)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut dbc_files = Vec::new();
    let mut limit: Option<usize> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dbc" => {
                i += 1;
                if i < args.len() {
                    dbc_files.push(PathBuf::from(&args[i]));
                }
            }
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = Some(args[i].parse()?);
                }
            }
            "--verbose" | "-v" => verbose = true,
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    if dbc_files.is_empty() {
        eprintln!("Usage: {} --dbc <file.dbc> [--limit <count>] [--verbose] < dump.log", args[0]);
        std::process::exit(1);
    }

    let decoder = Decoder::from_dbc_files(&dbc_files)?;
    let stats = decoder.catalog_stats();
    println!("=== SIGNAL CATALOG ===");
    println!("Messages: {}", stats.num_messages);
    println!("Signals: {}", stats.num_signals);
    println!("Multiplexed: {}\n", stats.num_multiplexed);

    let mut summary = Summary::default();

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let Some(frame) = parse_line(&line, summary.lines as f64) else {
            summary.malformed += 1;
            eprintln!("Cannot parse: {}", line);
            continue;
        };

        match decoder.decode(&frame) {
            Some(outcome) => {
                summary.decoded += 1;
                summary.skipped_signals += outcome.skipped.len();
                *summary
                    .per_message
                    .entry(outcome.message.message_name.clone())
                    .or_insert(0) += 1;

                if limit.map_or(true, |max| summary.decoded <= max) {
                    println!("{}", outcome.message);
                    for err in &outcome.skipped {
                        println!("    ! {}", err);
                    }
                }
            }
            None => {
                summary.unknown += 1;
                if verbose {
                    println!("{}", format_frame(&frame));
                }
            }
        }
    }

    summary.print();
    Ok(())
}
