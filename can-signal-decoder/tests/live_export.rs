//! End-to-end: DBC file on disk → virtual bus → pipeline → text exposition

use can_signal_decoder::{
    Decoder, Frame, MetricRegistry, Pipeline, PipelineConfig, PipelineState, ShutdownSignal,
    VirtualBus,
};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const POWERTRAIN_DBC: &str = r#"VERSION ""

NS_ :

BS_:

BU_: ECU1 ECU2

BO_ 512 BatteryStatus: 8 ECU1
 SG_ BatteryVoltage : 0|16@1+ (0.01,0) [0|16] "V" ECU2
 SG_ BatteryCurrent : 23|16@0- (0.1,0) [-3276.8|3276.7] "A" ECU2

BO_ 768 DriveMode: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU2
 SG_ Torque m0 : 8|16@1+ (1,0) [0|1000] "Nm" ECU2
 SG_ Voltage m1 : 8|16@1+ (0.1,0) [0|1000] "mV" ECU2
"#;

fn dbc_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(POWERTRAIN_DBC.as_bytes()).unwrap();
    file
}

fn wait_for(registry: &MetricRegistry, message: &str, signal: &str) -> f64 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = registry.value(message, signal) {
            return value;
        }
        assert!(Instant::now() < deadline, "{}.{} never published", message, signal);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_frames_reach_exposition() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = dbc_file();
    let decoder = Decoder::from_dbc_files([file.path()]).unwrap();
    assert_eq!(decoder.catalog_stats().num_messages, 2);
    assert_eq!(decoder.catalog_stats().num_multiplexed, 1);

    let catalog = Arc::new(decoder.into_catalog());
    let registry = Arc::new(MetricRegistry::new());
    let (bus, producer) = VirtualBus::new("vcan0");
    let config = PipelineConfig::new().with_receive_timeout(Duration::from_millis(20));
    let mut pipeline = Pipeline::new(bus, catalog, Arc::clone(&registry), config);

    let shutdown = ShutdownSignal::new();
    let worker = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            let result = pipeline.run(&shutdown);
            (result, pipeline.state())
        })
    };

    // 12.00 V, -20.0 A (Motorola, signed)
    producer
        .send(Frame::new(0x200, &[0xB0, 0x04, 0xFF, 0x38, 0, 0, 0, 0], 1.0).unwrap())
        .unwrap();
    // Mode 1 selects Voltage, Torque stays unpublished
    producer
        .send(Frame::new(0x300, &[0x01, 0xE8, 0x03, 0, 0, 0, 0, 0], 1.1).unwrap())
        .unwrap();
    // Not in the catalog
    producer.send(Frame::new(0x7DF, &[0x02, 0x01, 0x0C], 1.2).unwrap()).unwrap();

    assert!((wait_for(&registry, "BatteryStatus", "BatteryVoltage") - 12.0).abs() < 1e-9);
    assert!((wait_for(&registry, "BatteryStatus", "BatteryCurrent") + 20.0).abs() < 1e-9);
    assert!((wait_for(&registry, "DriveMode", "Voltage") - 100.0).abs() < 1e-9);
    assert_eq!(registry.value("DriveMode", "Torque"), None);

    shutdown.trigger();
    let (result, state) = worker.join().unwrap();
    let stats = result.unwrap();
    assert_eq!(state, PipelineState::Stopped);
    assert_eq!(stats.messages_decoded, 2);
    assert!(stats.unknown_frames <= 1);

    let text = registry.encode_text().unwrap();
    assert!(text.contains("# TYPE BatteryStatus gauge"));
    assert!(text.contains("BatteryStatus{signal=\"BatteryCurrent\"}"));
    assert!(text.contains("DriveMode{signal=\"Mode\"} 1"));
    assert!(!text.contains("Torque"));
}

#[test]
fn test_missing_dbc_file_is_reported() {
    let err = Decoder::from_dbc_files(["/nonexistent/powertrain.dbc"]).unwrap_err();
    assert!(err.to_string().contains("powertrain.dbc"));
}
