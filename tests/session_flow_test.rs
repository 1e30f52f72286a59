//! End-to-end tests for the session correlation pipeline.

use presence_session_agent::{
    Config, FilterSpec, RadioDecoding, ReceiverSighting, SessionPipeline,
};

const HOLDOFF_MS: u64 = 10_000;

fn test_config() -> Config {
    Config {
        rssi_threshold: -50,
        reinitiation_holdoff_ms: HOLDOFF_MS,
        ..Config::default()
    }
}

fn raddec(signature: &str, rssi: i16, time: u64) -> RadioDecoding {
    RadioDecoding {
        transmitter_signature: signature.to_string(),
        rssi_signature: vec![ReceiverSighting::new("001bc50940810000", 1, rssi)],
        packets: Vec::new(),
        initial_time: time,
    }
}

/// Eddystone-UID advertisement with a fixed namespace and instance; decodes
/// to the device id `"11...1122...22"` used in the whitelist tests.
fn eddystone_packet() -> Vec<u8> {
    let mut packet = vec![0x15, 0x16, 0xaa, 0xfe, 0x00, 0xf0];
    packet.extend([0x11; 10]);
    packet.extend([0x22; 6]);
    packet
}

const EDDYSTONE_DEVICE_ID: &str = "11111111111111111111222222222222";

fn whitelisted_raddec(signature: &str, rssi: i16, time: u64) -> RadioDecoding {
    let mut record = raddec(signature, rssi, time);
    record.packets = vec![eddystone_packet()];
    record
}

#[test]
fn test_unmatched_filter_yields_no_session() {
    let config = Config {
        filter: FilterSpec::default().with_property("uuids", ["180f"]),
        ..test_config()
    };
    let mut pipeline = SessionPipeline::new(&config).expect("valid config");

    // Above threshold, no whitelist, filter unmatched: nothing emitted.
    assert!(pipeline.process_at(raddec("x/2", -42, 1000), 1000).is_none());
    assert!(pipeline.machine().registry().is_empty());
    assert_eq!(pipeline.stats().totals().records_dropped, 1);
}

#[test]
fn test_whitelisted_session_survives_address_cycling() {
    let config = Config {
        whitelisted_device_ids: vec![EDDYSTONE_DEVICE_ID.to_string()],
        ..test_config()
    };
    let mut pipeline = SessionPipeline::new(&config).expect("valid config");

    let first = pipeline
        .process_at(whitelisted_raddec("aa/2", -42, 1000), 1000)
        .expect("session started");
    assert_eq!(first.instance_id, EDDYSTONE_DEVICE_ID);

    // The broadcast address cycles; the identity keeps its session.
    let second = pipeline
        .process_at(whitelisted_raddec("bb/2", -42, 3000), 3000)
        .expect("session continued");

    assert_eq!(second.session_id, first.session_id);
    let machine = pipeline.machine();
    assert_eq!(
        machine.session_for_signature("bb/2").unwrap().session_id,
        first.session_id
    );
    assert_eq!(machine.registry().len(), 1);
}

#[test]
fn test_same_signature_within_holdoff_continues() {
    let mut pipeline = SessionPipeline::new(&test_config()).expect("valid config");

    let first = pipeline
        .process_at(raddec("x/2", -42, 1000), 1000)
        .expect("session started");
    let second = pipeline
        .process_at(raddec("x/2", -42, 5000), 5000)
        .expect("session continued");

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(
        pipeline
            .machine()
            .session_for_signature("x/2")
            .unwrap()
            .journey_start_time,
        5000
    );
}

#[test]
fn test_same_signature_past_holdoff_reinitiates() {
    let mut pipeline = SessionPipeline::new(&test_config()).expect("valid config");

    let first = pipeline
        .process_at(raddec("x/2", -42, 1000), 1000)
        .expect("session started");
    let second = pipeline
        .process_at(raddec("x/2", -42, 12_000), 12_000)
        .expect("session reinitiated");

    assert_ne!(second.session_id, first.session_id);

    // The old session is gone from the registry entirely.
    let machine = pipeline.machine();
    assert!(machine.registry().get(&first.session_id).is_none());
    assert_eq!(
        machine.session_for_signature("x/2").unwrap().session_id,
        second.session_id
    );
    assert_eq!(pipeline.stats().totals().sessions_started, 2);
}

#[test]
fn test_below_threshold_continues_without_journey_refresh() {
    let mut pipeline = SessionPipeline::new(&test_config()).expect("valid config");

    let first = pipeline
        .process_at(raddec("x/2", -42, 1000), 1000)
        .expect("session started");

    let mut weak = raddec("x/2", -60, 2000);
    weak.rssi_signature = vec![ReceiverSighting::new("001bc50940810001", 1, -60)];
    let second = pipeline
        .process_at(weak, 2000)
        .expect("tracking update still emits");

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.nearest[0].receiver_id, "001bc50940810001");
    assert_eq!(second.nearest[0].rssi, -60);
    assert_eq!(
        pipeline
            .machine()
            .session_for_signature("x/2")
            .unwrap()
            .journey_start_time,
        1000
    );
}

#[test]
fn test_filter_or_semantics_across_properties() {
    let config = Config {
        filter: FilterSpec::default()
            .with_property("uuids", ["feaa"])
            .with_property("name", ["Widget"]),
        ..test_config()
    };
    let mut pipeline = SessionPipeline::new(&config).expect("valid config");

    // Satisfies only the uuid property; that is enough.
    let mut record = raddec("x/2", -42, 1000);
    record.packets = vec![eddystone_packet()];
    assert!(pipeline.process_at(record, 1000).is_some());
}

#[test]
fn test_worked_example() {
    // threshold -50 dBm, holdoff 10000 ms
    let mut pipeline = SessionPipeline::new(&test_config()).expect("valid config");

    // Record A: above threshold, empty filter accepts, anonymous identity.
    let a = pipeline
        .process_at(raddec("x/2", -42, 1000), 1000)
        .expect("S1 started");
    assert_eq!(a.instance_id, "x/2");
    assert_eq!(a.timestamp, 1000);

    // Record B: below threshold, S1 continues with updated nearest.
    let b = pipeline
        .process_at(raddec("x/2", -60, 2000), 2000)
        .expect("S1 continues");
    assert_eq!(b.session_id, a.session_id);
    assert_eq!(b.nearest[0].rssi, -60);
    assert_eq!(b.timestamp, 2000);

    // Record C: above threshold, holdoff elapsed (15000 - 1000 > 10000).
    let c = pipeline
        .process_at(raddec("x/2", -42, 15_000), 15_000)
        .expect("S2 started");
    assert_ne!(c.session_id, a.session_id);

    let totals = pipeline.stats().totals();
    assert_eq!(totals.decodings_processed, 3);
    assert_eq!(totals.sessions_started, 2);
    assert_eq!(totals.emissions, 3);
}

#[test]
fn test_subscribers_see_every_emission() {
    let mut pipeline = SessionPipeline::new(&test_config()).expect("valid config");
    let emissions = pipeline.subscribe();

    pipeline.process_at(raddec("x/2", -42, 1000), 1000);
    pipeline.process_at(raddec("x/2", -60, 2000), 2000);
    pipeline.process_at(raddec("y/2", -80, 3000), 3000); // dropped

    let received: Vec<_> = emissions.try_iter().collect();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].timestamp, 1000);
    assert_eq!(received[1].timestamp, 2000);
}
