//! Tests for the encoder peripheral operations

mod common;

use common::*;

#[test]
fn test_arm_then_read_four_samples() {
    let mut rig = instant_rig(EmulatedTransport::new());
    rig.encoder().arm(Some(4)).unwrap();

    let capture = rig.encoder().read_captured_data().unwrap();
    let expected = rig.transport().encoder_table()[..4].to_vec();
    assert_eq!(capture, Capture::Ready(expected));

    let ready = rig.transport().reads()[0].frame;
    assert_eq!(EncoderStatus::from(ready.code()), EncoderStatus::Ready);
    assert_eq!(le16(&ready, 1), 16);
}

#[test]
fn test_read_reassembles_32_bytes_in_order() {
    let mut rig = instant_rig(EmulatedTransport::new());
    rig.encoder().arm(Some(8)).unwrap();

    let samples = rig.encoder().read_captured_data().unwrap().into_samples().unwrap();
    assert_eq!(samples.len(), 8);
    assert_eq!(samples, rig.transport().encoder_table()[..8].to_vec());
    assert!(samples.iter().any(|s| *s < 0), "table should exercise negative positions");
}

#[test]
fn test_read_while_capturing_is_not_ready() {
    let mut rig = instant_rig(EmulatedTransport::new().with_encoder_capture_polls(1));
    rig.encoder().arm(Some(2)).unwrap();

    assert_eq!(rig.encoder().read_captured_data().unwrap(), Capture::NotReady);
    let capture = rig.encoder().read_captured_data().unwrap();
    assert!(capture.is_ready());
    assert_eq!(capture.into_samples().unwrap().len(), 2);
}

#[test]
fn test_read_without_arming_is_protocol_error() {
    let mut rig = instant_rig(EmulatedTransport::new());
    match rig.encoder().read_captured_data() {
        Err(err @ RigError::UnexpectedStatus { .. }) => {
            assert!(err.is_protocol_error());
            if let RigError::UnexpectedStatus { peripheral, status } = err {
                assert_eq!(peripheral, "encoder");
                assert_eq!(status, u8::from(EncoderStatus::Idle));
            }
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[test]
fn test_wait_for_captured_data_polls_until_ready() {
    let mut rig = instant_rig(EmulatedTransport::new().with_encoder_capture_polls(3));
    rig.encoder().arm(Some(5)).unwrap();

    let samples = rig.encoder().wait_for_captured_data().unwrap();
    assert_eq!(samples, rig.transport().encoder_table()[..5].to_vec());

    let busy = rig
        .transport()
        .reads()
        .iter()
        .filter(|r| r.frame.code() == u8::from(EncoderStatus::Capturing))
        .count();
    assert_eq!(busy, 3);
}

#[test]
fn test_single_shot_reads_position() {
    let mut rig = instant_rig(EmulatedTransport::new());
    let first = rig.encoder().read_single_sample().unwrap();
    let second = rig.encoder().read_single_sample().unwrap();
    assert_eq!(first, Some(1024));
    assert_eq!(second, Some(1041));

    let request = rig.transport().writes()[0].frame;
    assert_eq!(request.as_bytes(), &[u8::from(EncoderOpcode::SingleShot), 0, 0, 0, 0, 0]);
}

#[test]
fn test_single_shot_not_available_is_none() {
    let script = ScriptedTransport::new([frame(u8::from(EncoderStatus::Capturing), &[])]);
    let mut rig = instant_rig(script);
    assert_eq!(rig.encoder().read_single_sample().unwrap(), None);
}

#[test]
fn test_single_shot_decodes_unsigned_little_endian() {
    let script = ScriptedTransport::new([frame(u8::from(EncoderStatus::SingleShotReady), &[0xFE, 0xFF, 0xFF, 0xFF])]);
    let mut rig = instant_rig(script);
    assert_eq!(rig.encoder().read_single_sample().unwrap(), Some(0xFFFF_FFFE));
}

#[test]
fn test_arm_defaults_to_200_samples() {
    let mut rig = instant_rig(EmulatedTransport::new());
    rig.encoder().arm(None).unwrap();

    let writes = rig.transport().writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, ENCODER_ADDR);
    assert_eq!(writes[0].frame.as_bytes(), &[u8::from(EncoderOpcode::Record), 200, 0, 0, 0, 0]);
    assert!(rig.transport().reads().is_empty(), "arming does not poll");
}

#[test]
fn test_arm_rejects_bad_sample_counts() {
    let mut rig = instant_rig(EmulatedTransport::new());
    for bad in [0, 256] {
        assert!(matches!(
            rig.encoder().arm(Some(bad)),
            Err(RigError::OutOfRange { parameter: "samples", .. })
        ));
    }
    assert!(rig.transport().writes().is_empty());
}

#[test]
fn test_arm_refused_while_estop_engaged() {
    let mut rig = instant_rig(EmulatedTransport::new());
    rig.estop().engage();
    assert!(matches!(rig.encoder().arm(Some(10)), Err(RigError::EmergencyStop)));
    assert!(rig.transport().writes().is_empty());

    // Position reads stay available.
    assert!(rig.encoder().read_single_sample().unwrap().is_some());
}

#[test]
fn test_arm_reports_transport_failure() {
    let mut rig = instant_rig(EmulatedTransport::new());
    rig.transport_mut().disconnect(ENCODER_ADDR);
    assert!(matches!(
        rig.encoder().arm(Some(10)),
        Err(RigError::Transport(TransportError::Unreachable { .. }))
    ));
}

#[test]
fn test_custom_addresses() {
    let config = RigConfig {
        motor_address: 0x10,
        encoder_address: 0x61,
        ..RigConfig::instant()
    };
    let mut rig = Rig::new(EmulatedTransport::new().with_addresses(0x10, 0x61), config);
    rig.encoder().arm(Some(1)).unwrap();
    assert_eq!(rig.encoder().read_captured_data().unwrap().into_samples().unwrap().len(), 1);
    assert!(rig.transport().writes().iter().all(|w| w.address == 0x61));
}

#[test]
fn test_external_estop_during_wait_stops_motor() {
    let mut rig = instant_rig(EmulatedTransport::new().with_encoder_capture_polls(5));
    rig.motor().start(3000.0, 20.0, 5, Direction::Cw).unwrap();
    rig.encoder().arm(Some(4)).unwrap();

    let trigger = rig.estop().clone();
    trigger.engage();

    assert!(matches!(rig.encoder().wait_for_captured_data(), Err(RigError::EmergencyStop)));
    assert!(!rig.transport().is_motor_running());
    let motor_estops = rig
        .transport()
        .writes()
        .iter()
        .filter(|w| w.address == MOTOR_ADDR && w.frame.code() == u8::from(MotorOpcode::EmergencyStop))
        .count();
    assert_eq!(motor_estops, 1);
}

#[test]
fn test_estop_mid_download_sends_motor_estop() {
    let estop = EmergencyStop::new();
    let script = ScriptedTransport::new([
        frame(u8::from(EncoderStatus::Ready), &[8, 0]),
        frame(u8::from(EncoderStatus::Chunk), &[1, 2, 3, 4]),
        frame(u8::from(MotorStatus::Stopped), &[]),
    ])
    .engage_after(2, estop.clone());
    let mut rig = Rig::with_estop(script, RigConfig::instant(), estop);

    assert!(matches!(rig.encoder().read_captured_data(), Err(RigError::EmergencyStop)));

    let sent: Vec<(u8, u8)> = rig.transport().writes.iter().map(|(addr, f)| (*addr, f.code())).collect();
    assert_eq!(
        sent,
        vec![
            (ENCODER_ADDR, u8::from(EncoderOpcode::ReadChunk)),
            (MOTOR_ADDR, u8::from(MotorOpcode::EmergencyStop)),
        ]
    );
    assert_eq!(rig.transport().remaining(), 0);
}
