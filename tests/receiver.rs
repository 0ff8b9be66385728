use marantz_avr::{
    AvReceiver, AvrError, Feedback, Generation, RampState, ReceiverConfig, Result, SurroundChannel,
    SurroundMode, Transport, Zone2Feedback,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Wire {
    written: Mutex<Vec<String>>,
}

impl Wire {
    fn commands(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.trim_end_matches('\r').to_string())
            .collect()
    }

    fn take(&self) -> Vec<String> {
        let commands = self.commands();
        self.written.lock().unwrap().clear();
        commands
    }
}

impl Transport for Wire {
    fn send(&self, text: &str) -> Result<()> {
        assert!(text.ends_with('\r'), "unterminated command {:?}", text);
        self.written.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn setup(config: ReceiverConfig) -> (AvReceiver, Arc<Wire>) {
    let wire = Arc::new(Wire::default());
    let receiver = AvReceiver::new(config, wire.clone()).unwrap();
    (receiver, wire)
}

async fn receive(receiver: &AvReceiver, lines: &[&str]) {
    let sender = receiver.line_sender();
    for line in lines {
        sender.push(*line).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn status_burst_builds_full_state() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    let mut feedback = receiver.subscribe();

    receive(
        &receiver,
        &["PWON", "MVMAX 80", "MV455", "MUOFF", "SIBD", "MSDOLBY DIGITAL", "CVFL 50", "CVSW 515", "CVEND"],
    )
    .await;

    assert!(receiver.power_is_on());
    assert_eq!(receiver.max_volume(), 800);
    assert_eq!(receiver.volume_level(), 455);
    assert_eq!(receiver.current_input().as_deref(), Some("BD"));
    assert_eq!(receiver.current_surround_mode(), Some(SurroundMode::DolbyDigital));
    assert_eq!(receiver.channels().len(), 2);
    assert_eq!(receiver.channels()[&SurroundChannel::Subwoofer].level, 515);

    let events = feedback.drain();
    assert_eq!(events.first(), Some(&Feedback::Power(true)));
    assert!(events.contains(&Feedback::Volume {
        level: 455,
        normalized: (455 * 65535 / 800) as u16,
    }));
    assert!(!events.contains(&Feedback::Mute(false)));
    assert_eq!(
        events.iter().filter(|e| **e == Feedback::ChannelsChanged).count(),
        2
    );

    let json = receiver.state_snapshot().to_json().unwrap();
    assert_eq!(json["volumeLevel"], 455);
    assert_eq!(json["currentSurroundMode"], "DolbyDigital");
    receiver.shutdown();
}

#[tokio::test]
async fn lines_apply_in_arrival_order() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    let sender = receiver.line_sender();
    for level in ["10", "20", "30", "40", "505"] {
        sender.push(format!("MV{}", level)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(receiver.volume_level(), 505);
    receiver.shutdown();
}

#[tokio::test]
async fn garbage_is_dropped_without_side_effects() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    let mut feedback = receiver.subscribe();
    receive(&receiver, &["", "HELLO", "MVabc", "CVXYZ 50", "PWMAYBE"]).await;
    assert!(feedback.drain().is_empty());
    assert!(receiver.channels().is_empty());
    receiver.shutdown();
}

#[tokio::test]
async fn power_off_resets_the_model() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    receive(&receiver, &["PWON", "MV50", "MUON", "SICD", "MSSTEREO", "CVC 52"]).await;
    let mut feedback = receiver.subscribe();

    receive(&receiver, &["PWSTANDBY"]).await;
    assert!(!receiver.power_is_on());
    assert!(!receiver.mute_is_on());
    assert_eq!(receiver.volume_level(), 0);
    assert!(receiver.inputs().iter().all(|i| !i.is_selected));
    assert!(receiver.surround_modes().iter().all(|m| !m.is_selected));
    assert_eq!(receiver.channels()[&SurroundChannel::Center].level, 0);
    assert!(receiver.is_cooling_down());

    let events = feedback.drain();
    assert!(events.contains(&Feedback::Power(false)));
    assert!(events.contains(&Feedback::CoolingDown(true)));
    receiver.shutdown();
}

#[tokio::test]
async fn unknown_input_is_recorded_but_unknown_mode_clears() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    receive(&receiver, &["SICD", "MSSTEREO", "SIFUTURE", "MSSOMETHING NEW"]).await;

    assert_eq!(receiver.current_input().as_deref(), Some("FUTURE"));
    assert!(receiver.inputs().iter().any(|i| i.key == "CD" && i.is_selected));

    assert_eq!(receiver.current_surround_mode(), Some(SurroundMode::Unknown));
    assert!(receiver.surround_modes().iter().all(|m| !m.is_selected));
    receiver.shutdown();
}

#[tokio::test(start_paused = true)]
async fn held_volume_ramps_and_switches_direction() {
    let (receiver, wire) = setup(ReceiverConfig::default());
    receive(&receiver, &["MV50"]).await;
    wire.take();

    receiver.volume_up(true);
    receiver.volume_up(true);
    assert_eq!(receiver.volume_ramp_state(), RampState::RampingUp);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(wire.take(), vec!["MV505", "MV51", "MV515"]);

    receiver.volume_down(true);
    assert_eq!(receiver.volume_ramp_state(), RampState::RampingDown);
    tokio::time::sleep(Duration::from_millis(150)).await;
    receiver.volume_down(false);
    assert_eq!(receiver.volume_ramp_state(), RampState::Idle);

    // the confirmed level never moved, so the down ramp starts from it
    let down = wire.take();
    assert_eq!(down, vec!["MV495", "MV49"]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(wire.take().is_empty());
    receiver.shutdown();
}

#[tokio::test(start_paused = true)]
async fn whole_step_ramp_stops_at_learned_ceiling() {
    let config = ReceiverConfig {
        generation: Generation::WholeStep,
        ..ReceiverConfig::default()
    };
    let (receiver, wire) = setup(config);
    receive(&receiver, &["MVMAX 60", "MV58"]).await;
    wire.take();

    receiver.volume_up(true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(wire.take(), vec!["MV59", "MV60"]);
    receiver.volume_up(false);
    receiver.shutdown();
}

#[tokio::test(start_paused = true)]
async fn master_and_channel_ramps_run_independently() {
    let (receiver, wire) = setup(ReceiverConfig::default());
    receive(&receiver, &["MV50", "CVFL 50"]).await;
    wire.take();

    receiver.volume_up(true);
    receiver.channel_volume_down(SurroundChannel::FrontLeft, true).unwrap();
    assert_eq!(receiver.volume_ramp_state(), RampState::RampingUp);
    tokio::time::sleep(Duration::from_millis(250)).await;

    // releasing one leaves the other running
    receiver.volume_up(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    receiver.channel_volume_down(SurroundChannel::FrontLeft, false).unwrap();

    let sent = wire.take();
    let master: Vec<&str> = sent.iter().map(String::as_str).filter(|c| c.starts_with("MV")).collect();
    let channel: Vec<&str> = sent.iter().map(String::as_str).filter(|c| c.starts_with("CV")).collect();
    assert_eq!(master, vec!["MV505", "MV51", "MV515"]);
    assert_eq!(channel, vec!["CVFL 495", "CVFL 49", "CVFL 485", "CVFL 48"]);
    receiver.shutdown();
}

#[tokio::test(start_paused = true)]
async fn zone2_ramp_stops_at_zone_ceiling() {
    let config = ReceiverConfig::from_json(r#"{ "enableZone2": true }"#).unwrap();
    let (receiver, wire) = setup(config);
    receive(&receiver, &["Z2ON", "Z297"]).await;
    wire.take();

    let zone2 = receiver.zone2().unwrap();
    zone2.volume_up(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(wire.take(), vec!["Z2975", "Z298"]);

    zone2.volume_up(false);
    zone2.volume_down(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    zone2.volume_down(false);
    assert_eq!(wire.take(), vec!["Z2965", "Z296"]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(wire.take().is_empty());
    receiver.shutdown();
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_sending() {
    let (receiver, wire) = setup(ReceiverConfig::default());
    assert!(matches!(receiver.select_input("LASERDISC"), Err(AvrError::UnknownInput(_))));
    assert!(matches!(receiver.set_volume_level(453), Err(AvrError::InvalidStep { .. })));
    assert!(matches!(
        receiver.set_channel_volume(SurroundChannel::Unknown, 500),
        Err(AvrError::UnknownChannel(_))
    ));
    assert!(receiver.zone2().is_none());
    assert!(wire.commands().is_empty());
    receiver.shutdown();
}

#[tokio::test]
async fn channel_commands_use_wire_tokens() {
    let (receiver, wire) = setup(ReceiverConfig::default());
    receiver.set_channel_volume(SurroundChannel::FrontLeft, 500).unwrap();
    receiver.set_channel_volume(SurroundChannel::SurroundBackRight, 455).unwrap();
    receiver.set_channel_volume_normalized(SurroundChannel::Subwoofer, u16::MAX).unwrap();
    receiver.reset_channel_levels().unwrap();
    assert_eq!(wire.commands(), vec!["CVFL 50", "CVSBR 455", "CVSW 62", "CVZRL"]);
    receiver.shutdown();
}

#[tokio::test]
async fn zone2_lines_are_tracked_when_enabled() {
    let config = ReceiverConfig::from_json(r#"{ "enableZone2": true }"#).unwrap();
    let (receiver, _wire) = setup(config);
    let mut feedback = receiver.subscribe();

    receive(&receiver, &["Z2ON", "Z240", "Z2NET", "Z2MUON"]).await;
    let zone2 = receiver.zone2().unwrap();
    assert!(zone2.power_is_on());
    assert_eq!(zone2.volume_level(), 400);
    assert!(zone2.mute_is_on());
    assert_eq!(zone2.snapshot().current_input.as_deref(), Some("NET"));

    let events = feedback.drain();
    assert!(events.contains(&Feedback::Zone2(Zone2Feedback::Power(true))));
    assert!(!receiver.power_is_on());
    receiver.shutdown();
}

#[tokio::test]
async fn zone2_lines_are_ignored_when_disabled() {
    let (receiver, _wire) = setup(ReceiverConfig::default());
    let mut feedback = receiver.subscribe();
    receive(&receiver, &["Z2ON", "Z240"]).await;
    assert!(feedback.drain().is_empty());
    assert!(!receiver.state_snapshot().zone2.power_is_on);
    receiver.shutdown();
}

#[tokio::test(start_paused = true)]
async fn polling_follows_link_health() {
    let config = ReceiverConfig::from_json(r#"{ "pollIntervalMs": 1000, "pollStaggerMs": 10 }"#).unwrap();
    let (receiver, wire) = setup(config);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(wire.commands().is_empty());

    receiver.set_link_health(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(wire.take(), vec!["PW?", "MV?", "MU?", "SI?", "MS?", "CV?"]);

    receiver.set_link_health(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(wire.take().is_empty());
    receiver.shutdown();
}
