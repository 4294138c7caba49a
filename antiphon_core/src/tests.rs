//! Whole-session behaviour: propagation, response and roster refresh
//! running together through the dispatcher.

use crate::*;
use antiphon_env::{AudioSink, CollectingReporter, EnvError, PlayRequest, PlayerId};
use approx::assert_relative_eq;
use proptest::prelude::*;
use std::time::Duration;

fn record(id: &str, x: f64, y: f64, window: f64) -> PlayerRecord {
    PlayerRecord {
        position: Some(RecordPosition { x, y }),
        evaluation_window_size_in_events: Some(window),
        ..PlayerRecord::with_id(id)
    }
}

fn journaled() -> Kit {
    Kit::new(KitConfig::default().with_journal(true))
}

fn arrivals(kit: &Kit, recipient: &str, sender: &str) -> Vec<Duration> {
    kit.journal()
        .iter()
        .filter(|d| d.recipient.as_str() == recipient && d.sender.as_str() == sender)
        .map(|d| d.at)
        .collect()
}

fn secs(values: &[f64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs_f64(*s)).collect()
}

struct BrokenSink;

impl AudioSink for BrokenSink {
    fn trigger(&mut self, _request: &PlayRequest) -> Result<(), EnvError> {
        Err(EnvError::audio("no output device"))
    }
}

// ============================================================================
// PROPAGATION
// ============================================================================

#[test]
fn test_opening_phrase_reaches_each_player_after_its_distance() {
    let mut kit = journaled();
    // Windows large enough that nobody answers.
    kit.update_roster(&[
        record("a", 0.0, 0.0, 100.0),
        record("b", 3.0, 4.0, 100.0),
        record("c", 0.0, 0.0, 100.0),
    ]);
    
    assert_eq!(kit.start(&PlayerId::from("a")), 4);
    kit.run_until(Duration::from_secs(10));
    
    assert_eq!(arrivals(&kit, "a", "a"), secs(&[0.0, 2.0, 4.0, 6.0]));
    assert_eq!(arrivals(&kit, "c", "a"), secs(&[0.0, 2.0, 4.0, 6.0]));
    assert_eq!(arrivals(&kit, "b", "a"), secs(&[0.5, 2.5, 4.5, 6.5]));
    assert_eq!(kit.stats().responses, 0);
}

#[test]
fn test_echo_travels_back_to_the_caller() {
    let mut kit = journaled();
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), record("b", 3.0, 4.0, 1.0)]);
    let a = PlayerId::from("a");
    
    kit.broadcast(&a, MusicEvent::new(a.clone(), 1.5, 1.0));
    kit.run_until(Duration::from_secs(2));
    
    // b hears at 0.5 s and echoes at once; a hears the echo 0.5 s later.
    let echoes: Vec<&Delivery> = kit
        .journal()
        .iter()
        .filter(|d| d.recipient == a && d.sender.as_str() == "b")
        .collect();
    assert_eq!(echoes.len(), 1);
    assert_eq!(echoes[0].at, Duration::from_secs(1));
    assert_relative_eq!(echoes[0].pitch, 1.5);
}

#[test]
fn test_harmonize_response_uses_fixed_ratios() {
    let mut kit = journaled();
    let mut b = record("b", 1.0, 0.0, 1.0);
    b.response_strategy_names = Some(vec!["harmonize".to_string()]);
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), b]);
    let a = PlayerId::from("a");
    
    kit.broadcast(&a, MusicEvent::new(a.clone(), 1.0, 1.0));
    kit.run_until(Duration::from_secs(1));
    
    let answer = kit
        .journal()
        .iter()
        .find(|d| d.recipient == a && d.sender.as_str() == "b")
        .map(|d| d.pitch)
        .unwrap();
    assert!(HARMONIZE_RATIOS.iter().any(|r| (answer - r).abs() < 1e-12));
}

#[test]
fn test_busy_gate_releases_after_phrase() {
    let mut kit = journaled();
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), record("b", 0.0, 0.0, 1.0)]);
    let a = PlayerId::from("a");
    let b = PlayerId::from("b");
    
    kit.broadcast_serial(
        &a,
        vec![
            MusicEvent::new(a.clone(), 1.0, 3.0),
            MusicEvent::new(a.clone(), 1.2, 3.0),
        ],
    );
    kit.run_until(Duration::from_secs(1));
    assert!(kit.player(&b).unwrap().is_busy(kit.now()));
    assert_eq!(kit.stats().responses, 1);
    
    // The second note arrives at 3 s, the moment the gate reopens.
    kit.run_until(Duration::from_secs(4));
    assert_eq!(kit.stats().gate_releases, 1);
    assert_eq!(kit.stats().responses, 2);
}

#[test]
fn test_vanished_recipient_is_skipped() {
    let mut kit = journaled();
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), record("b", 10.0, 0.0, 100.0)]);
    let a = PlayerId::from("a");
    let b = PlayerId::from("b");
    
    kit.broadcast(&a, MusicEvent::new(a.clone(), 1.0, 1.0));
    assert!(kit.remove_player(&b).is_some());
    
    let mut dropped = 0;
    while let Some(dispatch) = kit.step() {
        if let Dispatch::Dropped { recipient } = dispatch {
            assert_eq!(recipient, b);
            dropped += 1;
        }
    }
    assert_eq!(dropped, 1);
    assert_eq!(kit.stats().dropped_deliveries, 1);
    
    // A removed id cannot come back through a refresh.
    let report = kit.update_roster(&[record("b", 0.0, 0.0, 1.0)]);
    assert_eq!(report.rejected, vec![RosterError::UnknownPlayer(b)]);
}

#[test]
fn test_audio_failure_does_not_stop_propagation() {
    let reporter = CollectingReporter::new();
    let mut kit = Kit::new(KitConfig::default().with_journal(true))
        .with_audio(BrokenSink)
        .with_reporter(reporter.clone());
    kit.update_roster(&[
        PlayerRecord {
            ui_state: Some(UiState { selected: true }),
            ..record("a", 0.0, 0.0, 100.0)
        },
        record("b", 3.0, 4.0, 100.0),
    ]);
    
    assert_eq!(kit.play(), Some(PlayerId::from("a")));
    kit.run_until(Duration::from_secs(10));
    
    assert_eq!(arrivals(&kit, "b", "a").len(), 4);
    assert_eq!(kit.stats().audio_failures, 4);
    assert_eq!(reporter.messages().len(), 4);
}

#[test]
fn test_backlog_is_bounded_while_busy() {
    let mut kit = Kit::new(KitConfig::default().with_max_response_events(3));
    kit.update_roster(&[record("b", 0.0, 0.0, 2.0)]);
    let b = PlayerId::from("b");
    
    let note = |pitch: f64| MusicEvent::new(PlayerId::from("a"), pitch, 5.0);
    kit.hear(&b, &note(1.0));
    kit.hear(&b, &note(1.1));
    assert!(kit.player(&b).unwrap().is_busy(kit.now()));
    
    for i in 0..20 {
        kit.hear(&b, &note(2.0 + i as f64));
    }
    let player = kit.player(&b).unwrap();
    assert_eq!(player.window_len(), 3);
    let pitches: Vec<f64> = player.evaluation_window().map(|e| e.pitch).collect();
    assert_eq!(pitches, vec![19.0, 20.0, 21.0]);
    assert_eq!(kit.stats().backlog_dropped, 17);
}

// ============================================================================
// ROSTER REFRESH
// ============================================================================

#[test]
fn test_refresh_preserves_in_flight_state() {
    let mut kit = Kit::new(KitConfig::default());
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), record("b", 1.0, 0.0, 3.0)]);
    let b = PlayerId::from("b");
    
    kit.hear(&b, &MusicEvent::new(PlayerId::from("a"), 1.0, 1.0));
    kit.hear(&b, &MusicEvent::new(PlayerId::from("a"), 1.2, 1.0));
    let before = kit.player(&b).unwrap().incarnation();
    
    let report = kit.update_roster(&[record("b", 8.0, 8.0, 3.0)]);
    assert_eq!(report.updated, vec![b.clone()]);
    
    let player = kit.player(&b).unwrap();
    assert_eq!(player.incarnation(), before);
    assert_eq!(player.window_len(), 2);
    assert_eq!(player.position, Position::new(8.0, 8.0));
    
    // The third event still completes the original window.
    let delivery = kit.hear(&b, &MusicEvent::new(PlayerId::from("a"), 1.5, 1.0)).unwrap();
    assert!(delivery.responded);
}

#[test]
fn test_deliveries_follow_moved_players() {
    let mut kit = journaled();
    kit.update_roster(&[record("a", 0.0, 0.0, 100.0), record("b", 3.0, 4.0, 100.0)]);
    let a = PlayerId::from("a");
    
    kit.broadcast_serial(
        &a,
        vec![MusicEvent::new(a.clone(), 1.0, 1.0), MusicEvent::new(a.clone(), 1.0, 1.0)],
    );
    kit.run_until(Duration::from_millis(600));
    kit.move_player(&PlayerId::from("b"), Position::new(6.0, 8.0));
    kit.run_until(Duration::from_secs(5));
    
    // The second note leaves at 1 s and now travels 10 units.
    assert_eq!(arrivals(&kit, "b", "a"), secs(&[0.5, 2.0]));
}

// ============================================================================
// DETERMINISM & STATE
// ============================================================================

fn busy_session(seed: u64) -> Kit {
    let mut kit = Kit::new(KitConfig::default().with_seed(seed).with_journal(true));
    let mut records = vec![
        record("a", 0.0, 0.0, 1.0),
        record("b", 3.0, 4.0, 2.0),
        record("c", 6.0, 1.0, 1.0),
    ];
    for r in &mut records {
        r.response_strategy_names = Some(vec!["echo".to_string(), "harmonize".to_string()]);
    }
    kit.update_roster(&records);
    kit.start(&PlayerId::from("a"));
    kit.run_until(Duration::from_secs(30));
    kit
}

#[test]
fn test_same_seed_same_journal() {
    let first = busy_session(9);
    let second = busy_session(9);
    
    assert!(first.stats().responses > 0);
    assert_eq!(first.journal(), second.journal());
    assert_eq!(first.stats(), second.stats());
}

#[test]
fn test_session_state_round_trip() {
    let mut kit = Kit::new(KitConfig::default().with_seed(1234));
    kit.add_player().unwrap();
    let id = kit.add_player().unwrap();
    kit.select_player(&id);
    kit.move_player(&id, Position::new(-3.5, 12.0));
    
    let text = kit.session_state().to_json().unwrap();
    let state = SessionState::from_json(&text).unwrap();
    
    let mut restored = Kit::new(KitConfig::default());
    let report = restored.apply_state(&state);
    
    assert!(report.is_clean());
    assert_eq!(restored.seed(), 1234);
    assert_eq!(restored.roster().records(), kit.roster().records());
}

#[test]
fn test_state_from_outside_is_coerced() {
    let state = SessionState::from_json(
        r#"{
            "seed": "k3j9x2aa",
            "players": [
                { "id": "p1", "position": { "x": "4", "y": null }, "pan": "left",
                  "uiState": { "selected": "true" }, "responseStrategyName": "harmonize",
                  "evaluationWindowSizeInEvents": "0" }
            ]
        }"#,
    )
    .unwrap();
    
    let mut kit = Kit::new(KitConfig::default());
    assert!(kit.apply_state(&state).is_clean());
    assert_eq!(kit.seed(), seed_from_text("k3j9x2aa"));
    
    let player = kit.player(&PlayerId::from("p1")).unwrap();
    assert_eq!(player.position, Position::new(4.0, 0.0));
    assert_eq!(player.pan, 0.0);
    assert!(player.selected);
    assert_eq!(player.evaluation_window_size, 1);
    assert_eq!(player.strategies, StrategySelector::Fixed(ResponseStrategy::Harmonize));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_deliveries_are_ordered_by_distance(
        coords in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..12)
    ) {
        let mut kit = Kit::new(KitConfig::default());
        let mut records = vec![record("origin", 0.0, 0.0, 100.0)];
        for (i, (x, y)) in coords.iter().enumerate() {
            records.push(record(&format!("p{}", i), *x, *y, 100.0));
        }
        kit.update_roster(&records);
        let origin = PlayerId::from("origin");
        
        kit.broadcast(&origin, MusicEvent::new(origin.clone(), 1.0, 1.0));
        
        let mut last_distance = -1.0;
        for scheduled in kit.pending_tasks() {
            if let Task::Deliver { recipient, .. } = scheduled.task {
                let player = kit.player(&recipient).unwrap();
                let distance = player.position.distance(&Position::default());
                prop_assert!(distance >= last_distance - 1e-6);
                last_distance = distance;
                if recipient == origin {
                    prop_assert_eq!(scheduled.at, Duration::ZERO);
                }
            }
        }
    }
    
    #[test]
    fn prop_serial_offsets_are_prefix_sums(
        durations in prop::collection::vec(0.0f64..5.0, 0..10)
    ) {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[record("a", 0.0, 0.0, 100.0)]);
        let a = PlayerId::from("a");
        
        let phrase: Vec<MusicEvent> = durations
            .iter()
            .map(|d| MusicEvent::new(a.clone(), 1.0, *d))
            .collect();
        let expected = serial_offsets(&phrase);
        kit.broadcast_serial(&a, phrase);
        
        let times: Vec<Duration> = kit.pending_tasks().into_iter().map(|s| s.at).collect();
        prop_assert_eq!(times, expected);
    }
    
    #[test]
    fn prop_own_events_never_fill_the_window(pitches in prop::collection::vec(0.1f64..4.0, 1..20)) {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[record("a", 0.0, 0.0, 1.0)]);
        let a = PlayerId::from("a");
        
        for pitch in pitches {
            kit.hear(&a, &MusicEvent::new(a.clone(), pitch, 1.0));
        }
        prop_assert_eq!(kit.player(&a).unwrap().window_len(), 0);
        prop_assert_eq!(kit.stats().responses, 0);
    }
}
