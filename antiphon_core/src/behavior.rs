//! What players do with what they hear.
//!
//! `hear` runs once per delivery. It feeds the recipient's evaluation
//! window and, when the window is full and the recipient is free, calls
//! `respond`, which turns the drained batch into a phrase and plays it
//! back to the ensemble with `broadcast_serial`.

use crate::event::{phrase_duration, MusicEvent, Voice};
use crate::kit::{Delivery, Kit};
use crate::player::Heard;
use crate::scheduler::Task;
use crate::tonality::tonality_diamond;
use antiphon_env::{PlayRequest, PlayerId};
use rand::seq::SliceRandom;
use tracing::{debug, info};

impl Kit {
    /// Delivers `event` to `recipient`.
    ///
    /// Returns `None` when the recipient has left the roster; the delivery
    /// is then a no-op.
    pub fn hear(&mut self, recipient: &PlayerId, event: &MusicEvent) -> Option<Delivery> {
        let now = self.now;
        let max_events = self.config.max_response_events;
        
        let Some(player) = self.roster.get_mut(recipient) else {
            debug!("Delivery to {} dropped: not on the roster", recipient);
            self.stats.dropped_deliveries += 1;
            return None;
        };
        let heard = player.listen(event, now, max_events);
        let selected = player.selected;
        let own_sample = player.sample_index;
        let busy_until = player.can_next_respond_at;
        let backlog = player.window_len();
        
        self.stats.deliveries += 1;
        self.stats.max_backlog = self.stats.max_backlog.max(backlog);
        debug!(
            "{} heard {} from {} ({})",
            recipient, event.pitch, event.sender_id, event.meta_message
        );
        
        let accumulated = !matches!(heard, Heard::OwnEvent);
        let mut responded = false;
        match heard {
            Heard::Ready(batch) => {
                responded = self.respond(recipient, batch) > 0;
            }
            Heard::Gated { backlog, dropped_oldest } => {
                self.stats.gated += 1;
                if dropped_oldest {
                    self.stats.backlog_dropped += 1;
                }
                debug!(
                    "{} busy until {:?}; holding {} events",
                    recipient, busy_until, backlog
                );
            }
            Heard::OwnEvent | Heard::Accumulated => {}
        }
        
        if selected {
            self.sound(event, own_sample);
        }
        
        let delivery = Delivery {
            at: now,
            sender: event.sender_id.clone(),
            recipient: recipient.clone(),
            pitch: event.pitch,
            meta_message: event.meta_message.clone(),
            accumulated,
            responded,
        };
        if self.config.record_journal {
            self.journal.push(delivery.clone());
        }
        Some(delivery)
    }
    
    /// Answers a batch of heard events.
    ///
    /// A strategy is chosen for the responder, applied to at most
    /// `max_response_events` of the batch, and the result is played back
    /// serially. The responder stays busy for the length of the phrase.
    /// Returns the number of events queued.
    pub fn respond(&mut self, responder: &PlayerId, mut events: Vec<MusicEvent>) -> usize {
        events.truncate(self.config.max_response_events);
        let Some(player) = self.roster.get(responder) else {
            return 0;
        };
        let voice = player.voice();
        let strategy = player.strategies.choose(&mut self.rng);
        
        let phrase = strategy.apply(&voice, &events, &mut self.rng);
        if phrase.is_empty() {
            return 0;
        }
        let length = phrase_duration(&phrase);
        
        let now = self.now;
        let gate = self
            .roster
            .get_mut(responder)
            .and_then(|p| p.occupy(now, length));
        if let Some(gate) = gate {
            self.queue.push(
                gate,
                Task::ReleaseGate {
                    player: responder.clone(),
                    gate,
                },
            );
        }
        
        self.stats.responses += 1;
        debug!(
            "{} responds with {} ({} events, {:?})",
            responder,
            strategy,
            phrase.len(),
            length
        );
        self.broadcast_serial(responder, phrase)
    }
    
    /// Plays an opening phrase from `starter`. Returns the number of
    /// events queued (0 if the starter is unknown).
    pub fn start(&mut self, starter: &PlayerId) -> usize {
        let Some(voice) = self.roster.get(starter).map(|p| p.voice()) else {
            return 0;
        };
        let phrase = self.opening_phrase(&voice);
        info!("{} opens with {} notes", starter, phrase.len());
        self.broadcast_serial(starter, phrase)
    }
    
    /// Draws an opening phrase: distinct pitches from the low end of the
    /// tonality diamond, in random order.
    pub fn opening_phrase(&mut self, voice: &Voice) -> Vec<MusicEvent> {
        let mut pitches = tonality_diamond(self.config.diamond_limit);
        pitches.truncate(self.config.phrase_pitch_pool);
        pitches.shuffle(&mut self.rng);
        pitches.truncate(self.config.phrase_length);
        
        let note_secs = self.config.phrase_note_secs;
        pitches
            .into_iter()
            .map(|pitch| {
                MusicEvent::new(voice.id.clone(), pitch, note_secs)
                    .with_meta("Start bar")
                    .with_pan(voice.pan)
                    .with_amp(voice.amp)
                    .with_sample_index(voice.sample_index)
            })
            .collect()
    }
    
    fn sound(&mut self, event: &MusicEvent, fallback_sample: usize) {
        if !self.audio_enabled {
            return;
        }
        let request = PlayRequest {
            pitch: event.pitch,
            pan: event.pan,
            amp: event.amp,
            sample_index: event.sample_index.unwrap_or(fallback_sample),
            duration: event.duration(),
            at: self.now,
        };
        self.stats.audio_triggers += 1;
        if let Err(e) = self.audio.trigger(&request) {
            self.stats.audio_failures += 1;
            self.reporter.report(&e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::KitConfig;
    use crate::record::{PlayerRecord, RecordPosition, UiState};
    use antiphon_env::{CollectingReporter, RecordingSink};
    use std::time::Duration;
    
    fn at(id: &str, x: f64, y: f64, window: f64) -> PlayerRecord {
        PlayerRecord {
            position: Some(RecordPosition { x, y }),
            evaluation_window_size_in_events: Some(window),
            ..PlayerRecord::with_id(id)
        }
    }
    
    fn note(sender: &str, pitch: f64) -> MusicEvent {
        MusicEvent::new(PlayerId::from(sender), pitch, 1.0)
    }
    
    #[test]
    fn test_own_event_never_triggers_response() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0, 1.0)]);
        let a = PlayerId::from("a");
        
        let delivery = kit.hear(&a, &note("a", 1.0)).unwrap();
        assert!(!delivery.accumulated);
        assert!(!delivery.responded);
        assert!(kit.is_idle());
    }
    
    #[test]
    fn test_threshold_triggers_single_response() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0, 1.0), at("b", 3.0, 4.0, 2.0)]);
        let b = PlayerId::from("b");
        
        assert!(!kit.hear(&b, &note("a", 1.0)).unwrap().responded);
        assert!(kit.is_idle());
        assert!(kit.hear(&b, &note("a", 1.5)).unwrap().responded);
        
        assert_eq!(kit.stats().responses, 1);
        assert_eq!(kit.player(&b).unwrap().window_len(), 0);
        // Two phrase broadcasts plus the gate release.
        assert_eq!(kit.pending_tasks().len(), 3);
    }
    
    #[test]
    fn test_busy_player_holds_events() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0, 1.0), at("b", 1.0, 0.0, 1.0)]);
        let b = PlayerId::from("b");
        
        assert!(kit.hear(&b, &note("a", 1.0)).unwrap().responded);
        let gate = kit.player(&b).unwrap().can_next_respond_at;
        assert_eq!(gate, Duration::from_secs(1));
        
        let second = kit.hear(&b, &note("a", 1.2)).unwrap();
        assert!(second.accumulated);
        assert!(!second.responded);
        assert_eq!(kit.stats().gated, 1);
        assert_eq!(kit.player(&b).unwrap().window_len(), 1);
    }
    
    #[test]
    fn test_response_uses_responder_voice() {
        let mut kit = Kit::new(KitConfig::default());
        let mut b = at("b", 0.0, 0.0, 1.0);
        b.pan = Some(-1.0);
        b.amp = Some(0.25);
        b.sample_index = Some(2.0);
        kit.update_roster(&[at("a", 0.0, 0.0, 1.0), b]);
        
        kit.hear(&PlayerId::from("b"), &note("a", 1.5));
        let phrase: Vec<MusicEvent> = kit
            .pending_tasks()
            .into_iter()
            .filter_map(|s| match s.task {
                Task::Broadcast { event, .. } => Some(event),
                _ => None,
            })
            .collect();
        
        assert_eq!(phrase.len(), 1);
        assert_eq!(phrase[0].sender_id, PlayerId::from("b"));
        assert_eq!(phrase[0].pitch, 1.5);
        assert_eq!(phrase[0].pan, -1.0);
        assert_eq!(phrase[0].amp, 0.25);
        assert_eq!(phrase[0].sample_index, Some(2));
    }
    
    #[test]
    fn test_response_is_capped() {
        let mut kit = Kit::new(KitConfig::default().with_max_response_events(2));
        kit.update_roster(&[at("b", 0.0, 0.0, 1.0)]);
        let b = PlayerId::from("b");
        
        let batch = (0..5).map(|i| note("a", 1.0 + i as f64)).collect();
        assert_eq!(kit.respond(&b, batch), 2);
        assert_eq!(kit.player(&b).unwrap().can_next_respond_at, Duration::from_secs(2));
    }
    
    #[test]
    fn test_selected_player_sounds_what_it_hears() {
        let sink = RecordingSink::new();
        let mut kit = Kit::new(KitConfig::default()).with_audio(sink.clone());
        kit.update_roster(&[
            PlayerRecord {
                ui_state: Some(UiState { selected: true }),
                sample_index: Some(3.0),
                ..at("a", 0.0, 0.0, 4.0)
            },
            at("b", 0.0, 0.0, 4.0),
        ]);
        
        kit.hear(&PlayerId::from("a"), &note("b", 1.25));
        kit.hear(&PlayerId::from("b"), &note("a", 1.25));
        
        let played = sink.played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].pitch, 1.25);
        // The event carries no sample, so the listener's own is used.
        assert_eq!(played[0].sample_index, 3);
    }
    
    #[test]
    fn test_audio_failure_is_reported() {
        struct BrokenSink;
        impl antiphon_env::AudioSink for BrokenSink {
            fn trigger(&mut self, _request: &PlayRequest) -> Result<(), antiphon_env::EnvError> {
                Err(antiphon_env::EnvError::audio("device unplugged"))
            }
        }
        
        let reporter = CollectingReporter::new();
        let mut kit = Kit::new(KitConfig::default())
            .with_audio(BrokenSink)
            .with_reporter(reporter.clone());
        kit.update_roster(&[PlayerRecord {
            ui_state: Some(UiState { selected: true }),
            ..at("a", 0.0, 0.0, 4.0)
        }]);
        
        assert!(kit.hear(&PlayerId::from("a"), &note("b", 1.0)).is_some());
        assert_eq!(kit.stats().audio_failures, 1);
        assert!(reporter.messages()[0].contains("device unplugged"));
    }
    
    #[test]
    fn test_opening_phrase_draws_distinct_diamond_pitches() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0, 1.0)]);
        let voice = kit.player(&PlayerId::from("a")).unwrap().voice();
        
        let phrase = kit.opening_phrase(&voice);
        let diamond = tonality_diamond(5);
        assert_eq!(phrase.len(), 4);
        for (i, event) in phrase.iter().enumerate() {
            assert!(diamond.contains(&event.pitch));
            assert_eq!(event.duration_secs, 2.0);
            assert_eq!(event.meta_message, "Start bar");
            assert!(phrase[i + 1..].iter().all(|other| other.pitch != event.pitch));
        }
    }
    
    #[test]
    fn test_start_from_unknown_player() {
        let mut kit = Kit::new(KitConfig::default());
        assert_eq!(kit.start(&PlayerId::from("ghost")), 0);
    }
}
