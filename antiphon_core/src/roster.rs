//! Player lifecycle: admission, in-place merge and removal.
//!
//! Players are merged by id, never replaced. A refresh of external state
//! therefore leaves in-flight state (the evaluation window, a running
//! busy-gate, queued deliveries addressed by id) valid.

use crate::error::RosterError;
use crate::player::Player;
use crate::record::PlayerRecord;
use antiphon_env::PlayerId;
use std::collections::HashSet;
use tracing::{debug, info};

/// Outcome of merging a batch of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Ids of players built from the batch
    pub added: Vec<PlayerId>,
    
    /// Ids of existing players updated in place
    pub updated: Vec<PlayerId>,
    
    /// Records that were skipped, with the reason
    pub rejected: Vec<RosterError>,
}

impl MergeReport {
    /// True when every record was applied.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Notified when the roster changes in a way worth persisting
/// (a player was added or moved, or the selection changed).
pub trait RosterNotifier: Send {
    fn roster_changed(&mut self, records: &[PlayerRecord]);
}

/// Notifier that ignores every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl RosterNotifier for NoopNotifier {
    fn roster_changed(&mut self, _records: &[PlayerRecord]) {}
}

/// The ordered set of players in a session.
#[derive(Debug, Default)]
pub struct Roster {
    /// Players in admission order
    players: Vec<Player>,
    
    /// Ids that were removed; records naming them are rejected
    retired: HashSet<PlayerId>,
    
    /// Incarnation handed to the next admitted player
    next_incarnation: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn len(&self) -> usize {
        self.players.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
    
    /// Players in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }
    
    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }
    
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }
    
    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }
    
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.get(id).is_some()
    }
    
    /// True if the id belonged to a player that has been removed.
    pub fn is_retired(&self, id: &PlayerId) -> bool {
        self.retired.contains(id)
    }
    
    /// The first selected player, if any.
    pub fn selected(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.selected)
    }
    
    /// Selects exactly one player, deselecting the rest.
    ///
    /// Returns false (and changes nothing) if the id is not on the roster.
    pub fn select_only(&mut self, id: &PlayerId) -> bool {
        if !self.contains(id) {
            return false;
        }
        for player in &mut self.players {
            player.selected = &player.id == id;
        }
        true
    }
    
    /// Builds a brand-new player from a record and appends it.
    pub fn admit(&mut self, record: &PlayerRecord) -> Result<PlayerId, RosterError> {
        let id = PlayerId::new(record.id.clone());
        if self.contains(&id) || self.is_retired(&id) {
            return Err(RosterError::UnknownPlayer(id));
        }
        let player = Player::from_record(record, self.next_incarnation)?;
        self.next_incarnation += 1;
        
        info!("Player {} joined the roster", player.id);
        self.players.push(player);
        Ok(id)
    }
    
    /// Merges external records into the roster.
    ///
    /// - unknown id: a new player is built and appended
    /// - known id: the existing player is updated in place
    /// - removed id or empty id: rejected, roster unchanged for that record
    ///
    /// A rejected record never stops the rest of the batch.
    pub fn merge(&mut self, records: &[PlayerRecord]) -> MergeReport {
        let mut report = MergeReport::default();
        
        for record in records {
            if record.id.is_empty() {
                report.rejected.push(RosterError::MissingId);
                continue;
            }
            let id = PlayerId::new(record.id.clone());
            
            if let Some(existing) = self.get_mut(&id) {
                match existing.apply_record(record) {
                    Ok(()) => {
                        debug!("Player {} updated in place", id);
                        report.updated.push(id);
                    }
                    Err(e) => report.rejected.push(e),
                }
            } else if self.is_retired(&id) {
                report.rejected.push(RosterError::UnknownPlayer(id));
            } else {
                match self.admit(record) {
                    Ok(id) => report.added.push(id),
                    Err(e) => report.rejected.push(e),
                }
            }
        }
        
        report
    }
    
    /// Takes a player off the roster. Deliveries already queued for it
    /// become no-ops; records naming it are rejected from now on.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| &p.id == id)?;
        let player = self.players.remove(index);
        self.retired.insert(id.clone());
        info!("Player {} left the roster", id);
        Some(player)
    }
    
    /// Every player in record form, in roster order.
    pub fn records(&self) -> Vec<PlayerRecord> {
        self.players.iter().map(Player::to_record).collect()
    }
}
