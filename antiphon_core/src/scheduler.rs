//! Broadcast scheduling over a discrete-event task queue.
//!
//! Nothing is ever delivered by a direct call. Every delivery, every
//! phrase step and every busy-gate release is a [`Task`] stamped with the
//! absolute session time it fires at. The queue orders tasks by
//! `(time, insertion sequence)`, so two runs with the same seed and the
//! same board dispatch exactly the same tasks in exactly the same order.
//!
//! ```text
//!   broadcast_serial(A, [e0, e1, e2])
//!     t+0        Broadcast(A, e0)
//!     t+d0       Broadcast(A, e1)
//!     t+d0+d1    Broadcast(A, e2)
//!
//!   Broadcast(A, e) at t
//!     t          Deliver(A, e)            own copy, zero delay
//!     t+δ(A,B)   Deliver(B, e)            nearer players first
//!     t+δ(A,C)   Deliver(C, e)
//! ```

use crate::event::{serial_offsets, MusicEvent};
use crate::geometry::Position;
use crate::kit::Kit;
use antiphon_env::PlayerId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use tracing::debug;

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Send `event` from `sender` to the whole roster.
    ///
    /// `origin` is the sender's position when the task was queued, used if
    /// the sender has left the roster by the time the task fires.
    Broadcast {
        sender: PlayerId,
        origin: Position,
        event: MusicEvent,
    },
    
    /// Hand `event` to one recipient's `hear`
    Deliver {
        recipient: PlayerId,
        event: MusicEvent,
    },
    
    /// Re-open a busy-gate that was set to `gate`
    ReleaseGate {
        player: PlayerId,
        gate: Duration,
    },
}

/// A task with its firing time.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub at: Duration,
    seq: u64,
    pub task: Task,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Min-queue of tasks keyed by absolute time, FIFO among equal times.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Reverse<ScheduledTask>>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Queues `task` to fire at `at`.
    pub fn push(&mut self, at: Duration, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduledTask { at, seq, task }));
    }
    
    /// Removes and returns the earliest task.
    pub fn pop(&mut self) -> Option<ScheduledTask> {
        self.heap.pop().map(|Reverse(scheduled)| scheduled)
    }
    
    /// Firing time of the earliest task.
    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(scheduled)| scheduled.at)
    }
    
    pub fn len(&self) -> usize {
        self.heap.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
    
    /// Every pending task in firing order.
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.heap.iter().map(|Reverse(s)| s.clone()).collect();
        tasks.sort();
        tasks
    }
}

impl Kit {
    /// Sends `event` from `sender` to every roster member.
    ///
    /// The sender gets its own copy at zero delay; everyone else gets it
    /// after the propagation delay for their distance, nearest first.
    /// Returns the number of deliveries queued (0 if the sender is unknown).
    pub fn broadcast(&mut self, sender: &PlayerId, event: MusicEvent) -> usize {
        let Some(origin) = self.roster.get(sender).map(|p| p.position) else {
            debug!("Broadcast from {} ignored: not on the roster", sender);
            return 0;
        };
        self.broadcast_from(sender, origin, event)
    }
    
    /// Queues a phrase so its events go out back to back.
    ///
    /// Event `i` is broadcast at `now + sum(duration of events 0..i)`.
    /// Returns the number of broadcasts queued.
    pub fn broadcast_serial(&mut self, sender: &PlayerId, events: Vec<MusicEvent>) -> usize {
        let origin = self
            .roster
            .get(sender)
            .map(|p| p.position)
            .unwrap_or_default();
        let offsets = serial_offsets(&events);
        let count = events.len();
        
        for (offset, event) in offsets.into_iter().zip(events) {
            self.queue.push(
                self.now + offset,
                Task::Broadcast {
                    sender: sender.clone(),
                    origin,
                    event,
                },
            );
        }
        count
    }
    
    pub(crate) fn broadcast_from(&mut self, sender: &PlayerId, origin: Position, event: MusicEvent) -> usize {
        let origin = self
            .roster
            .get(sender)
            .map(|p| p.position)
            .unwrap_or(origin);
        let now = self.now;
        
        let mut others: Vec<(Duration, PlayerId)> = self
            .roster
            .iter()
            .filter(|p| &p.id != sender)
            .map(|p| (self.model.delay(&origin, &p.position), p.id.clone()))
            .collect();
        // Stable sort: equal distances keep roster order.
        others.sort_by_key(|(delay, _)| *delay);
        
        self.queue.push(
            now,
            Task::Deliver {
                recipient: sender.clone(),
                event: event.clone(),
            },
        );
        for (delay, recipient) in &others {
            self.queue.push(
                now + *delay,
                Task::Deliver {
                    recipient: recipient.clone(),
                    event: event.clone(),
                },
            );
        }
        
        self.stats.broadcasts += 1;
        debug!(
            "{} broadcast pitch {:.3} to {} listeners",
            sender,
            event.pitch,
            others.len()
        );
        others.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::KitConfig;
    use crate::record::{PlayerRecord, RecordPosition};
    
    fn at(id: &str, x: f64, y: f64) -> PlayerRecord {
        PlayerRecord {
            position: Some(RecordPosition { x, y }),
            ..PlayerRecord::with_id(id)
        }
    }
    
    fn deliveries(kit: &Kit) -> Vec<(Duration, String)> {
        kit.pending_tasks()
            .into_iter()
            .filter_map(|s| match s.task {
                Task::Deliver { recipient, .. } => Some((s.at, recipient.to_string())),
                _ => None,
            })
            .collect()
    }
    
    #[test]
    fn test_queue_orders_by_time_then_insertion() {
        let mut queue = TaskQueue::new();
        let gate = |n: u64| Task::ReleaseGate {
            player: PlayerId::from("p"),
            gate: Duration::from_secs(n),
        };
        queue.push(Duration::from_secs(2), gate(1));
        queue.push(Duration::from_secs(1), gate(2));
        queue.push(Duration::from_secs(2), gate(3));
        
        assert_eq!(queue.next_due(), Some(Duration::from_secs(1)));
        let order: Vec<Task> = std::iter::from_fn(|| queue.pop()).map(|s| s.task).collect();
        assert_eq!(order, vec![gate(2), gate(1), gate(3)]);
    }
    
    #[test]
    fn test_broadcast_orders_recipients_by_distance() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0), at("far", 0.0, 10.0), at("near", 1.0, 0.0)]);
        
        let a = PlayerId::from("a");
        let queued = kit.broadcast(&a, MusicEvent::new(a.clone(), 1.0, 1.0));
        
        assert_eq!(queued, 3);
        assert_eq!(
            deliveries(&kit),
            vec![
                (Duration::ZERO, "a".to_string()),
                (Duration::from_millis(100), "near".to_string()),
                (Duration::from_secs(1), "far".to_string()),
            ]
        );
    }
    
    #[test]
    fn test_broadcast_from_unknown_sender_is_ignored() {
        let mut kit = Kit::new(KitConfig::default());
        let ghost = PlayerId::from("ghost");
        assert_eq!(kit.broadcast(&ghost, MusicEvent::new(ghost.clone(), 1.0, 1.0)), 0);
        assert!(kit.pending_tasks().is_empty());
    }
    
    #[test]
    fn test_broadcast_serial_spaces_phrase() {
        let mut kit = Kit::new(KitConfig::default());
        kit.update_roster(&[at("a", 0.0, 0.0)]);
        let a = PlayerId::from("a");
        
        let phrase = vec![
            MusicEvent::new(a.clone(), 1.0, 0.5),
            MusicEvent::new(a.clone(), 1.2, 1.0),
            MusicEvent::new(a.clone(), 1.5, 2.0),
        ];
        assert_eq!(kit.broadcast_serial(&a, phrase), 3);
        
        let times: Vec<Duration> = kit.pending_tasks().into_iter().map(|s| s.at).collect();
        assert_eq!(
            times,
            vec![Duration::ZERO, Duration::from_millis(500), Duration::from_millis(1500)]
        );
    }
}
