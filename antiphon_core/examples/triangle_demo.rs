//! Triangle demo: three players, one opening phrase.
//!
//! A and C share a spot; B stands 5 units away. With 100 ms per unit,
//! B hears every note half a second after A and C.
//!
//! Run with: cargo run --example triangle_demo

use antiphon_core::{Kit, KitConfig, PlayerRecord, RecordPosition, UiState};
use std::time::Duration;

fn player(id: &str, x: f64, y: f64, selected: bool) -> PlayerRecord {
    PlayerRecord {
        position: Some(RecordPosition { x, y }),
        ui_state: Some(UiState { selected }),
        evaluation_window_size_in_events: Some(4.0),
        ..PlayerRecord::with_id(id)
    }
}

fn main() {
    println!("╔════════════════════════════════════════════╗");
    println!("║          ANTIPHON TRIANGLE DEMO            ║");
    println!("╚════════════════════════════════════════════╝\n");
    
    let mut kit = Kit::new(KitConfig::default().with_journal(true));
    kit.update_roster(&[
        player("a", 0.0, 0.0, true),
        player("b", 3.0, 4.0, false),
        player("c", 0.0, 0.0, false),
    ]);
    
    let Some(starter) = kit.play() else {
        println!("Nobody is selected.");
        return;
    };
    println!("{} opens; running 12 s of session time...\n", starter);
    kit.run_until(Duration::from_secs(12));
    
    println!("{:>8}  {:<6} {:<6} {:>7}  note", "time", "from", "to", "pitch");
    for delivery in kit.journal() {
        println!(
            "{:>7.3}s  {:<6} {:<6} {:>7.4}  {}{}",
            delivery.at.as_secs_f64(),
            delivery.sender.as_str(),
            delivery.recipient.as_str(),
            delivery.pitch,
            delivery.meta_message,
            if delivery.responded { "  -> answers" } else { "" }
        );
    }
    
    let stats = kit.stats();
    println!(
        "\n{} broadcasts, {} deliveries, {} responses",
        stats.broadcasts, stats.deliveries, stats.responses
    );
}
