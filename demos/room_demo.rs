//! Demonstration of a two-participant room on the in-process bus.
//!
//! This example shows how to:
//! 1. Create a shared memory bus
//! 2. Join two participants to the same room
//! 3. Script one participant into sustained distress
//! 4. Watch the trouble report and its resolution from the other side
//!
//! Run with: cargo run --example room_demo

use std::time::Duration;
use troublewatch::{
    camera::FrameSource,
    channel::{MemoryBus, PresenceChannel, RoomEvent},
    classify::ScriptedClassifier,
    config::Config,
    session,
};

/// Stand-in frame source: the scripted classifier ignores the pixels.
struct DemoFrames;

impl FrameSource for DemoFrames {
    fn grab(&mut self) -> Option<Vec<u8>> {
        Some(vec![0xff, 0xd8, 0xff])
    }
}

fn main() {
    println!("Troublewatch - Room Demo");
    println!("========================");
    println!();

    let bus = MemoryBus::new();

    // Ben just watches.
    let ben = bus.connect("demo", "ben");
    let ben_events = ben.events();

    // Aki's feed is scripted: neutral at first, then sustained sadness.
    let script = ScriptedClassifier::holding(["neutral", "neutral", "sad"]);

    let config = Config {
        window_capacity: 1,
        confirm_after: Duration::from_millis(500),
        sample_period: Duration::from_millis(100),
        ..Config::default()
    };

    println!("Aki joins room 'demo' and starts looking sad...");
    println!();

    let aki = session::spawn(
        "aki",
        config,
        Box::new(script),
        Box::new(DemoFrames),
        Box::new(bus.connect("demo", "aki")),
    );

    // Watch the room from Ben's side until the report lands.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut reported = false;
    while std::time::Instant::now() < deadline && !reported {
        if let Ok(event) = ben_events.recv_timeout(Duration::from_millis(200)) {
            print_event(&event);
            reported = matches!(&event, RoomEvent::Trouble { .. });
        }
    }

    if !reported {
        eprintln!("No trouble report arrived; something is off.");
        return;
    }

    println!();
    println!("Aki clicks resolve...");
    println!();
    aki.resolve();

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    let mut resolved = false;
    while std::time::Instant::now() < deadline && !resolved {
        if let Ok(event) = ben_events.recv_timeout(Duration::from_millis(200)) {
            print_event(&event);
            resolved = matches!(&event, RoomEvent::Resolved { .. });
        }
    }

    println!();
    println!("Aki leaves the room.");
    let stats = aki.stats();
    aki.shutdown();

    println!();
    println!("{}", stats.summary());
}

fn print_event(event: &RoomEvent) {
    match event {
        RoomEvent::Members { users } => {
            let listing: Vec<String> = users
                .iter()
                .map(|m| {
                    if m.troubled {
                        format!("{}(troubled)", m.user)
                    } else {
                        m.user.clone()
                    }
                })
                .collect();
            println!("[ben sees] members: {}", listing.join(", "));
        }
        RoomEvent::Join { user } => println!("[ben sees] {user} joined"),
        RoomEvent::Leave { user } => println!("[ben sees] {user} left"),
        RoomEvent::Trouble { user } => println!("[ben sees] ⚠ {user} is troubled!"),
        RoomEvent::Resolved { user } => println!("[ben sees] {user} resolved their trouble"),
        RoomEvent::Ping => {}
    }
}
