//! Per-participant session actor.
//!
//! One OS thread per session drives everything through a single serialized
//! queue: sampler ticks, classification completions, inbound room events,
//! transport errors, and caller commands all land in the same loop, so the
//! label window, the debounce machine, and the roster are never touched by
//! two things at once.
//!
//! The classification round-trip runs on a dedicated worker thread and posts
//! its completion back into the queue stamped with the session epoch; a
//! completion that arrives after teardown (or for an earlier life of the
//! session) fails the epoch check and mutates nothing.

use crate::camera::FrameSource;
use crate::channel::{ChannelError, PresenceChannel, PresenceIntent, RoomEvent, RoomMember};
use crate::classify::{Classifier, ClassifierError, Label};
use crate::config::Config;
use crate::core::{DebounceMachine, RosterView, StabilityFilter};
use crate::stats::{SessionStats, SharedSessionStats};
use chrono::Utc;
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Loop wakeup granularity; bounds how late a debounce deadline can fire.
const POLL_GRANULARITY: Duration = Duration::from_millis(50);

/// What a session reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The stable expression changed.
    StableChanged(Label),
    /// This participant's sustained distress was reported to the room.
    TroubleReported,
    /// This participant's trouble flag was explicitly cleared.
    TroubleResolved,
    /// A member of the room (possibly this one) was flagged as troubled.
    MemberTroubled(String),
    /// A member's trouble flag was cleared.
    MemberResolved(String),
    /// The membership view was replaced by a fresh snapshot.
    RosterUpdated(Vec<RoomMember>),
    /// The transport dropped; the roster is stale until the next snapshot.
    ChannelDown(String),
}

/// Commands a caller can post into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Clear an outstanding trouble report.
    Resolve,
    /// Tear the session down.
    Shutdown,
}

enum SessionMsg {
    Classified {
        epoch: u64,
        result: Result<Label, ClassifierError>,
    },
    Command(SessionCommand),
}

/// Handle onto a running session.
///
/// Dropping the handle tears the session down: the pending debounce window
/// is cancelled, the channel disconnects, and the workers are joined.
pub struct SessionHandle {
    queue_tx: Sender<SessionMsg>,
    notices_rx: Receiver<SessionNotice>,
    stats: SharedSessionStats,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Request explicit resolution of an outstanding trouble report.
    pub fn resolve(&self) {
        let _ = self
            .queue_tx
            .send(SessionMsg::Command(SessionCommand::Resolve));
    }

    /// Notices emitted by the session, in order.
    pub fn notices(&self) -> Receiver<SessionNotice> {
        self.notices_rx.clone()
    }

    /// Session activity counters.
    pub fn stats(&self) -> SharedSessionStats {
        self.stats.clone()
    }

    /// Tear the session down and wait for it to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self
                .queue_tx
                .send(SessionMsg::Command(SessionCommand::Shutdown));
            let _ = thread.join();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a session for `user` and return its handle.
///
/// The channel is expected to be freshly connected; the session owns it from
/// here on and disconnects it on teardown.
pub fn spawn(
    user: impl Into<String>,
    config: Config,
    classifier: Box<dyn Classifier>,
    frames: Box<dyn FrameSource>,
    channel: Box<dyn PresenceChannel>,
) -> SessionHandle {
    let user = user.into();
    let (queue_tx, queue_rx) = unbounded();
    let (notices_tx, notices_rx) = unbounded();
    let stats: SharedSessionStats = Arc::new(SessionStats::new());

    let filter = StabilityFilter::new(config.window_capacity);
    let machine = DebounceMachine::new(config.confirm_after);
    let session = Session {
        user: user.clone(),
        config,
        frames,
        channel,
        filter,
        machine,
        roster: RosterView::new(),
        last_stable: None,
        epoch: 0,
        queue_tx: queue_tx.clone(),
        notices_tx,
        stats: stats.clone(),
    };

    let thread = std::thread::Builder::new()
        .name(format!("session-{user}"))
        .spawn(move || session.run(queue_rx, classifier))
        .expect("spawn session thread");

    SessionHandle {
        queue_tx,
        notices_rx,
        stats,
        thread: Some(thread),
    }
}

struct Session {
    user: String,
    config: Config,
    frames: Box<dyn FrameSource>,
    channel: Box<dyn PresenceChannel>,
    filter: StabilityFilter,
    machine: DebounceMachine,
    roster: RosterView,
    last_stable: Option<Label>,
    epoch: u64,
    queue_tx: Sender<SessionMsg>,
    notices_tx: Sender<SessionNotice>,
    stats: SharedSessionStats,
}

impl Session {
    fn run(mut self, queue_rx: Receiver<SessionMsg>, classifier: Box<dyn Classifier>) {
        let (jobs_tx, jobs_rx) = unbounded::<(u64, Vec<u8>)>();
        let worker = spawn_classify_worker(jobs_rx, self.queue_tx.clone(), classifier);

        let sampler = tick(self.config.sample_period);
        let events_rx = self.channel.events();
        let errors_rx = self.channel.errors();

        tracing::info!(user = %self.user, "session started");

        loop {
            select! {
                recv(sampler) -> _ => self.handle_tick(&jobs_tx),
                recv(queue_rx) -> msg => match msg {
                    Ok(SessionMsg::Classified { epoch, result }) => {
                        self.handle_classified(epoch, result);
                    }
                    Ok(SessionMsg::Command(SessionCommand::Resolve)) => self.handle_resolve(),
                    // Shutdown command, or every handle is gone.
                    Ok(SessionMsg::Command(SessionCommand::Shutdown)) | Err(_) => break,
                },
                recv(events_rx) -> event => match event {
                    Ok(event) => self.handle_room_event(event),
                    Err(_) => break, // channel torn down under us
                },
                recv(errors_rx) -> error => match error {
                    Ok(error) => self.handle_channel_error(error),
                    Err(_) => break,
                },
                default(POLL_GRANULARITY) => {}
            }

            // Whatever woke the loop, the confirmation window may have
            // elapsed in the meantime.
            if let Some(intent) = self.machine.tick(Utc::now()) {
                self.dispatch_intent(intent);
            }
        }

        self.teardown(jobs_tx, worker);
    }

    fn handle_tick(&mut self, jobs_tx: &Sender<(u64, Vec<u8>)>) {
        let Some(frame) = self.frames.grab() else {
            // No frame ready: a skip, not an error.
            self.stats.record_tick_skipped();
            return;
        };
        self.stats.record_frame_sampled();
        // Ticks overlap-skip: a slow round-trip queues behind the next one
        // rather than suppressing it.
        if jobs_tx.send((self.epoch, frame)).is_err() {
            tracing::warn!(user = %self.user, "classification worker is gone");
        }
    }

    fn handle_classified(&mut self, epoch: u64, result: Result<Label, ClassifierError>) {
        if epoch != self.epoch {
            tracing::debug!(user = %self.user, "ignoring stale classification completion");
            return;
        }
        let label = match result {
            Ok(label) => label,
            Err(e) => {
                // "No update this tick": the window does not advance.
                tracing::warn!(user = %self.user, "classification failed: {e}");
                self.stats.record_classify_failure();
                return;
            }
        };

        let stable = self.filter.append(label);
        self.stats.record_label_applied();

        if self.last_stable.as_ref() != Some(&stable) {
            self.last_stable = Some(stable.clone());
            let _ = self
                .notices_tx
                .send(SessionNotice::StableChanged(stable.clone()));
        }

        let distress = self.config.is_distress(stable.as_str());
        self.machine.observe(distress, Utc::now());
    }

    fn handle_resolve(&mut self) {
        if let Some(intent) = self.machine.resolve() {
            self.dispatch_intent(intent);
        }
        // Resolving while not troubled is a no-op, not an error.
    }

    fn handle_room_event(&mut self, event: RoomEvent) {
        self.stats.record_event_received();
        match event {
            RoomEvent::Ping => {} // transport keepalive, never surfaced
            RoomEvent::Members { .. } => {
                if self.roster.apply(&event) {
                    let _ = self
                        .notices_tx
                        .send(SessionNotice::RosterUpdated(self.roster.members().to_vec()));
                }
            }
            RoomEvent::Join { user } => {
                tracing::info!(room_member = %user, "joined the room");
            }
            RoomEvent::Leave { user } => {
                tracing::info!(room_member = %user, "left the room");
            }
            RoomEvent::Trouble { user } => {
                let _ = self.notices_tx.send(SessionNotice::MemberTroubled(user));
            }
            RoomEvent::Resolved { user } => {
                let _ = self.notices_tx.send(SessionNotice::MemberResolved(user));
            }
        }
    }

    fn handle_channel_error(&mut self, error: ChannelError) {
        tracing::warn!(user = %self.user, "presence channel failure: {error}");
        self.roster.mark_stale();
        let _ = self
            .notices_tx
            .send(SessionNotice::ChannelDown(error.to_string()));
    }

    fn dispatch_intent(&mut self, intent: PresenceIntent) {
        match self.channel.send(intent) {
            Ok(()) => {
                self.stats.record_intent_sent();
                let notice = match intent {
                    PresenceIntent::Trouble => SessionNotice::TroubleReported,
                    PresenceIntent::Resolved => SessionNotice::TroubleResolved,
                };
                let _ = self.notices_tx.send(notice);
            }
            Err(e) => {
                // Transient delivery failure; the machine state stands and
                // the transport reports its own errors.
                tracing::warn!(user = %self.user, ?intent, "intent send failed: {e}");
            }
        }
    }

    fn teardown(mut self, jobs_tx: Sender<(u64, Vec<u8>)>, worker: JoinHandle<()>) {
        // Invalidate in-flight completions, cancel the pending window, then
        // release the conduit. Order matters: nothing may fire after this.
        self.epoch += 1;
        self.machine.reset();
        self.channel.disconnect();
        drop(jobs_tx);
        let _ = worker.join();
        tracing::info!(user = %self.user, "session ended");
    }
}

fn spawn_classify_worker(
    jobs_rx: Receiver<(u64, Vec<u8>)>,
    queue_tx: Sender<SessionMsg>,
    mut classifier: Box<dyn Classifier>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("classify-worker".to_string())
        .spawn(move || {
            while let Ok((epoch, frame)) = jobs_rx.recv() {
                let result = classifier.classify(&frame);
                if queue_tx.send(SessionMsg::Classified { epoch, result }).is_err() {
                    return;
                }
            }
        })
        .expect("spawn classification worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryBus;
    use crate::classify::ScriptedClassifier;

    struct StubFrames;

    impl FrameSource for StubFrames {
        fn grab(&mut self) -> Option<Vec<u8>> {
            Some(vec![0xff, 0xd8])
        }
    }

    fn fast_config(confirm_ms: u64) -> Config {
        Config {
            window_capacity: 1,
            confirm_after: Duration::from_millis(confirm_ms),
            sample_period: Duration::from_millis(30),
            ..Config::default()
        }
    }

    fn collect_for(rx: &Receiver<SessionNotice>, window: Duration) -> Vec<SessionNotice> {
        let deadline = std::time::Instant::now() + window;
        let mut notices = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            match rx.recv_timeout(remaining) {
                Ok(notice) => notices.push(notice),
                Err(_) => break,
            }
        }
        notices
    }

    #[test]
    fn test_sustained_distress_reports_once() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        let handle = spawn(
            "aki",
            fast_config(200),
            Box::new(ScriptedClassifier::holding(["sad"])),
            Box::new(StubFrames),
            Box::new(channel),
        );

        let notices = collect_for(&handle.notices(), Duration::from_millis(900));
        let reports = notices
            .iter()
            .filter(|n| **n == SessionNotice::TroubleReported)
            .count();
        assert_eq!(reports, 1, "latched: exactly one report, got {notices:?}");
        assert!(bus.members("r1")[0].troubled);

        handle.shutdown();
    }

    #[test]
    fn test_flicker_never_reports() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        // One distress tick, then back to neutral well before confirmation.
        let mut script = ScriptedClassifier::holding(["sad", "neutral"]);
        script.push_label("neutral");

        let handle = spawn(
            "aki",
            fast_config(600),
            Box::new(script),
            Box::new(StubFrames),
            Box::new(channel),
        );

        let notices = collect_for(&handle.notices(), Duration::from_millis(1000));
        assert!(
            !notices.contains(&SessionNotice::TroubleReported),
            "transient dip must not fire: {notices:?}"
        );
        assert!(!bus.members("r1")[0].troubled);

        handle.shutdown();
    }

    #[test]
    fn test_resolve_clears_and_is_idempotent() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        // Fear long enough to confirm, then neutral so resolution sticks:
        // persisting distress after a resolve legitimately starts a fresh
        // episode, which is not what this test is about.
        let script =
            ScriptedClassifier::holding(["fear", "fear", "fear", "fear", "fear", "fear", "fear", "fear", "neutral"]);

        let handle = spawn(
            "aki",
            fast_config(150),
            Box::new(script),
            Box::new(StubFrames),
            Box::new(channel),
        );

        // Wait for the report, then resolve twice.
        let notices = collect_for(&handle.notices(), Duration::from_millis(700));
        assert!(notices.contains(&SessionNotice::TroubleReported));

        handle.resolve();
        handle.resolve();

        let notices = collect_for(&handle.notices(), Duration::from_millis(400));
        let resolutions = notices
            .iter()
            .filter(|n| **n == SessionNotice::TroubleResolved)
            .count();
        assert_eq!(resolutions, 1, "second resolve is a no-op: {notices:?}");
        assert!(!bus.members("r1")[0].troubled);

        handle.shutdown();
    }

    #[test]
    fn test_classifier_failures_are_skips() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        // Script is immediately exhausted: every tick fails.
        let handle = spawn(
            "aki",
            fast_config(100),
            Box::new(ScriptedClassifier::new(Vec::<Label>::new())),
            Box::new(StubFrames),
            Box::new(channel),
        );

        let notices = collect_for(&handle.notices(), Duration::from_millis(400));
        assert!(!notices.iter().any(|n| matches!(n, SessionNotice::StableChanged(_))));
        assert!(handle.stats().snapshot().classify_failures > 0);

        handle.shutdown();
    }

    #[test]
    fn test_teardown_while_pending_emits_nothing() {
        let bus = MemoryBus::new();
        let observer = bus.connect("r1", "observer");
        let channel = bus.connect("r1", "aki");

        let handle = spawn(
            "aki",
            fast_config(10_000), // window far longer than the test
            Box::new(ScriptedClassifier::holding(["sad"])),
            Box::new(StubFrames),
            Box::new(channel),
        );

        std::thread::sleep(Duration::from_millis(300));
        handle.shutdown();
        std::thread::sleep(Duration::from_millis(100));

        let observer_rx = observer.events();
        let mut saw_trouble = false;
        while let Ok(event) = observer_rx.try_recv() {
            if matches!(event, RoomEvent::Trouble { .. }) {
                saw_trouble = true;
            }
        }
        assert!(!saw_trouble, "pending window must be cancelled on teardown");
    }

    #[test]
    fn test_roster_follows_snapshots() {
        let bus = MemoryBus::new();
        let channel = bus.connect("r1", "aki");

        let handle = spawn(
            "aki",
            fast_config(5_000),
            Box::new(ScriptedClassifier::holding(["neutral"])),
            Box::new(StubFrames),
            Box::new(channel),
        );

        let _ben = bus.connect("r1", "ben");

        let notices = collect_for(&handle.notices(), Duration::from_millis(400));
        let roster = notices
            .iter()
            .rev()
            .find_map(|n| match n {
                SessionNotice::RosterUpdated(members) => Some(members.clone()),
                _ => None,
            })
            .expect("roster update after peer join");
        assert!(roster.iter().any(|m| m.user == "ben"));

        handle.shutdown();
    }
}
