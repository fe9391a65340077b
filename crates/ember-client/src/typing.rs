//! Typing indicator coordination
//!
//! One marker per (room, user). The transition logic is a small pure state
//! machine; the coordinator executes its commands against the server and
//! owns the idle timer.
//!
//! Marker lifecycle: absent -> present on the first non-empty input,
//! timestamp refresh on each further keystroke, absent again when the
//! input empties, when the idle timer fires, or on detach.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiClient;

/// Default idle window after the last keystroke before the marker clears
pub const DEFAULT_IDLE: Duration = Duration::from_millis(1200);

/// Commands the state machine emits for the coordinator to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerCmd {
    /// Write/refresh the marker
    Upsert,
    /// Remove the marker (idempotent on the server)
    Delete,
    /// (Re)arm the idle timer
    ArmTimer,
    /// Cancel a pending idle timer
    CancelTimer,
}

/// Pure transition logic for one user's marker in one room
#[derive(Debug, Default)]
pub(crate) struct MarkerModel {
    present: bool,
}

impl MarkerModel {
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Input field changed
    pub fn on_input(&mut self, text: &str) -> Vec<MarkerCmd> {
        if text.trim().is_empty() {
            self.present = false;
            vec![MarkerCmd::CancelTimer, MarkerCmd::Delete]
        } else {
            self.present = true;
            vec![MarkerCmd::Upsert, MarkerCmd::ArmTimer]
        }
    }

    /// Idle timer elapsed without being re-armed
    pub fn on_idle(&mut self) -> Vec<MarkerCmd> {
        if self.present {
            self.present = false;
            vec![MarkerCmd::Delete]
        } else {
            Vec::new()
        }
    }

    /// View detaching from the room
    pub fn on_detach(&mut self) -> Vec<MarkerCmd> {
        self.present = false;
        vec![MarkerCmd::CancelTimer, MarkerCmd::Delete]
    }
}

/// Executes the marker state machine against the server.
///
/// Idle-expiry is enabled: a marker left behind by an abrupt network loss
/// would otherwise stay "typing" forever on other screens.
pub struct TypingCoordinator {
    api: Arc<ApiClient>,
    room_id: String,
    idle: Duration,
    model: Arc<Mutex<MarkerModel>>,
    timer: Option<JoinHandle<()>>,
    detached: bool,
}

impl TypingCoordinator {
    pub fn new(api: Arc<ApiClient>, room_id: impl Into<String>) -> Self {
        Self::with_idle(api, room_id, DEFAULT_IDLE)
    }

    pub fn with_idle(api: Arc<ApiClient>, room_id: impl Into<String>, idle: Duration) -> Self {
        Self {
            api,
            room_id: room_id.into(),
            idle,
            model: Arc::new(Mutex::new(MarkerModel::default())),
            timer: None,
            detached: false,
        }
    }

    /// Feed the current content of the input field after a keystroke
    pub async fn on_input(&mut self, text: &str) {
        if self.detached {
            return;
        }
        let cmds = self.model.lock().await.on_input(text);
        self.execute(cmds).await;
    }

    /// Unconditionally clear the marker and cancel timers. Runs exactly
    /// once even under rapid remount.
    pub async fn on_detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        let cmds = self.model.lock().await.on_detach();
        self.execute(cmds).await;
    }

    async fn execute(&mut self, cmds: Vec<MarkerCmd>) {
        for cmd in cmds {
            match cmd {
                MarkerCmd::Upsert => {
                    if let Err(e) = self.api.set_typing(&self.room_id).await {
                        warn!("typing marker write failed (not retried): {}", e);
                    }
                }
                MarkerCmd::Delete => {
                    if let Err(e) = self.api.clear_typing(&self.room_id).await {
                        debug!("typing marker clear failed: {}", e);
                    }
                }
                MarkerCmd::CancelTimer => {
                    if let Some(timer) = self.timer.take() {
                        timer.abort();
                    }
                }
                MarkerCmd::ArmTimer => {
                    if let Some(timer) = self.timer.take() {
                        timer.abort();
                    }

                    let api = self.api.clone();
                    let room_id = self.room_id.clone();
                    let model = self.model.clone();
                    let idle = self.idle;

                    self.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(idle).await;
                        let cmds = model.lock().await.on_idle();
                        if cmds.contains(&MarkerCmd::Delete) {
                            if let Err(e) = api.clear_typing(&room_id).await {
                                debug!("idle typing clear failed: {}", e);
                            }
                        }
                    }));
                }
            }
        }
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Render the "who is typing" banner from the visible marker set
/// (everyone but self, resolved to display names).
pub fn typing_banner(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing…", one)),
        many => Some(format!("{} are typing…", many.join(", "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Replays an input/idle timeline against the pure model and checks the
    // invariant: the marker is present iff the most recent input was
    // non-empty and the idle window has not elapsed since.
    #[derive(Debug, Clone, Copy)]
    enum Step {
        Input(&'static str),
        IdleElapsed,
        Detach,
    }

    fn expected_present(steps: &[Step]) -> bool {
        let mut present = false;
        for step in steps {
            match step {
                Step::Input(text) => present = !text.trim().is_empty(),
                Step::IdleElapsed | Step::Detach => present = false,
            }
        }
        present
    }

    fn run(steps: &[Step]) -> MarkerModel {
        let mut model = MarkerModel::default();
        for step in steps {
            match step {
                Step::Input(text) => {
                    model.on_input(text);
                }
                Step::IdleElapsed => {
                    model.on_idle();
                }
                Step::Detach => {
                    model.on_detach();
                }
            }
        }
        model
    }

    #[test]
    fn test_marker_present_iff_recent_nonempty_input() {
        let timelines: &[&[Step]] = &[
            &[Step::Input("h")],
            &[Step::Input("h"), Step::Input("he")],
            &[Step::Input("h"), Step::Input("")],
            &[Step::Input("h"), Step::IdleElapsed],
            &[Step::Input("h"), Step::IdleElapsed, Step::Input("i")],
            &[Step::Input("   ")],
            &[Step::Input("h"), Step::Detach],
            &[Step::Detach],
            &[Step::Input(""), Step::Input("x"), Step::Input(""), Step::IdleElapsed],
        ];

        for steps in timelines {
            let model = run(steps);
            assert_eq!(
                model.is_present(),
                expected_present(steps),
                "timeline {:?}",
                steps
            );
        }
    }

    #[test]
    fn test_first_keystroke_writes_and_arms() {
        let mut model = MarkerModel::default();
        let cmds = model.on_input("h");
        assert_eq!(cmds, vec![MarkerCmd::Upsert, MarkerCmd::ArmTimer]);
    }

    #[test]
    fn test_refresh_rearms_instead_of_stacking_timers() {
        let mut model = MarkerModel::default();
        model.on_input("h");
        let cmds = model.on_input("he");
        // Every keystroke re-arms; the executor replaces the pending timer
        assert_eq!(cmds, vec![MarkerCmd::Upsert, MarkerCmd::ArmTimer]);
    }

    #[test]
    fn test_empty_input_deletes_immediately() {
        let mut model = MarkerModel::default();
        model.on_input("h");
        let cmds = model.on_input("");
        assert_eq!(cmds, vec![MarkerCmd::CancelTimer, MarkerCmd::Delete]);
        assert!(!model.is_present());
    }

    #[test]
    fn test_idle_after_clear_is_a_noop() {
        let mut model = MarkerModel::default();
        model.on_input("h");
        model.on_input("");
        assert!(model.on_idle().is_empty());
    }

    #[test]
    fn test_detach_always_deletes() {
        let mut model = MarkerModel::default();
        let cmds = model.on_detach();
        assert_eq!(cmds, vec![MarkerCmd::CancelTimer, MarkerCmd::Delete]);
    }

    #[test]
    fn test_typing_banner_shapes() {
        assert_eq!(typing_banner(&[]), None);
        assert_eq!(
            typing_banner(&["Alice".to_string()]).unwrap(),
            "Alice is typing…"
        );
        assert_eq!(
            typing_banner(&["Alice".to_string(), "Bob".to_string()]).unwrap(),
            "Alice, Bob are typing…"
        );
    }
}
