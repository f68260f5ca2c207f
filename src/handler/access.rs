/* Access event handler: credential entry at a door terminal. */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::authenticator::Authenticator;
use crate::doorbell::DoorbellUi;
use crate::physical::PhysicalActions;
use crate::target::Target;
use crate::terminal::protocol::{is_code_char, Tone};
use crate::terminal::TerminalIo;

use super::EventHandler;

const IDLE_PROMPT: &str = "Enter code";
const COLLECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESULT_DISPLAY: Duration = Duration::from_secs(2);
const RFID_DEBOUNCE: Duration = Duration::from_secs(2);
const GRANT_BUZZ_MS: u32 = 150;
const DENY_BUZZ_MS: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Collecting,
    Granted,
    Denied,
}

pub struct AccessHandler {
    target: Target,
    authenticator: Arc<Authenticator>,
    physical: Arc<dyn PhysicalActions>,
    doorbell: DoorbellUi,
    state: State,
    buffer: String,
    deadline: Option<Instant>,
    last_rfid: Option<(String, Instant)>,
}

impl AccessHandler {
    pub fn new(
        target: Target,
        authenticator: Arc<Authenticator>,
        physical: Arc<dyn PhysicalActions>,
        doorbell: DoorbellUi,
    ) -> Self {
        Self {
            target,
            authenticator,
            physical,
            doorbell,
            state: State::Idle,
            buffer: String::new(),
            deadline: None,
            last_rfid: None,
        }
    }

    async fn enter_idle(&mut self, terminal: &mut dyn TerminalIo) {
        self.state = State::Idle;
        self.buffer.clear();
        self.deadline = None;
        let _ = terminal.set_leds("B").await;
        let _ = terminal.write_lcd(0, IDLE_PROMPT).await;
        let _ = terminal.write_lcd(1, "").await;
    }

    async fn evaluate(&mut self, terminal: &mut dyn TerminalIo, code: &str) {
        let (allowed, reason) = self.authenticator.auth_user(code, self.target).await;
        debug!(target = %self.target, allowed, "access evaluated");

        if allowed {
            self.state = State::Granted;
            self.deadline = Some(Instant::now() + RESULT_DISPLAY);
            let _ = terminal.set_leds("G").await;
            let _ = terminal.buzz(Tone::High, GRANT_BUZZ_MS).await;
            self.physical.open_door(self.target).await;
            let _ = terminal.write_lcd(0, "Welcome").await;
        } else {
            self.state = State::Denied;
            self.deadline = Some(Instant::now() + RESULT_DISPLAY);
            let _ = terminal.set_leds("R").await;
            let _ = terminal.buzz(Tone::Low, DENY_BUZZ_MS).await;
            let _ = terminal.write_lcd(0, &reason).await;

            if reason.contains("outside daytime") {
                self.doorbell.handle_doorbell(self.target, &reason).await;
            }
        }
        self.buffer.clear();
    }
}

#[async_trait]
impl EventHandler for AccessHandler {
    async fn on_activate(&mut self, terminal: &mut dyn TerminalIo) {
        self.enter_idle(terminal).await;
    }

    async fn handle_key(&mut self, terminal: &mut dyn TerminalIo, c: char) {
        if !is_code_char(c) {
            return;
        }
        if !matches!(self.state, State::Idle | State::Collecting) {
            return;
        }

        match c {
            '#' => {
                let code = self.buffer.clone();
                if code.is_empty() {
                    self.enter_idle(terminal).await;
                } else {
                    self.evaluate(terminal, &code).await;
                }
            }
            '*' => {
                self.enter_idle(terminal).await;
            }
            digit => {
                self.buffer.push(digit);
                self.state = State::Collecting;
                self.deadline = Some(Instant::now() + COLLECT_TIMEOUT);
            }
        }
    }

    async fn handle_rfid(&mut self, terminal: &mut dyn TerminalIo, id: String) {
        if !matches!(self.state, State::Idle | State::Collecting) {
            return;
        }
        let now = Instant::now();
        if let Some((last_id, last_at)) = &self.last_rfid {
            if *last_id == id && now.duration_since(*last_at) < RFID_DEBOUNCE {
                return;
            }
        }
        self.last_rfid = Some((id.clone(), now));
        self.evaluate(terminal, &id).await;
    }

    async fn handle_tick(&mut self, terminal: &mut dyn TerminalIo) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.enter_idle(terminal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Local, TimeZone};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingTerminal {
        leds: Vec<String>,
        lcd: Vec<(u8, String)>,
        buzzes: Vec<(Tone, u32)>,
    }

    #[async_trait]
    impl TerminalIo for RecordingTerminal {
        async fn set_leds(&mut self, chars: &str) -> Result<(), crate::error::ControllerError> {
            self.leds.push(chars.to_string());
            Ok(())
        }
        async fn buzz(&mut self, tone: Tone, ms: u32) -> Result<(), crate::error::ControllerError> {
            self.buzzes.push((tone, ms));
            Ok(())
        }
        async fn write_lcd(&mut self, row: u8, text: &str) -> Result<(), crate::error::ControllerError> {
            self.lcd.push((row, text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingActions {
        opened: StdMutex<Vec<Target>>,
    }

    #[async_trait]
    impl PhysicalActions for RecordingActions {
        async fn open_door(&self, target: Target) {
            self.opened.lock().unwrap().push(target);
        }
        async fn ring_bell(&self, _target: Target) {}
    }

    fn make_authenticator(clock: Arc<FixedClock>) -> Arc<Authenticator> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(
            &path,
            "root,admin@example.com,member,,,self,900001\nday,day@example.com,user,,,root,900123\n",
        )
        .unwrap();
        let auth = Arc::new(Authenticator::load(path, clock).unwrap());
        // tests here only read (auth_user/find_user), never re-append to disk,
        // so dropping the tempdir after load is fine.
        drop(dir);
        auth
    }

    #[tokio::test]
    async fn granted_code_opens_the_door_and_reverts_to_idle() {
        let clock = Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2014, 10, 10, 13, 0, 0).unwrap(),
        ));
        let auth = make_authenticator(clock);
        let actions = Arc::new(RecordingActions::default());
        let doorbell = DoorbellUi::new(actions.clone());
        let mut handler =
            AccessHandler::new(Target::Upstairs, auth, actions.clone(), doorbell);
        let mut terminal = RecordingTerminal::default();

        for c in "900123".chars() {
            handler.handle_key(&mut terminal, c).await;
        }
        handler.handle_key(&mut terminal, '#').await;

        assert_eq!(actions.opened.lock().unwrap().as_slice(), [Target::Upstairs]);
        assert!(terminal.lcd.iter().any(|(_, t)| t == "Welcome"));
        assert_eq!(handler.state, State::Granted);
    }

    #[tokio::test]
    async fn denied_outside_daytime_rings_the_doorbell() {
        let clock = Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2014, 10, 10, 3, 0, 0).unwrap(),
        ));
        let auth = make_authenticator(clock);
        let actions = Arc::new(RecordingActions::default());
        let doorbell = DoorbellUi::new(actions.clone());
        let mut handler =
            AccessHandler::new(Target::Upstairs, auth, actions.clone(), doorbell);
        let mut terminal = RecordingTerminal::default();

        for c in "900123".chars() {
            handler.handle_key(&mut terminal, c).await;
        }
        handler.handle_key(&mut terminal, '#').await;

        assert!(actions.opened.lock().unwrap().is_empty());
        assert_eq!(handler.state, State::Denied);
    }

    #[tokio::test]
    async fn star_clears_the_buffer() {
        let clock = Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2014, 10, 10, 13, 0, 0).unwrap(),
        ));
        let auth = make_authenticator(clock);
        let actions = Arc::new(RecordingActions::default());
        let doorbell = DoorbellUi::new(actions.clone());
        let mut handler = AccessHandler::new(Target::Gate, auth, actions, doorbell);
        let mut terminal = RecordingTerminal::default();

        handler.handle_key(&mut terminal, '1').await;
        handler.handle_key(&mut terminal, '2').await;
        handler.handle_key(&mut terminal, '*').await;

        assert_eq!(handler.state, State::Idle);
        assert!(handler.buffer.is_empty());
    }

    #[tokio::test]
    async fn repeated_rfid_within_two_seconds_is_debounced() {
        let clock = Arc::new(FixedClock::new(
            Local.with_ymd_and_hms(2014, 10, 10, 13, 0, 0).unwrap(),
        ));
        let auth = make_authenticator(clock);
        let actions = Arc::new(RecordingActions::default());
        let doorbell = DoorbellUi::new(actions.clone());
        let mut handler = AccessHandler::new(Target::Gate, auth, actions.clone(), doorbell);
        let mut terminal = RecordingTerminal::default();

        handler
            .handle_rfid(&mut terminal, "900123".to_string())
            .await;
        handler
            .handle_rfid(&mut terminal, "900123".to_string())
            .await;

        assert_eq!(actions.opened.lock().unwrap().len(), 1);
    }
}
