/* Control event handler: the admin-terminal enrollment flow.
 *
 * The control terminal has no alphanumeric entry, only the `{0-9,*,#}`
 * keypad, so enrollment collects a sponsor code, a new auth code, and an
 * optional numeric contact (e.g. a phone number) — never a name. New users
 * are enrolled at `UserLevel::User` and get a placeholder name; a member can
 * rename them later by editing the CSV directly. */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::authenticator::Authenticator;
use crate::clock::Clock;
use crate::policy;
use crate::terminal::protocol::{is_code_char, Tone};
use crate::terminal::TerminalIo;
use crate::user::{User, UserLevel, MIN_AUTH_CODE_LEN};

use super::EventHandler;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const RESULT_DISPLAY: Duration = Duration::from_secs(3);
const ENROLLED_NAME: &str = "Guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitSponsor,
    ConfirmSponsor,
    AwaitNewCode,
    AwaitContact,
    Result,
}

pub struct ControlHandler {
    authenticator: Arc<Authenticator>,
    clock: Arc<dyn Clock>,
    state: State,
    buffer: String,
    sponsor_code: Option<String>,
    new_code: Option<String>,
    deadline: Option<Instant>,
}

impl ControlHandler {
    pub fn new(authenticator: Arc<Authenticator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            authenticator,
            clock,
            state: State::AwaitSponsor,
            buffer: String::new(),
            sponsor_code: None,
            new_code: None,
            deadline: None,
        }
    }

    async fn reset(&mut self, terminal: &mut dyn TerminalIo) {
        self.state = State::AwaitSponsor;
        self.buffer.clear();
        self.sponsor_code = None;
        self.new_code = None;
        self.deadline = None;
        let _ = terminal.set_leds("B").await;
        let _ = terminal.write_lcd(0, "Swipe member card").await;
        let _ = terminal.write_lcd(1, "").await;
    }

    async fn show_result(&mut self, terminal: &mut dyn TerminalIo, ok: bool, message: &str) {
        self.state = State::Result;
        self.deadline = Some(Instant::now() + RESULT_DISPLAY);
        let _ = terminal.set_leds(if ok { "G" } else { "R" }).await;
        let _ = terminal
            .buzz(if ok { Tone::High } else { Tone::Low }, 200)
            .await;
        let line = if message.is_empty() {
            if ok { "Enrolled" } else { "Failed" }
        } else {
            message
        };
        let _ = terminal.write_lcd(0, line).await;
    }

    async fn submit_sponsor(&mut self, terminal: &mut dyn TerminalIo) {
        let code = self.buffer.clone();
        self.buffer.clear();
        if code.is_empty() {
            return;
        }

        let Some(sponsor) = self.authenticator.find_user(&code).await else {
            self.show_result(terminal, false, "Unknown sponsor code").await;
            return;
        };
        if !policy::is_valid_sponsor(self.clock.now(), &sponsor) {
            self.show_result(terminal, false, "Sponsor not valid").await;
            return;
        }

        self.sponsor_code = Some(code);
        self.state = State::ConfirmSponsor;
        self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
        let _ = terminal
            .write_lcd(0, &format!("Sponsor: {}", sponsor.name))
            .await;
        let _ = terminal.write_lcd(1, "# to continue").await;
    }

    async fn submit_new_code(&mut self, terminal: &mut dyn TerminalIo) {
        let code = self.buffer.clone();
        self.buffer.clear();
        if code.len() < MIN_AUTH_CODE_LEN {
            let _ = terminal
                .write_lcd(0, &format!("Need {MIN_AUTH_CODE_LEN}+ digits"))
                .await;
            self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
            return;
        }
        if self.authenticator.find_user(&code).await.is_some() {
            let _ = terminal.write_lcd(0, "Code already in use").await;
            self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
            return;
        }

        self.new_code = Some(code);
        self.state = State::AwaitContact;
        self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
        let _ = terminal.write_lcd(0, "Contact (# to skip):").await;
        let _ = terminal.write_lcd(1, "").await;
    }

    async fn submit_contact(&mut self, terminal: &mut dyn TerminalIo) {
        let contact = self.buffer.clone();
        self.buffer.clear();
        self.commit(terminal, contact).await;
    }

    async fn commit(&mut self, terminal: &mut dyn TerminalIo, contact: String) {
        let Some(sponsor_code) = self.sponsor_code.clone() else {
            self.show_result(terminal, false, "Internal error").await;
            return;
        };
        let Some(new_code) = self.new_code.clone() else {
            self.show_result(terminal, false, "Internal error").await;
            return;
        };

        let new_user = User {
            name: ENROLLED_NAME.to_string(),
            contact_info: contact,
            user_level: UserLevel::User,
            valid_from: None,
            valid_to: None,
            auth_code_hash: new_code,
            sponsor: String::new(),
        };

        let (ok, reason) = self
            .authenticator
            .add_new_user(&sponsor_code, new_user)
            .await;
        debug!(ok, "enrollment committed");
        self.show_result(terminal, ok, &reason).await;
    }
}

#[async_trait]
impl EventHandler for ControlHandler {
    async fn on_activate(&mut self, terminal: &mut dyn TerminalIo) {
        self.reset(terminal).await;
    }

    async fn handle_key(&mut self, terminal: &mut dyn TerminalIo, c: char) {
        if !is_code_char(c) {
            return;
        }

        match self.state {
            State::Result => {}
            State::ConfirmSponsor => match c {
                '#' => {
                    self.state = State::AwaitNewCode;
                    self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
                    let _ = terminal.write_lcd(0, "New code:").await;
                    let _ = terminal.write_lcd(1, "").await;
                }
                '*' => self.reset(terminal).await,
                _ => {}
            },
            State::AwaitSponsor | State::AwaitNewCode | State::AwaitContact => match c {
                '#' => match self.state {
                    State::AwaitSponsor => self.submit_sponsor(terminal).await,
                    State::AwaitNewCode => self.submit_new_code(terminal).await,
                    State::AwaitContact => self.submit_contact(terminal).await,
                    _ => unreachable!(),
                },
                '*' => self.reset(terminal).await,
                digit => {
                    self.buffer.push(digit);
                    self.deadline = Some(Instant::now() + IDLE_TIMEOUT);
                }
            },
        }
    }

    async fn handle_rfid(&mut self, terminal: &mut dyn TerminalIo, id: String) {
        if self.state != State::AwaitSponsor {
            return;
        }
        /* An RFID card submits immediately; there is no separate `#`
         * terminator the way there is for a typed-in code. */
        self.buffer = id;
        self.submit_sponsor(terminal).await;
    }

    async fn handle_tick(&mut self, terminal: &mut dyn TerminalIo) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.reset(terminal).await;
            }
        }
    }
}
