/* Per-terminal event handlers: short-lived state machines driving the
 * access flow at a door terminal, or the enrollment flow at the admin
 * terminal. Dispatched by the terminal's self-reported name. */
pub mod access;
pub mod control;

use std::sync::Arc;

use async_trait::async_trait;

use crate::authenticator::Authenticator;
use crate::clock::Clock;
use crate::doorbell::DoorbellUi;
use crate::physical::PhysicalActions;
use crate::target::Target;
use crate::terminal::protocol::Event;
use crate::terminal::TerminalIo;

#[async_trait]
pub trait EventHandler: Send {
    async fn handle_key(&mut self, terminal: &mut dyn TerminalIo, c: char);
    async fn handle_rfid(&mut self, terminal: &mut dyn TerminalIo, id: String);
    async fn handle_tick(&mut self, terminal: &mut dyn TerminalIo);

    /* Called once right after the handler is created, so the idle/await-
     * sponsor prompt is on the LCD before the first keypress rather than
     * only after one. */
    async fn on_activate(&mut self, _terminal: &mut dyn TerminalIo) {}

    async fn handle_event(&mut self, terminal: &mut dyn TerminalIo, event: Event) {
        match event {
            Event::Key(c) => self.handle_key(terminal, c).await,
            Event::Rfid(id) => self.handle_rfid(terminal, id).await,
        }
    }
}

/* Build the right handler for a terminal's self-reported name, once it
 * identifies itself. Unknown names get no handler at all. */
pub fn dispatch(
    name: &str,
    authenticator: Arc<Authenticator>,
    physical: Arc<dyn PhysicalActions>,
    doorbell: DoorbellUi,
    clock: Arc<dyn Clock>,
) -> Option<Box<dyn EventHandler>> {
    let target: Target = name.parse().ok()?;
    Some(match target {
        Target::Control => Box::new(control::ControlHandler::new(authenticator, clock)),
        door => Box::new(access::AccessHandler::new(
            door,
            authenticator,
            physical,
            doorbell,
        )),
    })
}
