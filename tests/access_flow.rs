/* Integration suite: drives the real wire protocol — `Terminal` talking
 * over an in-memory duplex standing in for the serial port — through a full
 * access-grant and a time-of-day-deny scenario, instead of exercising the
 * handler state machine against a recording stub as the unit tests do. */
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};

use access_controller::authenticator::Authenticator;
use access_controller::clock::{Clock, FixedClock};
use access_controller::doorbell::DoorbellUi;
use access_controller::handler::{self, EventHandler};
use access_controller::physical::PhysicalActions;
use access_controller::target::Target;
use access_controller::terminal::protocol::Event;
use access_controller::terminal::{Terminal, TerminalActivity};

#[derive(Default)]
struct RecordingActions {
    opened: Mutex<Vec<Target>>,
    rung: Mutex<Vec<Target>>,
}

#[async_trait]
impl PhysicalActions for RecordingActions {
    async fn open_door(&self, target: Target) {
        self.opened.lock().unwrap().push(target);
    }
    async fn ring_bell(&self, target: Target) {
        self.rung.lock().unwrap().push(target);
    }
}

/* Plays the firmware side of the duplex: echoes every command line back
 * verbatim (opcode match is all `Terminal::send_command` checks), except `n`
 * requests which always get the configured terminal name. Lines pushed onto
 * `inject` are written out as spontaneous events (`K`/`I`), interleaved with
 * command echoes, the same way a real keypad interleaves keypresses with
 * command acknowledgements. */
async fn run_fake_terminal(
    server: tokio::io::DuplexStream,
    name: &'static str,
    mut inject: mpsc::UnboundedReceiver<String>,
) {
    let (read_half, mut write_half) = tokio::io::split(server);
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let opcode = line.chars().next().unwrap_or('?');
                        let reply = if opcode == 'n' {
                            format!("n{name}\n")
                        } else {
                            format!("{line}\n")
                        };
                        if write_half.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            injected = inject.recv() => {
                if let Some(line) = injected {
                    if write_half.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn seed_users(path: &std::path::Path) {
    std::fs::write(
        path,
        "root,admin@example.com,member,,,self,900001\n\
         day,day@example.com,user,,,root,900123\n",
    )
    .unwrap();
}

async fn type_code(
    terminal: &mut Terminal,
    handler: &mut dyn EventHandler,
    inject: &UnboundedSender<String>,
    code: &str,
) {
    for c in code.chars().chain(std::iter::once('#')) {
        inject.send(format!("K{c}")).unwrap();
        match terminal.next_activity().await.unwrap() {
            TerminalActivity::Event(Event::Key(k)) => {
                assert_eq!(k, c);
                handler.handle_key(terminal, k).await;
            }
            other => panic!("expected keypress, got {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn valid_code_at_upstairs_during_daytime_opens_the_door() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    seed_users(&path);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
        Local.with_ymd_and_hms(2014, 10, 10, 13, 0, 0).unwrap(),
    ));
    let authenticator = Arc::new(Authenticator::load(path, clock.clone()).unwrap());
    let actions = Arc::new(RecordingActions::default());
    let physical: Arc<dyn PhysicalActions> = actions.clone();
    let doorbell = DoorbellUi::new(physical.clone());

    let (client, server) = tokio::io::duplex(4096);
    let (inject_tx, inject_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_fake_terminal(server, "upstairs", inject_rx));

    let mut terminal = Terminal::connect(client, "test-upstairs".to_string())
        .await
        .unwrap();
    assert_eq!(terminal.name(), "upstairs");

    let mut eh = handler::dispatch(
        terminal.name(),
        authenticator.clone(),
        physical.clone(),
        doorbell,
        clock,
    )
    .expect("upstairs is a recognized target");
    eh.on_activate(&mut terminal).await;

    type_code(&mut terminal, eh.as_mut(), &inject_tx, "900123").await;

    assert_eq!(actions.opened.lock().unwrap().as_slice(), [Target::Upstairs]);
    assert!(actions.rung.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn valid_code_outside_daytime_is_denied_and_rings_the_doorbell() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    seed_users(&path);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
        Local.with_ymd_and_hms(2014, 10, 10, 3, 0, 0).unwrap(),
    ));
    let authenticator = Arc::new(Authenticator::load(path, clock.clone()).unwrap());
    let actions = Arc::new(RecordingActions::default());
    let physical: Arc<dyn PhysicalActions> = actions.clone();
    let doorbell = DoorbellUi::new(physical.clone());

    let (client, server) = tokio::io::duplex(4096);
    let (inject_tx, inject_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_fake_terminal(server, "upstairs", inject_rx));

    let mut terminal = Terminal::connect(client, "test-upstairs".to_string())
        .await
        .unwrap();

    let mut eh = handler::dispatch(
        terminal.name(),
        authenticator.clone(),
        physical.clone(),
        doorbell,
        clock,
    )
    .expect("upstairs is a recognized target");
    eh.on_activate(&mut terminal).await;

    type_code(&mut terminal, eh.as_mut(), &inject_tx, "900123").await;

    assert!(actions.opened.lock().unwrap().is_empty());
    assert_eq!(actions.rung.lock().unwrap().as_slice(), [Target::Upstairs]);
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_returns_to_idle_without_evaluating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    seed_users(&path);

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
        Local.with_ymd_and_hms(2014, 10, 10, 13, 0, 0).unwrap(),
    ));
    let authenticator = Arc::new(Authenticator::load(path, clock.clone()).unwrap());
    let actions = Arc::new(RecordingActions::default());
    let physical: Arc<dyn PhysicalActions> = actions.clone();
    let doorbell = DoorbellUi::new(physical.clone());

    let (client, server) = tokio::io::duplex(4096);
    let (inject_tx, inject_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_fake_terminal(server, "gate", inject_rx));

    let mut terminal = Terminal::connect(client, "test-gate".to_string())
        .await
        .unwrap();

    let mut eh = handler::dispatch(
        terminal.name(),
        authenticator,
        physical.clone(),
        doorbell,
        clock,
    )
    .expect("gate is a recognized target");
    eh.on_activate(&mut terminal).await;

    // Type a couple of digits but never submit.
    for c in ['9', '0'] {
        inject_tx.send(format!("K{c}")).unwrap();
        match terminal.next_activity().await.unwrap() {
            TerminalActivity::Event(Event::Key(k)) => eh.handle_key(&mut terminal, k).await,
            other => panic!("expected keypress, got {other:?}"),
        }
    }

    // No more keypresses arrive; idle ticks eventually revert to Idle
    // (the ~5s collect timeout) without ever calling `auth_user`, so the
    // door never opens.
    for _ in 0..12 {
        if let TerminalActivity::Tick = terminal.next_activity().await.unwrap() {
            eh.handle_tick(&mut terminal).await;
        }
    }

    assert!(actions.opened.lock().unwrap().is_empty());
}
