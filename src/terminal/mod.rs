/* Terminal I/O subsystem: a serial connection to one keypad/RFID/LCD
 * terminal, its tiny request/response protocol, and the connection manager
 * that survives replugs and transient errors with exponential backoff. */
pub mod connection;
pub mod protocol;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ControllerError;
use protocol::{classify_line, Command, Event, IncomingLine, Tone};

/* The subset of `Terminal` that event handlers need: feedback output only.
 * Handlers never see the response/event plumbing — that stays inside the
 * connection manager. This is the seam unit tests substitute a recorder
 * for instead of spinning up a real duplex stream. */
#[async_trait]
pub trait TerminalIo: Send {
    async fn set_leds(&mut self, chars: &str) -> Result<(), ControllerError>;
    async fn buzz(&mut self, tone: Tone, ms: u32) -> Result<(), ControllerError>;
    async fn write_lcd(&mut self, row: u8, text: &str) -> Result<(), ControllerError>;
}

/* Response wait timeout. */
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
/* Idle tick period while waiting for the next event. */
pub const IDLE_TICK: Duration = Duration::from_millis(500);
/* Liveness ping cadence, expressed in idle ticks (every 10 ticks is about 5s). */
pub const LIVENESS_TICKS: u32 = 10;
/* How long the link must stay quiet during the connect-time drain. */
const DRAIN_QUIET: Duration = Duration::from_secs(1);
/* Bounded queue capacity for both the event and response channels. */
const QUEUE_CAPACITY: usize = 10;

/* What the event loop got while idly waiting: either a real event, or the
 * idle tick firing with nothing to report. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalActivity {
    Event(Event),
    Tick,
}

/* The reader activity: owns the serial input side, splits on `\n`,
 * classifies by first character, and routes each line to either the event
 * queue or the response queue. Runs until the stream errors, closes, or the
 * cancellation token fires. */
async fn run_reader<R>(
    read: R,
    event_tx: mpsc::Sender<Event>,
    response_tx: mpsc::Sender<(char, String)>,
    cancel: CancellationToken,
    device_label: String,
) where
    R: AsyncRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(read).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            result = lines.next_line() => result,
        };

        match line {
            Ok(Some(line)) => match classify_line(&line) {
                IncomingLine::Event(event) => {
                    /* Bounded and lossy: a misbehaving firmware flooding
                     * events cannot deadlock the controller. */
                    if event_tx.try_send(event).is_err() {
                        warn!(device = %device_label, "event queue full, dropping event");
                    }
                }
                IncomingLine::Response { opcode, payload } => {
                    if response_tx.try_send((opcode, payload)).is_err() {
                        warn!(device = %device_label, "response queue full, dropping response");
                    }
                }
                IncomingLine::Ignored => {}
            },
            Ok(None) => {
                debug!(device = %device_label, "reader reached end of stream");
                break;
            }
            Err(e) => {
                warn!(device = %device_label, error = %e, "reader I/O error");
                break;
            }
        }
    }
    cancel.cancel();
}

/* The live connection to one terminal: the driver side of the two
 * cooperating activities. Owns the write half; the read half is owned by a
 * spawned reader task feeding `event_rx`/`response_rx`. */
pub struct Terminal {
    write: Box<dyn AsyncWrite + Unpin + Send>,
    event_rx: mpsc::Receiver<Event>,
    response_rx: mpsc::Receiver<(char, String)>,
    cancel: CancellationToken,
    device_label: String,
    name: String,
    lcd_cache: [Option<String>; 2],
}

impl Terminal {
    /* Open a connection over an already-established duplex stream: drain
     * leftover bytes, then learn the terminal's self-reported name. Used by
     * both the real `tokio-serial` transport and fake-serial test doubles. */
    pub async fn connect<S>(stream: S, device_label: String) -> Result<Self, ControllerError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (event_tx, event_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (response_tx, response_rx) = mpsc::channel(QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(run_reader(
            read,
            event_tx,
            response_tx,
            cancel.clone(),
            device_label.clone(),
        ));

        let mut terminal = Terminal {
            write: Box::new(write),
            event_rx,
            response_rx,
            cancel,
            device_label,
            name: String::new(),
            lcd_cache: [None, None],
        };

        terminal.drain_leftover().await?;
        terminal.name = terminal.send_command(&Command::Name).await?;
        Ok(terminal)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_failed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /* Mark the connection failed; unblocks the reader at its next wait. */
    pub fn fail(&self) {
        self.cancel.cancel();
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ControllerError> {
        let mut buf = line.as_bytes().to_vec();
        buf.push(b'\n');
        self.write.write_all(&buf).await.map_err(|source| {
            self.fail();
            ControllerError::SerialIo {
                device: self.device_label.clone(),
                source,
            }
        })
    }

    /* Send a command, then wait for a matching response or time out.
     * A mismatched opcode or timeout marks the connection failed. */
    pub async fn send_command(&mut self, cmd: &Command) -> Result<String, ControllerError> {
        self.write_line(&cmd.encode()).await?;

        let outcome = tokio::time::timeout(RESPONSE_TIMEOUT, self.response_rx.recv()).await;
        match outcome {
            Ok(Some((opcode, payload))) if opcode == cmd.opcode() => Ok(payload),
            Ok(Some((opcode, _))) => {
                self.fail();
                Err(ControllerError::ProtocolViolation {
                    device: self.device_label.clone(),
                    reason: format!("expected response '{}', got '{opcode}'", cmd.opcode()),
                })
            }
            Ok(None) => {
                self.fail();
                Err(ControllerError::ProtocolViolation {
                    device: self.device_label.clone(),
                    reason: "response channel closed".to_string(),
                })
            }
            Err(_elapsed) => {
                self.fail();
                Err(ControllerError::ProtocolViolation {
                    device: self.device_label.clone(),
                    reason: "response timed out".to_string(),
                })
            }
        }
    }

    /* Drain leftover bytes on connect: send a dummy name request and
     * discard whatever arrives until the link is quiet for ~1s. */
    async fn drain_leftover(&mut self) -> Result<(), ControllerError> {
        self.write_line(&Command::Name.encode()).await?;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(DRAIN_QUIET) => break,
                maybe = self.response_rx.recv() => {
                    if maybe.is_none() { break; }
                }
                maybe = self.event_rx.recv() => {
                    if maybe.is_none() { break; }
                }
            }
        }
        Ok(())
    }

    pub async fn set_leds(&mut self, chars: &str) -> Result<(), ControllerError> {
        self.send_command(&Command::Leds(chars.to_string())).await?;
        Ok(())
    }

    pub async fn buzz(&mut self, tone: Tone, ms: u32) -> Result<(), ControllerError> {
        self.send_command(&Command::Buzz { tone, ms }).await?;
        Ok(())
    }

    /* Writes are coalesced: an identical repeated write to the same row
     * produces no additional serial traffic. */
    pub async fn write_lcd(&mut self, row: u8, text: &str) -> Result<(), ControllerError> {
        let idx = row as usize;
        if idx >= self.lcd_cache.len() {
            return Ok(());
        }
        if self.lcd_cache[idx].as_deref() == Some(text) {
            return Ok(());
        }
        self.send_command(&Command::Lcd {
            row,
            text: text.to_string(),
        })
        .await?;
        self.lcd_cache[idx] = Some(text.to_string());
        Ok(())
    }

    /* Liveness ping: re-issue `n` while idle. A timeout or name
     * change means the cable was swapped or the firmware rebooted. */
    pub async fn liveness_ping(&mut self) -> Result<(), ControllerError> {
        let name = self.send_command(&Command::Name).await?;
        if name != self.name {
            self.fail();
            return Err(ControllerError::ProtocolViolation {
                device: self.device_label.clone(),
                reason: format!("terminal name changed from '{}' to '{name}'", self.name),
            });
        }
        Ok(())
    }

    /* Wait for the next event, or the idle tick, whichever comes first. */
    pub async fn next_activity(&mut self) -> Result<TerminalActivity, ControllerError> {
        tokio::select! {
            event = self.event_rx.recv() => match event {
                Some(event) => Ok(TerminalActivity::Event(event)),
                None => Err(ControllerError::ProtocolViolation {
                    device: self.device_label.clone(),
                    reason: "event channel closed".to_string(),
                }),
            },
            _ = tokio::time::sleep(IDLE_TICK) => Ok(TerminalActivity::Tick),
        }
    }
}

#[async_trait]
impl TerminalIo for Terminal {
    async fn set_leds(&mut self, chars: &str) -> Result<(), ControllerError> {
        Terminal::set_leds(self, chars).await
    }

    async fn buzz(&mut self, tone: Tone, ms: u32) -> Result<(), ControllerError> {
        Terminal::buzz(self, tone, ms).await
    }

    async fn write_lcd(&mut self, row: u8, text: &str) -> Result<(), ControllerError> {
        Terminal::write_lcd(self, row, text).await
    }
}
