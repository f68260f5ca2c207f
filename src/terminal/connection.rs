/* Connection manager: owns one serial endpoint for the lifetime of the
 * process, reconnecting with exponential backoff whenever the link drops. */
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, warn};

use crate::authenticator::Authenticator;
use crate::clock::Clock;
use crate::doorbell::DoorbellUi;
use crate::error::ControllerError;
use crate::handler;
use crate::physical::PhysicalActions;

use super::{Terminal, TerminalActivity, LIVENESS_TICKS};

/* Initial and maximum reconnect backoff. */
const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/* A `device[:baud]` endpoint parsed from the command line. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub device: String,
    pub baud: u32,
}

const DEFAULT_BAUD: u32 = 9600;

impl FromStr for Endpoint {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((device, baud)) => {
                let baud = baud.parse::<u32>().map_err(|_| ControllerError::ConfigError(
                    format!("invalid baud rate in endpoint {s:?}"),
                ))?;
                Ok(Endpoint {
                    device: device.to_string(),
                    baud,
                })
            }
            None => Ok(Endpoint {
                device: s.to_string(),
                baud: DEFAULT_BAUD,
            }),
        }
    }
}

pub struct ConnectionManager {
    endpoint: Endpoint,
    authenticator: Arc<Authenticator>,
    physical: Arc<dyn PhysicalActions>,
    clock: Arc<dyn Clock>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: Endpoint,
        authenticator: Arc<Authenticator>,
        physical: Arc<dyn PhysicalActions>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint,
            authenticator,
            physical,
            clock,
        }
    }

    /* Run forever: connect, serve events until the link fails, then
     * reconnect with backoff. A successful connection resets the backoff, so
     * a link that drops after running fine for a while starts reconnecting
     * at `BACKOFF_INITIAL` again rather than inheriting a stale delay. Never
     * returns. */
    pub async fn run(self) {
        let mut backoff = BACKOFF_INITIAL;

        loop {
            match self.connect().await {
                Ok(mut terminal) => {
                    backoff = BACKOFF_INITIAL;
                    match self.serve(&mut terminal).await {
                        Ok(()) => {
                            info!(device = %self.endpoint.device, "terminal link closed cleanly");
                        }
                        Err(e) => {
                            warn!(device = %self.endpoint.device, error = %e, "terminal link failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(device = %self.endpoint.device, error = %e, "terminal connect failed");
                }
            }

            info!(device = %self.endpoint.device, backoff_secs = backoff.as_secs(), "reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, BACKOFF_MAX);
        }
    }

    async fn connect(&self) -> Result<Terminal, ControllerError> {
        let stream = tokio_serial::new(&self.endpoint.device, self.endpoint.baud)
            .open_native_async()
            .map_err(|e| ControllerError::SerialIo {
                device: self.endpoint.device.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        let terminal = Terminal::connect(stream, self.endpoint.device.clone()).await?;
        info!(device = %self.endpoint.device, name = %terminal.name(), "terminal connected");
        Ok(terminal)
    }

    async fn serve(&self, terminal: &mut Terminal) -> Result<(), ControllerError> {
        let doorbell = DoorbellUi::new(self.physical.clone());
        let mut handler = handler::dispatch(
            terminal.name(),
            self.authenticator.clone(),
            self.physical.clone(),
            doorbell,
            self.clock.clone(),
        );
        match handler.as_mut() {
            Some(h) => h.on_activate(terminal).await,
            None => {
                error!(device = %self.endpoint.device, name = %terminal.name(), "unrecognized terminal name, no handler");
            }
        }

        let mut ticks_since_ping: u32 = 0;

        loop {
            if terminal.is_failed() {
                return Err(ControllerError::ProtocolViolation {
                    device: self.endpoint.device.clone(),
                    reason: "connection marked failed".to_string(),
                });
            }

            match terminal.next_activity().await? {
                TerminalActivity::Event(event) => {
                    if let Some(h) = handler.as_mut() {
                        h.handle_event(terminal, event).await;
                    }
                }
                TerminalActivity::Tick => {
                    if let Some(h) = handler.as_mut() {
                        h.handle_tick(terminal).await;
                    }

                    ticks_since_ping += 1;
                    if ticks_since_ping >= LIVENESS_TICKS {
                        ticks_since_ping = 0;
                        terminal.liveness_ping().await?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_device_path_with_default_baud() {
        let e: Endpoint = "/dev/ttyUSB0".parse().unwrap();
        assert_eq!(e.device, "/dev/ttyUSB0");
        assert_eq!(e.baud, DEFAULT_BAUD);
    }

    #[test]
    fn parses_device_path_with_explicit_baud() {
        let e: Endpoint = "/dev/ttyUSB0:115200".parse().unwrap();
        assert_eq!(e.device, "/dev/ttyUSB0");
        assert_eq!(e.baud, 115200);
    }

    #[test]
    fn rejects_non_numeric_baud() {
        assert!("/dev/ttyUSB0:fast".parse::<Endpoint>().is_err());
    }
}
