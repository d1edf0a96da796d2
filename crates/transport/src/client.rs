// HTTP transport implementation on ureq

use crate::connection::{Connection, Transport};
use cappella_core::{PlayerError, Result, Settings};
use once_cell::sync::Lazy;
use std::io::Read;
use std::time::Duration;

/// Shared agent built from default settings, for callers that don't carry
/// their own configuration
static DEFAULT_AGENT: Lazy<ureq::Agent> = Lazy::new(|| build_agent(&Settings::default()));

fn build_agent(settings: &Settings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(settings.connect_timeout)
        .timeout_read(settings.read_timeout)
        .timeout_write(Duration::from_secs(30))
        .user_agent(&settings.user_agent)
        .redirects(10)
        .build()
}

/// HTTP/HTTPS transport.
///
/// Both profiles ride the same agent; TLS is selected by the locator scheme.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Self {
        Self {
            agent: build_agent(settings),
        }
    }

    /// Transport over the process-wide default agent
    pub fn shared() -> Self {
        Self {
            agent: DEFAULT_AGENT.clone(),
        }
    }
}

impl Transport for HttpTransport {
    fn open(&self, locator: &str) -> Result<Box<dyn Connection>> {
        if !locator.starts_with("http://") && !locator.starts_with("https://") {
            return Err(PlayerError::Transport(format!(
                "unsupported locator scheme: {}",
                locator
            )));
        }

        let response = self
            .agent
            .get(locator)
            .call()
            .map_err(|e| PlayerError::Transport(format!("HTTP GET failed: {}", e)))?;

        let content_length = response
            .header("Content-Length")
            .and_then(|s| s.parse::<u64>().ok());

        if let Some(len) = content_length {
            log::debug!("opened {} ({} bytes announced)", locator, len);
        } else {
            log::debug!("opened {} (length unknown)", locator);
        }

        Ok(Box::new(HttpConnection {
            reader: response.into_reader(),
            content_length,
        }))
    }
}

struct HttpConnection {
    reader: Box<dyn Read + Send>,
    content_length: Option<u64>,
}

impl Connection for HttpConnection {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader
            .read(buf)
            .map_err(|e| PlayerError::Transport(format!("read failed: {}", e)))
    }
}
