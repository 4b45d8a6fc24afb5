use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::messages::ComponentAnnounce;

const SECRET_LEN: usize = 32;
const START_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Process-lifetime identity of a component. Generated once, never mutated.
#[derive(Clone)]
pub struct ComponentIdentity {
    component_type: String,
    uuid: String,
    index: u32,
    host: String,
    username: String,
    password: String,
    started_at: DateTime<Local>,
    started: Instant,
}

impl ComponentIdentity {
    /// Fresh identity with random credentials and a random uuid.
    pub fn generate(component_type: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            uuid: uuid::Uuid::new_v4().simple().to_string(),
            index: 0,
            host: host.into(),
            username: random_secret(),
            password: random_secret(),
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    /// Component type, e.g. `Router`.
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// Random per-process id.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Always 0.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Advertised `ip:port` of the HTTP endpoint.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Basic-auth `(username, password)` for the identity routes.
    pub fn credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }

    /// Wall-clock start, formatted `%Y-%m-%d %H:%M:%S %z`.
    pub fn start(&self) -> String {
        self.started_at.format(START_FORMAT).to_string()
    }

    /// Time since the identity was generated, on the monotonic clock.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Announce reflecting the current uptime.
    pub fn announce(&self) -> ComponentAnnounce {
        ComponentAnnounce {
            component_type: self.component_type.clone(),
            index: self.index,
            uuid: self.uuid.clone(),
            host: self.host.clone(),
            credentials: (self.username.clone(), self.password.clone()),
            start: self.start(),
            uptime: format_uptime(self.uptime()),
        }
    }
}

impl std::fmt::Debug for ComponentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentIdentity")
            .field("component_type", &self.component_type)
            .field("uuid", &self.uuid)
            .field("index", &self.index)
            .field("host", &self.host)
            .field("start", &self.start())
            .finish_non_exhaustive()
    }
}

/// Render as `"{d}d:{h}h:{m}m:{s}s"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{days}d:{hours}h:{minutes}m:{seconds}s")
}

fn random_secret() -> String {
    rand::rng().sample_iter(Alphanumeric).take(SECRET_LEN).map(char::from).collect()
}
