use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::identity::{format_uptime, ComponentIdentity};

/// Contributes extra fields to `/varz`, consulted on every request.
pub trait VarzProducer: Send + Sync {
    /// Fields to merge over the base document.
    fn varz(&self) -> Map<String, Value>;
}

impl<F> VarzProducer for F
where
    F: Fn() -> Map<String, Value> + Send + Sync,
{
    fn varz(&self) -> Map<String, Value> {
        self()
    }
}

/// One best-effort reading of process statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProcessSample {
    /// Resident set size in KiB.
    pub rss_kb: Option<u64>,
    /// CPU usage in percent.
    pub cpu_percent: Option<f64>,
}

/// Source of process statistics for `/varz`. `None` means unavailable.
#[async_trait]
pub trait ProcessSampler: Send + Sync {
    /// Resident set size in KiB.
    async fn rss_kb(&self) -> Option<u64>;

    /// Recent CPU usage in percent.
    async fn cpu_percent(&self) -> Option<f64>;

    /// Both readings at once.
    async fn sample(&self) -> ProcessSample {
        ProcessSample { rss_kb: self.rss_kb().await, cpu_percent: self.cpu_percent().await }
    }
}

/// Samples the current process with `ps -o rss=,pcpu=`. Unavailable off Unix.
#[derive(Clone, Copy, Debug, Default)]
pub struct PsSampler;

#[async_trait]
impl ProcessSampler for PsSampler {
    async fn rss_kb(&self) -> Option<u64> {
        self.sample().await.rss_kb
    }

    async fn cpu_percent(&self) -> Option<f64> {
        self.sample().await.cpu_percent
    }

    async fn sample(&self) -> ProcessSample {
        ps_sample().await.unwrap_or_default()
    }
}

#[cfg(unix)]
async fn ps_sample() -> Option<ProcessSample> {
    let pid = std::process::id().to_string();
    let output = tokio::process::Command::new("ps")
        .args(["-o", "rss=,pcpu=", "-p", &pid])
        .output()
        .await
        .map_err(|e| tracing::debug!(target: "switchboard::component", error = %e, "ps unavailable"))
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(parse_ps(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(unix))]
async fn ps_sample() -> Option<ProcessSample> {
    None
}

/// Parse `"<rss> <pcpu>"`; either field may be missing or garbled.
fn parse_ps(output: &str) -> ProcessSample {
    let mut fields = output.split_whitespace();
    ProcessSample {
        rss_kb: fields.next().and_then(|f| f.parse().ok()),
        cpu_percent: fields.next().and_then(|f| f.parse().ok()),
    }
}

/// Build the `/varz` document: identity fields, uptime, process stats (`0`
/// when unavailable), then producer fields in order, later keys winning.
pub fn snapshot(
    identity: &ComponentIdentity,
    sample: ProcessSample,
    producers: &[std::sync::Arc<dyn VarzProducer>],
) -> Map<String, Value> {
    let (username, password) = identity.credentials();
    let num_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let mut doc = Map::new();
    doc.insert("type".into(), json!(identity.component_type()));
    doc.insert("index".into(), json!(identity.index()));
    doc.insert("uuid".into(), json!(identity.uuid()));
    doc.insert("host".into(), json!(identity.host()));
    doc.insert("credentials".into(), json!([username, password]));
    doc.insert("start".into(), json!(identity.start()));
    doc.insert("uptime".into(), json!(format_uptime(identity.uptime())));
    doc.insert("num_cores".into(), json!(num_cores));
    doc.insert("mem".into(), json!(sample.rss_kb.unwrap_or(0)));
    doc.insert("cpu".into(), json!(sample.cpu_percent.unwrap_or(0.0)));
    for producer in producers {
        doc.extend(producer.varz());
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn parse_ps_tolerates_partial_output() {
        assert_eq!(
            parse_ps("  10240  1.5\n"),
            ProcessSample { rss_kb: Some(10240), cpu_percent: Some(1.5) }
        );
        assert_eq!(parse_ps("abc"), ProcessSample::default());
        assert_eq!(parse_ps(""), ProcessSample::default());
    }

    #[test]
    fn unavailable_stats_degrade_to_zero() {
        let id = ComponentIdentity::generate("T", "h:1");
        let doc = snapshot(&id, ProcessSample::default(), &[]);
        assert_eq!(doc["mem"], 0);
        assert_eq!(doc["cpu"], 0.0);
        assert!(doc["num_cores"].as_u64().unwrap() >= 1);
        assert_eq!(doc["type"], "T");
    }

    #[test]
    fn later_producers_win() {
        let id = ComponentIdentity::generate("T", "h:1");
        let first: Arc<dyn VarzProducer> = Arc::new(|| {
            let mut m = Map::new();
            m.insert("requests".into(), json!(1));
            m.insert("only_first".into(), json!(true));
            m
        });
        let second: Arc<dyn VarzProducer> = Arc::new(|| {
            let mut m = Map::new();
            m.insert("requests".into(), json!(2));
            m
        });
        let doc = snapshot(&id, ProcessSample::default(), &[first, second]);
        assert_eq!(doc["requests"], 2);
        assert_eq!(doc["only_first"], true);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ps_sampler_never_fails() {
        // Values depend on the host; only the call shape is checked.
        let _ = PsSampler.sample().await;
    }
}
