// ── Registration scheduler ──
//
// One recurring timer per device: first tick after the initial delay, then
// every cycle. Devices can lose their registration silently (power cycle), so
// re-registration runs independently of any notification traffic. Timers are
// never removed.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

use crate::protocol::registration::RegistrationRequest;
use crate::registry::DeviceRegistry;

pub struct RegistrationScheduler {
    initial_delay: Duration,
    cycle: Duration,
    timers: StreamMap<IpAddr, IntervalStream>,
}

impl RegistrationScheduler {
    /// `cycle` must be non-zero.
    pub fn new(initial_delay: Duration, cycle: Duration) -> Self {
        Self {
            initial_delay,
            cycle,
            timers: StreamMap::new(),
        }
    }

    /// Arm the recurring timer for `device`. Arming twice keeps one timer.
    pub fn arm(&mut self, device: IpAddr) {
        if self.timers.contains_key(&device) {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.initial_delay, self.cycle);
        // Expirations missed while the reactor was busy collapse into one tick.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timers.insert(device, IntervalStream::new(interval));
        debug!(%device, initial_delay = ?self.initial_delay, cycle = ?self.cycle, "registration timer armed");
    }

    /// Wait for the next device whose timer fired.
    ///
    /// Pending forever while no timer is armed.
    pub async fn next_due(&mut self) -> IpAddr {
        match self.timers.next().await {
            Some((device, _)) => device,
            None => std::future::pending().await,
        }
    }

    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// One request per (category, label) configured for `device`.
pub fn requests_for(
    registry: &DeviceRegistry,
    device: IpAddr,
    advertised: SocketAddr,
    cycle: Duration,
) -> Vec<RegistrationRequest> {
    registry
        .registrations(device)
        .map(|(category, label)| RegistrationRequest {
            device,
            category,
            label: label.to_owned(),
            advertised,
            duration: cycle,
        })
        .collect()
}

/// Argument vectors for every request of `device`, ready to spawn.
pub fn commands_for(
    registry: &DeviceRegistry,
    device: IpAddr,
    advertised: SocketAddr,
    cycle: Duration,
    tool: &Path,
) -> Vec<Vec<String>> {
    requests_for(registry, device, advertised, cycle)
        .iter()
        .map(|request| request.command(tool))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;
    use crate::model::ActionCategory;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_initial_delay_then_every_cycle() {
        let start = Instant::now();
        let mut scheduler =
            RegistrationScheduler::new(Duration::from_secs(5), Duration::from_secs(60));
        scheduler.arm(addr("192.0.2.10"));

        assert_eq!(scheduler.next_due().await, addr("192.0.2.10"));
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        scheduler.next_due().await;
        assert_eq!(start.elapsed(), Duration::from_secs(65));

        scheduler.next_due().await;
        assert_eq!(start.elapsed(), Duration::from_secs(125));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_independent_per_device() {
        let start = Instant::now();
        let mut scheduler =
            RegistrationScheduler::new(Duration::from_secs(1), Duration::from_secs(10));
        scheduler.arm(addr("192.0.2.10"));
        tokio::time::advance(Duration::from_secs(3)).await;
        scheduler.arm(addr("192.0.2.11"));
        scheduler.arm(addr("192.0.2.11"));
        assert_eq!(scheduler.len(), 2);

        let mut fired = Vec::new();
        for _ in 0..4 {
            let device = scheduler.next_due().await;
            fired.push((device, start.elapsed().as_secs()));
        }
        assert_eq!(
            fired,
            vec![
                (addr("192.0.2.10"), 3),
                (addr("192.0.2.11"), 4),
                (addr("192.0.2.10"), 11),
                (addr("192.0.2.11"), 14),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ticks_collapse() {
        let start = Instant::now();
        let mut scheduler = RegistrationScheduler::new(Duration::ZERO, Duration::from_secs(10));
        scheduler.arm(addr("192.0.2.10"));
        scheduler.next_due().await;

        // Reactor stalls for three and a half cycles.
        tokio::time::advance(Duration::from_secs(35)).await;
        scheduler.next_due().await;
        assert_eq!(start.elapsed(), Duration::from_secs(35));

        // Next tick is realigned, not a burst of catch-up ticks.
        scheduler.next_due().await;
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[test]
    fn one_request_per_configured_pair() {
        let script = NamedTempFile::new().unwrap();
        let cmd = vec![script.path().display().to_string()];
        let device = addr("192.0.2.10");
        let mut registry = DeviceRegistry::new();
        registry.register(device, "MFC-1").unwrap();
        registry.add_action(device, ActionCategory::File, "PDF", &cmd).unwrap();
        registry.add_action(device, ActionCategory::File, "JPEG", &cmd).unwrap();
        registry.add_action(device, ActionCategory::Email, "Mail", &cmd).unwrap();

        let advertised: SocketAddr = "203.0.113.5:54925".parse().unwrap();
        let requests = requests_for(&registry, device, advertised, Duration::from_secs(300));
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.device == device && r.advertised == advertised));
        assert!(requests.iter().all(|r| r.duration == Duration::from_secs(300)));

        let commands = commands_for(
            &registry,
            device,
            advertised,
            Duration::from_secs(300),
            Path::new("snmpset"),
        );
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|argv| argv[0] == "snmpset"));

        assert!(requests_for(&registry, addr("192.0.2.99"), advertised, Duration::from_secs(1)).is_empty());
    }
}
