// ── Reactor ──
//
// The single event loop of the dispatcher. Four kinds of readiness are
// multiplexed through one `select!`: inbound datagrams, per-device
// registration timers, child completions and termination signals. Each
// wake-up is turned into a `ReactorEvent` and dispatched on its variant.
//
// State machine: Running ──(SIGTERM / shutdown handle)──► Draining ──► Stopped.
// SIGINT is observed and ignored.
//
// `Dispatcher` holds the per-event logic and all mutable bookkeeping
// (registry, in-flight tokens, supervised processes); `Reactor` adds the I/O
// sources and the state machine around it.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::CoreError;
use crate::inflight::InFlight;
use crate::liveness::LivenessMarker;
use crate::protocol::notification::{Rejection, parse_notification};
use crate::registry::DeviceRegistry;
use crate::scheduler::{RegistrationScheduler, commands_for};
use crate::supervisor::{Completion, ProcessId, ProcessKind, ProcessSupervisor, Reaped};

// ── ReactorState ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Running,
    Draining,
    Stopped,
}

// ── Events ───────────────────────────────────────────────────────────

/// Which shutdown source fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownSignal {
    Terminate,
    Interrupt,
    Requested,
}

/// One readiness event, as reported by the multiplexer.
#[derive(Debug)]
enum ReactorEvent {
    Datagram { len: usize, from: SocketAddr },
    RecvFailed(std::io::Error),
    Timer(IpAddr),
    Process(Completion),
    Signal(ShutdownSignal),
    SignalSourceClosed(&'static str),
}

/// What happened to one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramOutcome {
    /// Not a valid notification for this dispatcher.
    Rejected(Rejection),
    /// Its sequence token is still in flight.
    Duplicate,
    /// Sender address is not a registered device.
    UnknownDevice,
    /// The device has no action for this category and label.
    Unconfigured,
    /// A script was launched.
    Spawned(ProcessId),
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Per-event handling, independent of where events come from.
pub struct Dispatcher {
    registry: DeviceRegistry,
    inflight: InFlight,
    supervisor: ProcessSupervisor,
    advertised: SocketAddr,
    cycle: Duration,
    script_delay: Duration,
    registration_tool: PathBuf,
}

impl Dispatcher {
    /// `advertised` is the address devices send to and must see in `HOST`.
    pub fn new(registry: DeviceRegistry, advertised: SocketAddr, config: &DispatcherConfig) -> Self {
        Self {
            registry,
            inflight: InFlight::new(),
            supervisor: ProcessSupervisor::new(),
            advertised,
            cycle: config.cycle,
            script_delay: config.script_delay,
            registration_tool: config.registration_tool.clone(),
        }
    }

    /// Parse, deduplicate, resolve and launch.
    pub fn handle_datagram(&mut self, payload: &[u8], from: SocketAddr) -> DatagramOutcome {
        let event = match parse_notification(payload, self.advertised) {
            Ok(event) => event,
            Err(rejection) => {
                debug!(%from, %rejection, "dropping datagram");
                return DatagramOutcome::Rejected(rejection);
            }
        };

        if self.inflight.contains(&event.sequence) {
            debug!(%from, sequence = %event.sequence, "duplicate notification, script still running");
            return DatagramOutcome::Duplicate;
        }

        let Some(device) = self.registry.lookup(from.ip()) else {
            debug!(%from, "notification from unregistered device");
            return DatagramOutcome::UnknownDevice;
        };
        let identifier = device.identifier.clone();

        let Some(argv) = self.registry.action(from.ip(), event.function, &event.user) else {
            debug!(
                device = %identifier,
                function = %event.function,
                user = %event.user,
                "no action configured"
            );
            return DatagramOutcome::Unconfigured;
        };
        let argv = argv.to_vec();

        info!(
            device = %identifier,
            function = %event.function,
            user = %event.user,
            sequence = %event.sequence,
            "scan button pressed"
        );
        self.inflight.insert(event.sequence.clone());
        let id = self.supervisor.spawn(
            ProcessKind::Script {
                sequence: event.sequence,
            },
            argv,
            self.script_delay,
        );
        DatagramOutcome::Spawned(id)
    }

    /// Issue one registration request per configured action of `device`.
    pub fn handle_timer(&mut self, device: IpAddr) -> Vec<ProcessId> {
        let commands = commands_for(
            &self.registry,
            device,
            self.advertised,
            self.cycle,
            &self.registration_tool,
        );
        debug!(%device, requests = commands.len(), "registration round");

        commands
            .into_iter()
            .map(|argv| {
                self.supervisor
                    .spawn(ProcessKind::Registration { device }, argv, Duration::ZERO)
            })
            .collect()
    }

    /// Reap a finished child and release its sequence token.
    pub fn handle_completion(&mut self, completion: Completion) -> Option<Reaped> {
        let reaped = self.supervisor.reap(completion)?;
        self.release(&reaped);
        Some(reaped)
    }

    pub async fn next_completion(&mut self) -> Completion {
        self.supervisor.next_completion().await
    }

    /// Terminate and reap everything still running.
    pub async fn drain(&mut self) -> Vec<Reaped> {
        let reaped = self.supervisor.drain_all().await;
        for process in &reaped {
            self.release(process);
        }
        reaped
    }

    fn release(&mut self, reaped: &Reaped) {
        if let ProcessKind::Script { sequence } = &reaped.kind {
            self.inflight.remove(sequence);
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn advertised(&self) -> SocketAddr {
        self.advertised
    }
}

// ── Reactor ──────────────────────────────────────────────────────────

pub struct Reactor {
    dispatcher: Dispatcher,
    scheduler: RegistrationScheduler,
    socket: UdpSocket,
    buffer: Vec<u8>,
    terminate: Signal,
    interrupt: Signal,
    shutdown: CancellationToken,
    marker: Option<LivenessMarker>,
    state: ReactorState,
}

impl Reactor {
    /// Build the registry, bind, write the liveness marker and arm timers.
    ///
    /// Assumes the marker has been checked absent and privileges are already
    /// what they should be. Refuses to start with no usable device or action.
    pub async fn start(config: DispatcherConfig) -> Result<Self, CoreError> {
        if config.cycle.is_zero() {
            return Err(CoreError::Config {
                message: "registration cycle must be non-zero".into(),
            });
        }
        let registry = DeviceRegistry::from_config(&config.devices)?;

        let terminate = install(SignalKind::terminate(), "SIGTERM")?;
        let interrupt = install(SignalKind::interrupt(), "SIGINT")?;

        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| CoreError::Bind {
                addr: config.bind,
                source,
            })?;
        let advertised = socket.local_addr().map_err(|source| CoreError::Bind {
            addr: config.bind,
            source,
        })?;
        let marker = LivenessMarker::create(&config.liveness_marker)?;

        let mut scheduler = RegistrationScheduler::new(config.initial_delay, config.cycle);
        for device in registry.devices() {
            if registry.registrations(device.address).next().is_some() {
                scheduler.arm(device.address);
            } else {
                debug!(address = %device.address, "device has no actions, not registering");
            }
        }

        info!(
            %advertised,
            devices = registry.device_count(),
            actions = registry.action_count(),
            timers = scheduler.len(),
            "dispatcher running"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(registry, advertised, &config),
            scheduler,
            socket,
            buffer: vec![0; config.buffer_size.max(1)],
            terminate,
            interrupt,
            shutdown: CancellationToken::new(),
            marker: Some(marker),
            state: ReactorState::Running,
        })
    }

    /// Address the notification socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.dispatcher.advertised()
    }

    /// Cancelling the returned token is treated exactly like SIGTERM.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    /// Run until a termination request, then drain and stop.
    ///
    /// An event-source failure also drains (best effort) before it is
    /// returned.
    pub async fn run(mut self) -> Result<(), CoreError> {
        let mut failure = None;

        while self.state == ReactorState::Running {
            let event = self.next_event().await;
            if let Err(e) = self.dispatch(event) {
                error!(error = %e, "reactor failed, shutting down");
                failure = Some(e);
                break;
            }
        }

        self.state = ReactorState::Draining;
        let reaped = self.dispatcher.drain().await;
        debug!(reaped = reaped.len(), "drain complete");

        if let Some(marker) = self.marker.take() {
            if let Err(e) = marker.remove() {
                warn!(error = %e, "could not remove liveness marker");
            }
        }
        self.state = ReactorState::Stopped;
        info!("dispatcher stopped");

        failure.map_or(Ok(()), Err)
    }

    /// Block until something is ready. No timeout, no priority.
    async fn next_event(&mut self) -> ReactorEvent {
        tokio::select! {
            received = self.socket.recv_from(&mut self.buffer) => match received {
                Ok((len, from)) => ReactorEvent::Datagram { len, from },
                Err(e) => ReactorEvent::RecvFailed(e),
            },
            device = self.scheduler.next_due() => ReactorEvent::Timer(device),
            completion = self.dispatcher.next_completion() => ReactorEvent::Process(completion),
            received = self.terminate.recv() => match received {
                Some(()) => ReactorEvent::Signal(ShutdownSignal::Terminate),
                None => ReactorEvent::SignalSourceClosed("SIGTERM"),
            },
            received = self.interrupt.recv() => match received {
                Some(()) => ReactorEvent::Signal(ShutdownSignal::Interrupt),
                None => ReactorEvent::SignalSourceClosed("SIGINT"),
            },
            () = self.shutdown.cancelled() => ReactorEvent::Signal(ShutdownSignal::Requested),
        }
    }

    fn dispatch(&mut self, event: ReactorEvent) -> Result<(), CoreError> {
        trace!(?event, "reactor event");
        match event {
            ReactorEvent::Datagram { len, from } => {
                if len == self.buffer.len() {
                    debug!(%from, len, "datagram filled the receive buffer, may be truncated");
                }
                self.dispatcher.handle_datagram(&self.buffer[..len], from);
            }
            ReactorEvent::RecvFailed(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            ReactorEvent::RecvFailed(e) => {
                error!(error = %e, "receiving datagram failed");
            }
            ReactorEvent::Timer(device) => {
                self.dispatcher.handle_timer(device);
            }
            ReactorEvent::Process(completion) => {
                self.dispatcher.handle_completion(completion);
            }
            ReactorEvent::Signal(ShutdownSignal::Interrupt) => {
                info!("SIGINT received, ignoring (send SIGTERM to stop)");
            }
            ReactorEvent::Signal(source) => {
                info!(?source, "termination requested, draining");
                self.state = ReactorState::Draining;
            }
            ReactorEvent::SignalSourceClosed(signal) => {
                return Err(CoreError::EventSource {
                    message: format!("{signal} stream closed"),
                });
            }
        }
        Ok(())
    }
}

fn install(kind: SignalKind, name: &'static str) -> Result<Signal, CoreError> {
    signal(kind).map_err(|source| CoreError::Signal {
        signal: name,
        source,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;
    use crate::config::DeviceConfig;
    use crate::model::ActionCategory;
    use crate::supervisor::ExitOutcome;

    const DEVICE: &str = "192.0.2.10";
    const BOUND: &str = "203.0.113.5:54925";

    fn press(seq: &str) -> Vec<u8> {
        format!(
            "\x02\x00TYPE=BR;BUTTON=SCAN;USER=\"PDF ADF\";FUNC=FILE;HOST={BOUND};APPNUM=5;SEQ={seq};"
        )
        .into_bytes()
    }

    fn from() -> SocketAddr {
        SocketAddr::new(DEVICE.parse().unwrap(), 54925)
    }

    fn write_script(dir: &Path, body: &str) -> String {
        let path = dir.join("action.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn dispatcher(script: &str) -> Dispatcher {
        let config = DispatcherConfig {
            script_delay: Duration::ZERO,
            registration_tool: PathBuf::from(script),
            devices: vec![DeviceConfig {
                address: DEVICE.parse().unwrap(),
                identifier: "MFC-1".into(),
                actions: BTreeMap::from([
                    (
                        ActionCategory::File,
                        BTreeMap::from([("PDF ADF".to_owned(), vec![script.to_owned(), "--pdf".into()])]),
                    ),
                    (
                        ActionCategory::Image,
                        BTreeMap::from([("Photo".to_owned(), vec![script.to_owned()])]),
                    ),
                ]),
            }],
            ..DispatcherConfig::default()
        };
        let registry = DeviceRegistry::from_config(&config.devices).unwrap();
        Dispatcher::new(registry, BOUND.parse().unwrap(), &config)
    }

    #[tokio::test]
    async fn well_formed_press_spawns_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let script = write_script(dir.path(), &format!("echo \"$@\" > {}", out.display()));
        let mut dispatcher = dispatcher(&script);

        let outcome = dispatcher.handle_datagram(&press("7"), from());
        assert!(matches!(outcome, DatagramOutcome::Spawned(_)));
        assert!(dispatcher.inflight().contains("7"));

        let completion = dispatcher.next_completion().await;
        let reaped = dispatcher.handle_completion(completion).unwrap();
        assert!(matches!(reaped.outcome, ExitOutcome::Exited(s) if s.success()));
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "MFC-1 --pdf");
        assert!(dispatcher.inflight().is_empty());
    }

    #[tokio::test]
    async fn duplicate_is_dropped_until_reaped_then_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 0");
        let mut dispatcher = dispatcher(&script);

        assert!(matches!(
            dispatcher.handle_datagram(&press("7"), from()),
            DatagramOutcome::Spawned(_)
        ));
        assert_eq!(
            dispatcher.handle_datagram(&press("7"), from()),
            DatagramOutcome::Duplicate
        );
        assert_eq!(dispatcher.supervisor().len(), 1);

        let completion = dispatcher.next_completion().await;
        dispatcher.handle_completion(completion);

        assert!(matches!(
            dispatcher.handle_datagram(&press("7"), from()),
            DatagramOutcome::Spawned(_)
        ));
    }

    #[tokio::test]
    async fn mismatched_appnum_is_rejected_without_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 0");
        let mut dispatcher = dispatcher(&script);

        let datagram = String::from_utf8(press("7")).unwrap().replace("APPNUM=5", "APPNUM=3");
        assert!(matches!(
            dispatcher.handle_datagram(datagram.as_bytes(), from()),
            DatagramOutcome::Rejected(Rejection::AppNumMismatch { .. })
        ));
        assert!(dispatcher.supervisor().is_empty());
        assert!(dispatcher.inflight().is_empty());
    }

    #[tokio::test]
    async fn unknown_sender_and_unconfigured_label_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 0");
        let mut dispatcher = dispatcher(&script);

        let stranger = SocketAddr::new("192.0.2.99".parse().unwrap(), 54925);
        assert_eq!(
            dispatcher.handle_datagram(&press("7"), stranger),
            DatagramOutcome::UnknownDevice
        );

        let other_label = String::from_utf8(press("8")).unwrap().replace("PDF ADF", "JPEG");
        assert_eq!(
            dispatcher.handle_datagram(other_label.as_bytes(), from()),
            DatagramOutcome::Unconfigured
        );
        assert!(dispatcher.supervisor().is_empty());
        assert!(dispatcher.inflight().is_empty());
    }

    #[tokio::test]
    async fn timer_issues_one_request_per_action() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("requests");
        let script = write_script(dir.path(), &format!("echo \"$8\" >> {}", out.display()));
        let mut dispatcher = dispatcher(&script);

        let ids = dispatcher.handle_timer(DEVICE.parse().unwrap());
        assert_eq!(ids.len(), 2);
        assert!(
            dispatcher
                .supervisor()
                .kinds()
                .all(|kind| matches!(kind, ProcessKind::Registration { .. }))
        );

        for _ in 0..2 {
            let completion = dispatcher.next_completion().await;
            dispatcher.handle_completion(completion);
        }
        let payloads = std::fs::read_to_string(&out).unwrap();
        assert_eq!(payloads.lines().count(), 2);
        assert!(payloads.contains("FUNC=FILE;HOST=203.0.113.5:54925;APPNUM=5;DURATION=300;"));
        assert!(payloads.contains("USER=\"Photo\";FUNC=IMAGE"));
    }

    #[tokio::test]
    async fn drain_releases_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exec sleep 30");
        let mut dispatcher = dispatcher(&script);

        dispatcher.handle_datagram(&press("1"), from());
        dispatcher.handle_datagram(&press("2"), from());
        dispatcher.handle_timer(DEVICE.parse().unwrap());
        assert_eq!(dispatcher.supervisor().len(), 4);
        assert_eq!(dispatcher.inflight().len(), 2);

        let reaped = dispatcher.drain().await;
        assert_eq!(reaped.len(), 4);
        assert!(dispatcher.supervisor().is_empty());
        assert!(dispatcher.inflight().is_empty());
    }
}
