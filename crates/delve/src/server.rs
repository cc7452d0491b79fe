//! The reactor and the `DelveServer` run loop.
//!
//! [`Reactor`] owns the whole server state: the session table, the
//! simulation, the dispatch tables, and the pending contacts. It has no
//! async code and no clock of its own; [`Reactor::run_tick`] does one full
//! turn, which makes it easy to drive from tests.
//!
//! [`DelveServer`] wraps a reactor with a TCP accept task and a
//! [`TurnClock`]:
//!
//! ```text
//!  accept task ──mpsc──→ run loop: wait_for_turn → run_tick → record_turn_end
//!  (tokio::spawn)               (single owner of all sessions)
//! ```

use delve_command::{DispatchSettings, Dispatcher, Simulation, lifecycle, screen};
use delve_session::{AccountValidator, AllowAll, SessionState, SessionStore, TimeoutTicks};
use delve_tick::TurnClock;
use delve_transport::{Connection, TcpTransport, Transport};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::console::{self, ConsoleEffect};
use crate::listener::{ContactPolicy, Listener};
use crate::{DelveError, ServerConfig, net};

/// Reason given to every session still open when the server stops.
pub const REASON_SHUTDOWN: &str = "Server shutdown";

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    pub opened: usize,
    pub reaped: usize,
    pub executed: usize,
    pub deferred: usize,
}

// ---------------------------------------------------------------------------
// Reactor
// ---------------------------------------------------------------------------

/// Single owner of every session. One call to [`run_tick`](Self::run_tick)
/// per turn.
pub struct Reactor<S: Simulation, A: AccountValidator = AllowAll> {
    config: ServerConfig,
    timeouts: TimeoutTicks,
    policy: ContactPolicy,
    store: SessionStore,
    sim: S,
    accounts: A,
    dispatcher: Dispatcher<S>,
    listener: Listener,
    shutdown_requested: bool,
}

impl<S: Simulation, A: AccountValidator> Reactor<S, A> {
    pub fn new(config: ServerConfig, sim: S, accounts: A) -> Result<Self, DelveError> {
        let config = config.validated();
        let timeouts = config.session.to_ticks(config.fps);
        let dispatcher = Dispatcher::new(DispatchSettings {
            timeouts,
            visual_table_size: config.visual_table_size,
        })?;
        Ok(Self {
            timeouts,
            policy: ContactPolicy {
                console_password: config.console_password.clone(),
                console_local_only: config.console_local_only,
                max_inbound_bytes: config.max_inbound_bytes,
            },
            store: SessionStore::new(config.max_sessions),
            sim,
            accounts,
            dispatcher,
            listener: Listener::new(),
            shutdown_requested: false,
            config,
        })
    }

    /// Runs one turn.
    ///
    /// Phases, in order: accept, contacts, reap, input and dispatch,
    /// simulation, output.
    pub fn run_tick<I>(&mut self, now: u64, incoming: I) -> TickReport
    where
        I: IntoIterator<Item = Box<dyn Connection>>,
    {
        let mut report = TickReport::default();

        for conn in incoming {
            self.listener.add(conn, now);
            report.accepted += 1;
        }

        report.opened = self.listener.poll(
            now,
            &mut self.store,
            &self.accounts,
            &self.policy,
            &self.timeouts,
        );

        report.reaped = lifecycle::reap(&mut self.store, &mut self.sim, now);

        for id in self.store.ids() {
            let closed = net::read_input(
                &mut self.store,
                &mut self.sim,
                id,
                now,
                self.config.max_inbound_bytes,
            );
            match self.store.get(id).map(|s| s.state()) {
                Some(SessionState::Setup | SessionState::Playing) => {
                    let outcome = self.dispatcher.process_pending_commands(
                        &mut self.store,
                        &mut self.sim,
                        id,
                        now,
                    );
                    report.executed += outcome.executed;
                    report.deferred += outcome.deferred;
                }
                Some(SessionState::Console) => {
                    let effect = console::process_console(
                        &mut self.store,
                        &mut self.sim,
                        id,
                        self.config.console_password.as_deref(),
                    );
                    if effect == ConsoleEffect::Shutdown {
                        self.shutdown_requested = true;
                    }
                }
                _ => {}
            }
            if let Some(reason) = closed {
                lifecycle::do_quit(
                    &mut self.store,
                    &mut self.sim,
                    id,
                    now,
                    self.timeouts.quit,
                    reason,
                );
            }
        }

        self.sim.advance(now);

        screen::render_screens(&mut self.store, &mut self.sim);
        for id in self.store.ids() {
            net::flush_output(&mut self.store, &mut self.sim, id);
        }

        trace!(turn = now, sessions = self.store.len(), "tick");
        report
    }

    /// Destroys every session with `reason` and drops pending contacts.
    pub fn shutdown(&mut self, reason: &str) {
        info!(sessions = self.store.len(), reason, "shutting down");
        lifecycle::destroy_all(&mut self.store, &mut self.sim, reason);
        self.listener = Listener::new();
    }

    /// Set once a console has asked the server to stop.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &TimeoutTicks {
        &self.timeouts
    }

    /// Sockets still waiting for their contact record.
    pub fn pending_contacts(&self) -> usize {
        self.listener.len()
    }
}

// ---------------------------------------------------------------------------
// DelveServer
// ---------------------------------------------------------------------------

/// Builder for [`DelveServer`].
///
/// # Example
///
/// ```rust,ignore
/// use delve::prelude::*;
///
/// let server = DelveServer::builder(MyWorld::new())
///     .config(ServerConfig::load("delve.json")?)
///     .build()
///     .await?;
/// server.run().await?;
/// ```
pub struct DelveServerBuilder<S: Simulation, A: AccountValidator = AllowAll> {
    sim: S,
    config: ServerConfig,
    accounts: A,
}

impl<S: Simulation> DelveServerBuilder<S> {
    pub fn new(sim: S) -> Self {
        Self {
            sim,
            config: ServerConfig::default(),
            accounts: AllowAll::default(),
        }
    }
}

impl<S: Simulation, A: AccountValidator> DelveServerBuilder<S, A> {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the bind address from the configuration.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_owned();
        self
    }

    /// Replaces the account validator.
    pub fn accounts<B: AccountValidator>(self, accounts: B) -> DelveServerBuilder<S, B> {
        DelveServerBuilder {
            sim: self.sim,
            config: self.config,
            accounts,
        }
    }

    /// Binds the listener and builds the reactor.
    pub async fn build(self) -> Result<DelveServer<S, A>, DelveError> {
        let reactor = Reactor::new(self.config, self.sim, self.accounts)?;
        let transport = TcpTransport::bind(&reactor.config().bind_addr).await?;
        let clock = TurnClock::new(reactor.config().turn_config());
        Ok(DelveServer {
            transport,
            reactor,
            clock,
        })
    }
}

/// A bound server. Call [`run`](Self::run) to start turning.
pub struct DelveServer<S: Simulation, A: AccountValidator = AllowAll> {
    transport: TcpTransport,
    reactor: Reactor<S, A>,
    clock: TurnClock,
}

impl<S: Simulation> DelveServer<S> {
    pub fn builder(sim: S) -> DelveServerBuilder<S> {
        DelveServerBuilder::new(sim)
    }
}

impl<S: Simulation, A: AccountValidator> DelveServer<S, A> {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs until a console asks for shutdown, then closes every session.
    ///
    /// Returns the final reactor so callers can inspect the world.
    pub async fn run(self) -> Result<Reactor<S, A>, DelveError> {
        let Self {
            mut transport,
            mut reactor,
            mut clock,
        } = self;
        info!(
            addr = ?transport.local_addr().ok(),
            fps = clock.fps(),
            overrun = ?reactor.config().overrun,
            capacity = reactor.store().capacity(),
            "Delve server running"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Box<dyn Connection>>();
        let acceptor = tokio::spawn(async move {
            loop {
                match transport.accept().await {
                    Ok(conn) => {
                        if tx.send(Box::new(conn)).is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
        });

        while !reactor.is_shutdown_requested() {
            let turn = clock.wait_for_turn().await;
            let mut accepted = Vec::new();
            while let Ok(conn) = rx.try_recv() {
                accepted.push(conn);
            }
            let report = reactor.run_tick(turn.number, accepted);
            if report.accepted > 0 || report.reaped > 0 {
                debug!(turn = turn.number, ?report, "tick");
            }
            clock.record_turn_end();
        }

        acceptor.abort();
        reactor.shutdown(REASON_SHUTDOWN);
        let stats = clock.stats();
        info!(
            turns = stats.turns,
            late = stats.late_turns,
            skipped = stats.skipped_turns,
            max_turn_ms = stats.max_turn_time.as_secs_f64() * 1000.0,
            "Delve server stopped"
        );
        Ok(reactor)
    }
}
