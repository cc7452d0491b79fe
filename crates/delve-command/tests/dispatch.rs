//! Integration tests for command dispatch, the energy gate, and teardown.
//!
//! These drive `Dispatcher::process_pending_commands` directly over a real
//! `SessionStore` backed by in-memory connections, with a small fake
//! simulation standing in for the game world.

use delve_command::{
    DispatchSettings, Dispatcher, Execution, ProcessOutcome, ScreenLimits, Simulation, chat,
    lifecycle,
};
use delve_protocol::{
    Action, Cell, ClientPacket, RleMode, ServerPacket, StatusCode, VisualKind, decode_server_stream,
};
use delve_session::{
    AccountInfo, Credentials, EntityId, SessionConfig, SessionId, SessionState, SessionStore,
};
use delve_transport::memory::{self, MemoryPeer};
use proptest::prelude::*;

// =========================================================================
// Fake simulation
// =========================================================================

const WALK_COST: u32 = 100;

#[derive(Default)]
struct FakeSim {
    owners: Vec<SessionId>,
    energy: Vec<u32>,
    executed: Vec<(EntityId, Action)>,
    safe: bool,
    limits: ScreenLimits,
    refuse_attach: bool,
}

impl FakeSim {
    fn give_energy(&mut self, entity: EntityId, amount: u32) {
        self.energy[entity.0 as usize] += amount;
    }
}

impl Simulation for FakeSim {
    fn has_energy(&self, entity: EntityId) -> bool {
        self.energy[entity.0 as usize] >= WALK_COST
    }

    fn try_execute(&mut self, entity: EntityId, action: &Action) -> Execution {
        self.energy[entity.0 as usize] -= WALK_COST;
        self.executed.push((entity, *action));
        Execution::Executed
    }

    fn attach_entity(&mut self, session: SessionId, _nick: &str) -> Result<EntityId, String> {
        if self.refuse_attach {
            return Err("World is closed".into());
        }
        self.owners.push(session);
        self.energy.push(0);
        Ok(EntityId(self.owners.len() as u32 - 1))
    }

    fn detach_entity(&mut self, entity: EntityId) -> Option<EntityId> {
        let index = entity.0 as usize;
        let last = self.owners.len() - 1;
        self.owners.swap_remove(index);
        self.energy.swap_remove(index);
        (index != last).then_some(EntityId(last as u32))
    }

    fn entity_is_in_safe_location(&self, _entity: EntityId) -> bool {
        self.safe
    }

    fn advance(&mut self, _turn: u64) {
        for e in &mut self.energy {
            *e += 25;
        }
    }

    fn screen_limits(&self) -> ScreenLimits {
        self.limits
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct World {
    store: SessionStore,
    sim: FakeSim,
    dispatcher: Dispatcher<FakeSim>,
    now: u64,
}

impl World {
    fn new(capacity: usize) -> Self {
        let settings = DispatchSettings {
            timeouts: SessionConfig::default().to_ticks(10),
            visual_table_size: 8,
        };
        Self {
            store: SessionStore::new(capacity),
            sim: FakeSim::default(),
            dispatcher: Dispatcher::new(settings).unwrap(),
            now: 0,
        }
    }

    /// Opens a `SETUP` session. The account id defaults to one per nick.
    fn connect(&mut self, nick: &str, account_id: u32) -> (SessionId, MemoryPeer) {
        let (conn, peer) = memory::pair();
        let id = self
            .store
            .open(
                SessionState::Setup,
                Box::new(conn),
                Credentials {
                    nick: nick.into(),
                    real: "tester".into(),
                    host: "localhost".into(),
                    ..Default::default()
                },
                AccountInfo {
                    account_id,
                    characters: 1,
                    max_characters: 1,
                },
                self.now,
                self.dispatcher.settings().timeouts.setup,
            )
            .unwrap();
        (id, peer)
    }

    fn feed(&mut self, id: SessionId, packets: &[ClientPacket]) {
        let session = self.store.get_mut(id).unwrap();
        for p in packets {
            p.encode(&mut session.inbound);
        }
    }

    fn process(&mut self, id: SessionId) -> ProcessOutcome {
        self.dispatcher
            .process_pending_commands(&mut self.store, &mut self.sim, id, self.now)
    }

    /// Connects and enters play with an 80x24 classic screen.
    fn join(&mut self, nick: &str, account_id: u32) -> (SessionId, MemoryPeer, EntityId) {
        let (id, peer) = self.connect(nick, account_id);
        self.feed(id, &[setup(80, 24), ClientPacket::Play]);
        let outcome = self.process(id);
        assert!(!outcome.destroyed);
        let entity = self.store.entity_for_session(id).unwrap();
        self.store.get_mut(id).unwrap().outbound.clear();
        (id, peer, entity)
    }

    fn take_outbound(&mut self, id: SessionId) -> Vec<ServerPacket> {
        let session = self.store.get_mut(id).unwrap();
        let mode = session.rle_mode();
        decode_server_stream(&std::mem::take(&mut session.outbound), mode).unwrap()
    }

    fn state(&self, id: SessionId) -> Option<SessionState> {
        self.store.get(id).map(|s| s.state())
    }
}

fn setup(cols: u16, rows: u16) -> ClientPacket {
    ClientPacket::ClientSetup {
        cols,
        rows,
        rle: RleMode::Classic,
    }
}

fn walk(dir: u8) -> ClientPacket {
    ClientPacket::Action(Action::Walk { dir })
}

fn quit_reason(peer: &MemoryPeer) -> Option<String> {
    decode_server_stream(&peer.take_received(), RleMode::None)
        .ok()?
        .into_iter()
        .find_map(|p| match p {
            ServerPacket::Quit { reason } => Some(reason),
            _ => None,
        })
}

// =========================================================================
// Energy gate
// =========================================================================

#[test]
fn test_walk_at_zero_energy_deferred_then_executes_once() {
    let mut w = World::new(4);
    let (id, _peer, entity) = w.join("Frodo", 1);

    w.feed(id, &[walk(6)]);
    let outcome = w.process(id);
    assert_eq!(outcome.deferred, 1);
    assert!(w.sim.executed.is_empty());

    // Next tick: the walk is at the head of the retry queue, still no energy.
    let retry = &w.store.get(id).unwrap().retry;
    assert_eq!(retry.len(), 1);
    assert_eq!(retry.front().unwrap().tag(), 10);
    assert_eq!(retry.front().unwrap().raw_args(), &[6]);
    w.process(id);
    assert!(w.sim.executed.is_empty());

    w.sim.give_energy(entity, WALK_COST);
    let outcome = w.process(id);
    assert_eq!(outcome.executed, 1);
    assert_eq!(w.sim.executed, vec![(entity, Action::Walk { dir: 6 })]);
    assert!(w.store.get(id).unwrap().retry.is_empty());

    w.sim.give_energy(entity, WALK_COST);
    w.process(id);
    assert_eq!(w.sim.executed.len(), 1);
}

#[test]
fn test_deferred_command_stays_byte_identical() {
    let mut w = World::new(2);
    let (id, _peer, _) = w.join("Sam", 1);
    let cast = ClientPacket::Action(Action::Cast {
        book: 2,
        spell: 7,
        dir: 5,
    });
    let mut expected = Vec::new();
    cast.encode(&mut expected);

    w.feed(id, &[cast]);
    for _ in 0..5 {
        w.process(id);
        let mut queued = Vec::new();
        for command in w.store.get(id).unwrap().retry.iter() {
            command.write_to(&mut queued);
        }
        assert_eq!(queued, expected);
    }
}

#[test]
fn test_free_commands_run_while_consuming_commands_wait() {
    let mut w = World::new(2);
    let (id, _peer, entity) = w.join("Pippin", 1);

    w.feed(
        id,
        &[
            walk(1),
            ClientPacket::Keepalive { stamp: 99 },
            walk(2),
            ClientPacket::Redraw,
        ],
    );
    let outcome = w.process(id);
    assert_eq!(outcome.deferred, 2);
    assert_eq!(outcome.executed, 2);
    assert_eq!(
        w.take_outbound(id),
        vec![ServerPacket::Keepalive { stamp: 99 }]
    );

    // Energy for exactly one walk: the first one runs, the second waits.
    w.sim.give_energy(entity, WALK_COST);
    w.process(id);
    assert_eq!(w.sim.executed, vec![(entity, Action::Walk { dir: 1 })]);

    w.sim.give_energy(entity, WALK_COST);
    w.process(id);
    assert_eq!(
        w.sim.executed,
        vec![
            (entity, Action::Walk { dir: 1 }),
            (entity, Action::Walk { dir: 2 })
        ]
    );
}

#[test]
fn test_incomplete_packet_kept_for_next_tick() {
    let mut w = World::new(2);
    let (id, _peer, entity) = w.join("Merry", 1);
    w.sim.give_energy(entity, WALK_COST);

    let mut bytes = Vec::new();
    ClientPacket::Action(Action::UseItem { item: -3, dir: 4 }).encode(&mut bytes);
    w.store.get_mut(id).unwrap().inbound.extend_from_slice(&bytes[..2]);
    let outcome = w.process(id);
    assert_eq!(outcome, ProcessOutcome::default());
    assert_eq!(w.store.get(id).unwrap().inbound, bytes[..2]);

    w.store.get_mut(id).unwrap().inbound.extend_from_slice(&bytes[2..]);
    assert_eq!(w.process(id).executed, 1);
    assert_eq!(
        w.sim.executed,
        vec![(entity, Action::UseItem { item: -3, dir: 4 })]
    );
}

// =========================================================================
// State tables
// =========================================================================

#[test]
fn test_playing_packet_in_setup_destroys_without_running() {
    let mut w = World::new(2);
    let (id, peer) = w.connect("Gimli", 1);
    w.feed(id, &[walk(3)]);
    let outcome = w.process(id);
    assert!(outcome.destroyed);
    assert!(w.sim.executed.is_empty());
    assert_eq!(w.state(id), None);
    assert_eq!(quit_reason(&peer).as_deref(), Some("Walk not allowed in SETUP"));
    assert!(peer.is_closed_by_server());
}

#[test]
fn test_setup_packet_in_playing_destroys() {
    let mut w = World::new(2);
    let (id, _peer, _) = w.join("Legolas", 1);
    w.feed(id, &[setup(100, 40)]);
    assert!(w.process(id).destroyed);
    assert!(w.sim.owners.is_empty());
}

#[test]
fn test_unknown_tag_destroys() {
    let mut w = World::new(2);
    let (id, peer) = w.connect("Boromir", 1);
    w.store.get_mut(id).unwrap().inbound.push(0xee);
    assert!(w.process(id).destroyed);
    assert_eq!(quit_reason(&peer).as_deref(), Some("Unknown packet type"));
}

#[test]
fn test_end_marker_is_ignored() {
    let mut w = World::new(2);
    let (id, _peer) = w.connect("Faramir", 1);
    w.feed(id, &[ClientPacket::End, ClientPacket::End]);
    let outcome = w.process(id);
    assert_eq!(outcome.ignored, 2);
    assert_eq!(w.state(id), Some(SessionState::Setup));
}

#[test]
fn test_visuals_out_of_range_destroys() {
    let mut w = World::new(2);
    let (id, _peer) = w.connect("Eomer", 1);
    w.feed(
        id,
        &[ClientPacket::Visuals {
            kind: VisualKind::Monster,
            offset: 6,
            entries: vec![Cell::new(1, b'o'); 3],
        }],
    );
    assert!(w.process(id).destroyed);
}

#[test]
fn test_visuals_fill_table() {
    let mut w = World::new(2);
    let (id, _peer) = w.connect("Eowyn", 1);
    w.feed(
        id,
        &[ClientPacket::Visuals {
            kind: VisualKind::Object,
            offset: 2,
            entries: vec![Cell::new(3, b'!')],
        }],
    );
    assert_eq!(w.process(id).executed, 1);
    let visuals = w.store.get(id).unwrap().visuals().unwrap();
    assert_eq!(visuals.get(VisualKind::Object, 2), Some(Cell::new(3, b'!')));
}

// =========================================================================
// Enter play
// =========================================================================

#[test]
fn test_play_success_binds_entity_and_replies() {
    let mut w = World::new(2);
    let (id, _peer) = w.connect("Aragorn", 1);
    w.feed(id, &[setup(80, 24), ClientPacket::Play]);
    w.process(id);

    assert_eq!(w.state(id), Some(SessionState::Playing));
    assert_eq!(w.store.entity_for_session(id), Some(EntityId(0)));
    assert!(w.store.get(id).unwrap().redraw_pending);
    assert_eq!(
        w.take_outbound(id),
        vec![ServerPacket::Play {
            status: StatusCode::Success
        }]
    );
}

#[test]
fn test_play_without_setup_destroys() {
    let mut w = World::new(2);
    let (id, peer) = w.connect("Bilbo", 1);
    w.feed(id, &[ClientPacket::Play]);
    assert!(w.process(id).destroyed);
    assert_eq!(quit_reason(&peer).as_deref(), Some("Client setup missing"));
}

#[test]
fn test_play_incompatible_screen_size_reason() {
    let mut w = World::new(2);
    let (id, peer) = w.connect("Bilbo", 1);
    w.feed(id, &[setup(60, 20), ClientPacket::Play]);
    assert!(w.process(id).destroyed);
    assert_eq!(
        quit_reason(&peer).as_deref(),
        Some("Incompatible screen size 60x20 (min 80x24, max 255x255)")
    );
}

#[test]
fn test_play_attach_refused_destroys() {
    let mut w = World::new(2);
    w.sim.refuse_attach = true;
    let (id, peer) = w.connect("Bilbo", 1);
    w.feed(id, &[setup(80, 24), ClientPacket::Play]);
    assert!(w.process(id).destroyed);
    assert_eq!(quit_reason(&peer).as_deref(), Some("World is closed"));
}

#[test]
fn test_play_same_account_resumes_connection() {
    let mut w = World::new(3);
    let (old, old_peer, _) = w.join("Gandalf", 7);
    let (new, _new_peer) = w.connect("gandalf", 7);
    w.feed(new, &[setup(80, 24), ClientPacket::Play]);
    w.process(new);

    assert_eq!(w.state(old), None);
    assert_eq!(quit_reason(&old_peer).as_deref(), Some("Resume connection"));
    assert_eq!(w.state(new), Some(SessionState::Playing));
    assert_eq!(w.sim.owners, vec![new]);
}

#[test]
fn test_play_name_in_use_by_other_account() {
    let mut w = World::new(3);
    let (old, _old_peer, _) = w.join("Gandalf", 7);
    let (new, new_peer) = w.connect("Gandalf", 8);
    w.feed(new, &[setup(80, 24), ClientPacket::Play]);
    assert!(w.process(new).destroyed);
    assert_eq!(quit_reason(&new_peer).as_deref(), Some("Name already in use"));
    assert_eq!(w.state(old), Some(SessionState::Playing));
}

// =========================================================================
// Quit, reap, and relocation
// =========================================================================

#[test]
fn test_quit_outside_safe_location_lingers() {
    let mut w = World::new(2);
    let (id, peer, entity) = w.join("Smeagol", 1);
    w.now = 100;
    w.feed(id, &[ClientPacket::Quit]);
    w.process(id);

    assert_eq!(w.state(id), Some(SessionState::Quit));
    assert!(peer.is_closed_by_server());
    assert_eq!(w.store.lingering_entity(id), Some(entity));

    let quit = w.dispatcher.settings().timeouts.quit;
    assert_eq!(lifecycle::reap(&mut w.store, &mut w.sim, 100 + quit), 0);
    assert_eq!(lifecycle::reap(&mut w.store, &mut w.sim, 100 + quit + 1), 1);
    assert_eq!(w.state(id), None);
    assert!(w.sim.owners.is_empty());
}

#[test]
fn test_quit_in_safe_location_destroys_at_once() {
    let mut w = World::new(2);
    w.sim.safe = true;
    let (id, peer, _) = w.join("Rosie", 1);
    w.feed(id, &[ClientPacket::Quit]);
    assert!(w.process(id).destroyed);
    assert_eq!(quit_reason(&peer).as_deref(), Some("Client quit"));
    assert!(w.sim.owners.is_empty());
}

#[test]
fn test_setup_session_reaped_on_tick_that_crosses_timeout() {
    let mut w = World::new(2);
    let (id, peer) = w.connect("Lobelia", 1);
    let limit = w.dispatcher.settings().timeouts.setup;

    assert_eq!(lifecycle::reap(&mut w.store, &mut w.sim, limit), 0);
    assert_eq!(w.state(id), Some(SessionState::Setup));
    assert_eq!(lifecycle::reap(&mut w.store, &mut w.sim, limit + 1), 1);
    assert_eq!(w.state(id), None);
    assert_eq!(quit_reason(&peer).as_deref(), Some("Timeout"));
}

#[test]
fn test_destroy_relocates_moved_entity_binding() {
    let mut w = World::new(3);
    let (a, _pa, ea) = w.join("Anborn", 1);
    let (b, _pb, eb) = w.join("Beregond", 2);
    assert_eq!((ea, eb), (EntityId(0), EntityId(1)));

    lifecycle::destroy(&mut w.store, &mut w.sim, a, "Kicked");
    assert_eq!(w.store.entity_for_session(b), Some(EntityId(0)));
    assert_eq!(w.sim.owners, vec![b]);

    // The relocated entity still acts for the right session.
    w.sim.give_energy(EntityId(0), WALK_COST);
    w.feed(b, &[walk(8)]);
    w.process(b);
    assert_eq!(w.sim.executed, vec![(EntityId(0), Action::Walk { dir: 8 })]);
}

// =========================================================================
// Chat
// =========================================================================

#[test]
fn test_chat_reaches_playing_sessions_only() {
    let mut w = World::new(3);
    let (a, _pa, _) = w.join("Haldir", 1);
    let (b, _pb, _) = w.join("Celeborn", 2);
    let (c, _pc) = w.connect("Galadriel", 3);

    w.feed(a, &[ClientPacket::Message { text: "mae govannen".into() }]);
    w.process(a);

    let line = ServerPacket::Message {
        text: "Haldir: mae govannen".into(),
    };
    assert_eq!(w.take_outbound(a), vec![line.clone()]);
    assert_eq!(w.take_outbound(b), vec![line]);
    assert!(w.store.get(c).unwrap().outbound.is_empty());
}

#[test]
fn test_chat_blank_message_ignored() {
    let mut w = World::new(2);
    let (a, _pa, _) = w.join("Haldir", 1);
    w.feed(a, &[ClientPacket::Message { text: "   ".into() }]);
    assert_eq!(w.process(a).ignored, 1);
    assert_eq!(chat::broadcast(&mut w.store, "x"), 1);
}

// =========================================================================
// Properties
// =========================================================================

proptest! {
    /// Walks reach the simulation in send order whatever the energy
    /// schedule and however the stream is split across ticks.
    #[test]
    fn prop_consuming_commands_execute_in_arrival_order(
        dirs in proptest::collection::vec(0u8..10, 1..30),
        chunks in proptest::collection::vec(1usize..6, 1..30),
        grants in proptest::collection::vec(0u32..250, 1..60),
    ) {
        let mut w = World::new(2);
        let (id, _peer, entity) = w.join("Treebeard", 1);

        let mut packets: Vec<ClientPacket> = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            packets.push(walk(*dir));
            if i % 3 == 0 {
                packets.push(ClientPacket::Keepalive { stamp: i as u32 });
            }
        }

        let mut remaining = packets.as_slice();
        let mut tick = 0;
        while !remaining.is_empty() || !w.store.get(id).unwrap().retry.is_empty() {
            let take = chunks[tick % chunks.len()].min(remaining.len());
            w.feed(id, &remaining[..take]);
            remaining = &remaining[take..];

            w.sim.give_energy(entity, grants[tick % grants.len()].max(1));
            let outcome = w.process(id);
            prop_assert!(!outcome.destroyed);
            tick += 1;
            prop_assert!(tick < 10_000);
        }

        let executed: Vec<u8> = w
            .sim
            .executed
            .iter()
            .map(|(_, a)| match a {
                Action::Walk { dir } => *dir,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        prop_assert_eq!(executed, dirs);
    }
}
