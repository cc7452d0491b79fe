//! Contact handshake.
//!
//! A freshly accepted socket is not a session yet. It waits here until the
//! client's contact record is complete, then the record is checked and the
//! socket either becomes a `SETUP`/`CONSOLE` session or is answered with a
//! rejection status and closed.
//!
//! ```text
//! accept → pending contact ──(record complete)──→ evaluate
//!              │                                  ├─ ok       → reply Success, open session
//!              └─(contact timeout / close)→ drop  └─ rejected → reply status, close
//! ```

use delve_protocol::{
    ConnType, ContactReply, ContactRequest, PROTOCOL_VERSION, PacketReader, StatusCode,
};
use delve_session::{
    AccountInfo, AccountValidator, Credentials, SessionState, SessionStore, TimeoutTicks,
    check_names,
};
use delve_transport::{Connection, ReadOutcome, WriteOutcome};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;

/// What the listener needs from the server configuration.
#[derive(Debug, Clone)]
pub(crate) struct ContactPolicy {
    pub console_password: Option<String>,
    pub console_local_only: bool,
    pub max_inbound_bytes: usize,
}

struct PendingContact {
    conn: Box<dyn Connection>,
    buf: Vec<u8>,
    accepted_at: u64,
}

/// An accepted contact, ready to become a session.
struct Admission {
    state: SessionState,
    credentials: Credentials,
    account: AccountInfo,
}

/// Sockets waiting for their contact record.
#[derive(Default)]
pub(crate) struct Listener {
    pending: Vec<PendingContact>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn: Box<dyn Connection>, now: u64) {
        debug!(conn = %conn.id(), peer = ?conn.peer_addr(), "contact pending");
        self.pending.push(PendingContact {
            conn,
            buf: Vec::new(),
            accepted_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Reads every pending socket and settles the complete ones.
    ///
    /// Returns the number of sessions opened.
    pub fn poll(
        &mut self,
        now: u64,
        store: &mut SessionStore,
        accounts: &dyn AccountValidator,
        policy: &ContactPolicy,
        timeouts: &TimeoutTicks,
    ) -> usize {
        let mut opened = 0;
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for mut contact in std::mem::take(&mut self.pending) {
            if !fill(&mut contact, policy.max_inbound_bytes) {
                contact.conn.close();
                continue;
            }

            let decoded = {
                let mut r = PacketReader::new(&contact.buf);
                ContactRequest::decode(&mut r).map(|request| (request, r.position()))
            };
            let (request, consumed) = match decoded {
                Ok(decoded) => decoded,
                Err(e) if e.is_incomplete() => {
                    if now.saturating_sub(contact.accepted_at) > timeouts.contact {
                        warn!(conn = %contact.conn.id(), "contact timeout");
                        contact.conn.close();
                    } else {
                        still_pending.push(contact);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(conn = %contact.conn.id(), error = %e, "malformed contact");
                    reject(contact.conn, StatusCode::Invalid);
                    continue;
                }
            };

            let admission = match evaluate(&request, &*contact.conn, store, accounts, policy) {
                Ok(admission) => admission,
                Err(status) => {
                    warn!(
                        conn = %contact.conn.id(),
                        nick = %request.nick,
                        %status,
                        "contact rejected"
                    );
                    reject(contact.conn, status);
                    continue;
                }
            };

            let reply = ContactReply {
                status: StatusCode::Success,
                characters: admission.account.characters,
                max_characters: admission.account.max_characters,
            };
            if !write_reply(&mut *contact.conn, &reply) {
                debug!(conn = %contact.conn.id(), "contact reply not delivered");
                contact.conn.close();
                continue;
            }

            let timeout = timeouts.for_state(admission.state).unwrap_or(0);
            let leftover = contact.buf.split_off(consumed);
            match store.open(
                admission.state,
                contact.conn,
                admission.credentials,
                admission.account,
                now,
                timeout,
            ) {
                Ok(id) => {
                    if let Some(session) = store.get_mut(id) {
                        session.inbound = leftover;
                    }
                    info!(session = %id, state = %admission.state, "contact accepted");
                    opened += 1;
                }
                // Capacity was checked in evaluate; nothing else can fail here.
                Err(e) => warn!(error = %e, "could not open session"),
            }
        }

        self.pending = still_pending;
        opened
    }
}

/// Drains the socket into the contact buffer. `false` means drop it.
fn fill(contact: &mut PendingContact, max: usize) -> bool {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match contact.conn.read_nonblocking(&mut chunk) {
            Ok(ReadOutcome::Data(n)) => {
                contact.buf.extend_from_slice(&chunk[..n]);
                if contact.buf.len() > max {
                    warn!(conn = %contact.conn.id(), "contact input overflow");
                    return false;
                }
            }
            Ok(ReadOutcome::WouldBlock) => return true,
            Ok(ReadOutcome::Closed) => {
                debug!(conn = %contact.conn.id(), "closed before contact");
                return false;
            }
            Err(e) => {
                debug!(conn = %contact.conn.id(), error = %e, "read failed before contact");
                return false;
            }
        }
    }
}

fn evaluate(
    request: &ContactRequest,
    conn: &dyn Connection,
    store: &SessionStore,
    accounts: &dyn AccountValidator,
    policy: &ContactPolicy,
) -> Result<Admission, StatusCode> {
    if request.version < PROTOCOL_VERSION {
        return Err(StatusCode::VersionOld);
    }
    if request.version > PROTOCOL_VERSION {
        return Err(StatusCode::VersionNew);
    }
    let addr = conn.peer_addr();

    match request.conn_type {
        ConnType::Console => {
            if policy.console_password.is_none() {
                return Err(StatusCode::Invalid);
            }
            if policy.console_local_only && !addr.is_some_and(|a| a.ip().is_loopback()) {
                return Err(StatusCode::Invalid);
            }
            if store.is_full() {
                return Err(StatusCode::GameFull);
            }
            Ok(Admission {
                state: SessionState::Console,
                credentials: Credentials {
                    addr,
                    ..Default::default()
                },
                account: AccountInfo::default(),
            })
        }
        ConnType::Player => {
            let nick = check_names(&request.nick, &request.real, &request.host)
                .map_err(|_| StatusCode::Invalid)?;
            let account = accounts
                .validate(&nick, &request.pass)
                .map_err(|_| StatusCode::Account)?;
            if store.is_full() {
                return Err(StatusCode::GameFull);
            }
            Ok(Admission {
                state: SessionState::Setup,
                credentials: Credentials {
                    nick,
                    real: request.real.clone(),
                    host: request.host.clone(),
                    pass: request.pass.clone(),
                    addr,
                },
                account,
            })
        }
    }
}

fn write_reply(conn: &mut dyn Connection, reply: &ContactReply) -> bool {
    let mut bytes = Vec::with_capacity(5);
    reply.encode(&mut bytes);
    matches!(conn.write_nonblocking(&bytes), Ok(WriteOutcome::Written(n)) if n == bytes.len())
}

fn reject(mut conn: Box<dyn Connection>, status: StatusCode) {
    let _ = write_reply(&mut *conn, &ContactReply::rejected(status));
    conn.close();
}
