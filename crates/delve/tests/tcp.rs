//! End-to-end test over real sockets: a player joins, a console stops the
//! server, and the player is told why.

use std::time::Duration;

use delve::prelude::*;
use delve::protocol::{
    ClientPacket, ContactReply, ContactRequest, PacketReader, ServerPacket, StatusCode,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Every entity can always act; nothing is ever drawn.
#[derive(Default)]
struct Open {
    entities: usize,
}

impl Simulation for Open {
    fn has_energy(&self, _: EntityId) -> bool {
        true
    }

    fn try_execute(&mut self, _: EntityId, _: &Action) -> Execution {
        Execution::Executed
    }

    fn attach_entity(&mut self, _: SessionId, _: &str) -> Result<EntityId, String> {
        self.entities += 1;
        Ok(EntityId(self.entities as u32 - 1))
    }

    fn detach_entity(&mut self, entity: EntityId) -> Option<EntityId> {
        self.entities -= 1;
        let last = self.entities as u32;
        (entity.0 != last).then_some(EntityId(last))
    }

    fn entity_is_in_safe_location(&self, _: EntityId) -> bool {
        true
    }
}

/// Reads until `done` accepts the accumulated bytes.
async fn read_until(stream: &mut TcpStream, done: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&buf) {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("timed out waiting for server");
    buf
}

fn server_packets(bytes: &[u8]) -> (Option<ContactReply>, Vec<ServerPacket>) {
    let mut r = PacketReader::new(bytes);
    let Ok(reply) = ContactReply::decode(&mut r) else {
        return (None, Vec::new());
    };
    let mut packets = Vec::new();
    while let Ok(p) = ServerPacket::decode(&mut r, RleMode::Classic) {
        packets.push(p);
    }
    (Some(reply), packets)
}

#[tokio::test]
async fn test_tcp_player_joins_and_console_shuts_down() {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        fps: 50,
        console_password: Some("sesame".into()),
        ..ServerConfig::default()
    };
    let server = DelveServer::builder(Open::default())
        .config(config)
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let running = tokio::spawn(server.run());

    // Player: contact, setup, and play in one write.
    let mut player = TcpStream::connect(addr).await.unwrap();
    let mut bytes = Vec::new();
    ContactRequest::player("tester", "localhost", "Aragorn", "pw").encode(&mut bytes);
    ClientPacket::ClientSetup {
        cols: 80,
        rows: 24,
        rle: RleMode::Classic,
    }
    .encode(&mut bytes);
    ClientPacket::Play.encode(&mut bytes);
    player.write_all(&bytes).await.unwrap();

    let got = read_until(&mut player, |b| {
        server_packets(b).1.contains(&ServerPacket::End)
    })
    .await;
    let (reply, packets) = server_packets(&got);
    assert_eq!(reply.unwrap().status, StatusCode::Success);
    assert_eq!(
        packets[0],
        ServerPacket::Play {
            status: StatusCode::Success
        }
    );

    // Console: authenticate and stop the server.
    let mut console = TcpStream::connect(addr).await.unwrap();
    let mut bytes = Vec::new();
    ContactRequest::console().encode(&mut bytes);
    bytes.extend_from_slice(b"sesame\nshutdown\n");
    console.write_all(&bytes).await.unwrap();

    let reactor = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(reactor.store().is_empty());

    let tail = read_until(&mut player, |_| false).await;
    let mut r = PacketReader::new(&tail);
    assert_eq!(
        ServerPacket::decode(&mut r, RleMode::Classic).unwrap(),
        ServerPacket::Quit {
            reason: "Server shutdown".into()
        }
    );

    let console_out = read_until(&mut console, |_| false).await;
    let text = String::from_utf8_lossy(&console_out[5..]);
    assert_eq!(text, "Authenticated\nShutting down\nServer shutdown\n");
}
