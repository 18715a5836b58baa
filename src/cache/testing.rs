//! In-process stand-in for an unhealthy Redis server

use redis::aio::ConnectionManager;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeRedis {
    /// Every data command answers with an error reply
    Failing,
    /// Data commands are read and never answered
    Stalled,
}

fn line(buf: &[u8], at: usize) -> Option<(&[u8], usize)> {
    let end = buf[at..].windows(2).position(|w| w == b"\r\n")? + at;
    Some((&buf[at..end], end + 2))
}

/// Split one complete RESP command off the front of `buf`
fn command(buf: &[u8]) -> Option<(String, usize)> {
    let (head, mut at) = line(buf, 0)?;
    let count: usize = std::str::from_utf8(head.strip_prefix(b"*")?)
        .ok()?
        .parse()
        .ok()?;
    let mut name = String::new();
    for i in 0..count {
        let (len, next) = line(buf, at)?;
        let len: usize = std::str::from_utf8(len.strip_prefix(b"$")?)
            .ok()?
            .parse()
            .ok()?;
        if buf.len() < next + len + 2 {
            return None;
        }
        if i == 0 {
            name = String::from_utf8_lossy(&buf[next..next + len]).to_uppercase();
        }
        at = next + len + 2;
    }
    Some((name, at))
}

/// Connection handshakes (`CLIENT ...`) succeed so the manager can connect.
pub(crate) async fn fake_redis(mode: FakeRedis) -> ConnectionManager {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    while let Some((name, used)) = command(&buf) {
                        buf.drain(..used);
                        let reply: &[u8] = match (mode, name.as_str()) {
                            (_, "CLIENT") => b"+OK\r\n",
                            (FakeRedis::Failing, _) => b"-ERR unavailable\r\n",
                            (FakeRedis::Stalled, _) => continue,
                        };
                        if socket.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    let client = redis::Client::open(format!("redis://{}", addr)).unwrap();
    ConnectionManager::new(client).await.unwrap()
}

#[test]
fn test_command_framing() {
    let get = b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
    assert_eq!(command(get), Some(("GET".to_string(), get.len())));
    assert_eq!(command(&get[..get.len() - 1]), None);
}
