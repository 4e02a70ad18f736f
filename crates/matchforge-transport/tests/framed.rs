//! End-to-end tests for the framed TCP server over loopback.

use matchforge_transport::{FramedServer, ServerEvent, ServerHandle, SessionId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

async fn start_server() -> (
    std::net::SocketAddr,
    ServerHandle,
    mpsc::UnboundedReceiver<ServerEvent>,
    JoinHandle<()>,
) {
    let (server, events) = FramedServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let task = tokio::spawn(async move {
        server.run().await.unwrap();
    });
    (addr, handle, events, task)
}

fn frame(body: &[u8]) -> Vec<u8> {
    let total = (body.len() + 2) as u16;
    let mut wire = total.to_le_bytes().to_vec();
    wire.extend_from_slice(body);
    wire
}

#[tokio::test]
async fn delivers_frames_both_ways() {
    let (addr, handle, mut events, task) = start_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let session = match events.recv().await.unwrap() {
        ServerEvent::Connected(session) => session,
        other => panic!("expected Connected, got {other:?}"),
    };

    client.write_all(&frame(&[0xF0, 0x42, 7])).await.unwrap();
    match events.recv().await.unwrap() {
        ServerEvent::Frame { session: id, body } => {
            assert_eq!(id, session.id());
            assert_eq!(body, vec![0xF0, 0x42, 7]);
        }
        other => panic!("expected Frame, got {other:?}"),
    }

    session.send(frame(&[0xF0, 0x01]));
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [4, 0, 0xF0, 0x01]);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn orderly_close_emits_disconnect_once() {
    let (addr, handle, mut events, task) = start_server().await;
    let client = TcpStream::connect(addr).await.unwrap();

    let session = match events.recv().await.unwrap() {
        ServerEvent::Connected(session) => session,
        other => panic!("expected Connected, got {other:?}"),
    };
    let id = session.id();

    drop(client);
    match events.recv().await.unwrap() {
        ServerEvent::Disconnected(gone) => assert_eq!(gone, id),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(handle.session_count(), 0);

    handle.shutdown();
    task.await.unwrap();

    // No second Disconnected for the same session after shutdown drains.
    let mut disconnects = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ServerEvent::Disconnected(gone) if gone == id) {
            disconnects += 1;
        }
    }
    assert_eq!(disconnects, 0);
}

#[tokio::test]
async fn undersized_length_prefix_closes_connection() {
    let (addr, handle, mut events, task) = start_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();

    let session = match events.recv().await.unwrap() {
        ServerEvent::Connected(session) => session,
        other => panic!("expected Connected, got {other:?}"),
    };

    // Declared length 1 cannot even cover the prefix itself.
    client.write_all(&1u16.to_le_bytes()).await.unwrap();
    match events.recv().await.unwrap() {
        ServerEvent::Disconnected(gone) => assert_eq!(gone, session.id()),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent_and_drains() {
    let (addr, handle, mut events, task) = start_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    let _ = events.recv().await.unwrap();

    handle.shutdown();
    handle.shutdown();
    task.await.unwrap();

    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
}
