//! Pre-startup control message handling observed from the client side.


use std::time::Duration;

use harness::{
    cancel_request, read_exact_timed, read_to_eof_timed, ssl_request, startup_message,
    stub_greeting, ProxyHandle, UpstreamStub,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn ssl_request_gets_single_refusal_byte_and_connection_survives() {
    let stub = UpstreamStub::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(stub.addr).await.unwrap();

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(&ssl_request()).await.unwrap();

    let answer = read_exact_timed(&mut client, 1).await.unwrap();
    assert_eq!(answer, b"N");

    // Nothing was forwarded upstream for the refused request.
    assert!(stub.startup_received().is_empty());

    // The connection is still usable: retry without encryption.
    let startup = startup_message("alice", "orders");
    client.write_all(&startup).await.unwrap();
    let greeting = read_exact_timed(&mut client, stub_greeting().len())
        .await
        .unwrap();
    assert_eq!(greeting, stub_greeting());
    assert_eq!(stub.startup_received(), startup);
}

#[tokio::test]
async fn gssenc_request_is_refused_like_ssl() {
    let stub = UpstreamStub::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(stub.addr).await.unwrap();

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let mut request = Vec::new();
    request.extend_from_slice(&8i32.to_be_bytes());
    request.extend_from_slice(&((1234i32 << 16) | 5680).to_be_bytes());
    client.write_all(&request).await.unwrap();

    let answer = read_exact_timed(&mut client, 1).await.unwrap();
    assert_eq!(answer, b"N");
}

#[tokio::test]
async fn cancel_request_terminates_connection_with_nothing_forwarded() {
    let stub = UpstreamStub::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(stub.addr).await.unwrap();

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(&cancel_request(7, 11)).await.unwrap();

    // The proxy answers nothing and closes the connection.
    let received = read_to_eof_timed(&mut client).await.unwrap();
    assert!(received.is_empty());

    // Give the stub a moment to observe its side closing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stub.startup_received().is_empty());
    assert!(stub.relayed_received().is_empty());
}
