//! Cancellation and connection loss travel through ordinary errors, never the
//! recovery path.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use parachute::Client;
use parachute::Code;
use parachute::Context;
use parachute::Error;
use parachute::Headers;
use parachute::MemoryTransport;
use parachute::Request;
use parachute::Server;
use parachute::ServerStream;
use parachute::Status;
use parachute::StreamType;
use parachute::Transport;
use parachute_wire::Frame;
use parachute_wire::Reason;
use parachute_wire::StreamId;

const WATCH: &str = "/clock.v1.ClockService/Watch";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A clock that ticks once, then waits to be cancelled and reports it.
fn watch_server() -> anyhow::Result<(Server, oneshot::Receiver<Code>)> {
    let (seen_tx, seen_rx) = oneshot::channel::<Code>();
    let seen_tx = Arc::new(Mutex::new(Some(seen_tx)));

    let server = Server::builder()
        .server_stream(WATCH, move |ctx: Context, _request: Request, mut stream: ServerStream| {
            let seen_tx = seen_tx.clone();
            async move {
                stream.send(b"tick".to_vec()).await?;
                ctx.cancelled().await;
                let err = Error::new(Code::Canceled, "client went away");
                if let Some(tx) = seen_tx.lock().unwrap().take() {
                    let _ = tx.send(err.code());
                }
                Err::<(), Error>(err)
            }
        })
        .build()?;
    Ok((server, seen_rx))
}

#[tokio::test]
async fn test_client_close_cancels_handler() -> anyhow::Result<()> {
    init_tracing();
    let (server, seen) = watch_server()?;
    let client = server.connect();

    let mut stream = client.server_stream(WATCH, Request::default()).await?;
    assert!(stream.receive().await);
    stream.close().await;
    assert!(!stream.receive().await);

    let code = tokio::time::timeout(Duration::from_secs(5), seen).await??;
    assert_eq!(code, Code::Canceled);
    Ok(())
}

#[tokio::test]
async fn test_dropping_open_stream_cancels_handler() -> anyhow::Result<()> {
    init_tracing();
    let (server, seen) = watch_server()?;
    let client = server.connect();

    let mut stream = client.server_stream(WATCH, Request::default()).await?;
    assert!(stream.receive().await);
    drop(stream);

    let code = tokio::time::timeout(Duration::from_secs(5), seen).await??;
    assert_eq!(code, Code::Canceled);

    // The connection is still usable afterwards.
    let mut again = client.server_stream(WATCH, Request::default()).await?;
    assert!(again.receive().await);
    again.close().await;
    Ok(())
}

#[tokio::test]
async fn test_call_on_open_stream_is_reset() -> anyhow::Result<()> {
    init_tracing();
    let (server, seen) = watch_server()?;
    let (client_side, server_side) = MemoryTransport::pair(8);
    server.serve(Arc::new(server_side));

    let stream = StreamId(7);
    let call = || Frame::Call {
        stream,
        procedure: WATCH.to_string(),
        stream_type: StreamType::ServerStream,
        headers: Headers::new(),
        body: Vec::new(),
    };

    client_side.send(call()).await?;
    assert_eq!(client_side.recv().await?, Some(Frame::Message { stream, body: b"tick".to_vec() }));

    client_side.send(call()).await?;
    assert_eq!(client_side.recv().await?, Some(Frame::Reset { stream, reason: Reason::PROTOCOL_ERROR }));

    // The first call keeps its own cancel handle and still ends exactly once.
    client_side.send(Frame::Reset { stream, reason: Reason::CANCEL }).await?;
    assert_eq!(
        client_side.recv().await?,
        Some(Frame::End { stream, status: Some(Status::new(Code::Canceled, "client went away")) })
    );
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), seen).await??, Code::Canceled);
    Ok(())
}

#[tokio::test]
async fn test_lost_connection_fails_pending_calls() -> anyhow::Result<()> {
    init_tracing();
    let (client_side, server_side) = MemoryTransport::pair(4);
    let client = Client::new(Arc::new(client_side));

    // A server that hangs up as soon as the call arrives.
    let hangup = tokio::spawn(async move {
        let frame = server_side.recv().await;
        drop(server_side);
        frame
    });

    let err = client.unary(WATCH, Request::default()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert!(hangup.await?.is_ok());

    // New calls fail fast once the connection is gone.
    let err = client.unary(WATCH, Request::default()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    Ok(())
}
