//! Retrieval against a real HTTP upstream bound to a local port

use axum::body::Body;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use cid::Cid;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::SyncIoBridge;

use saturn_ipfs::{
    is_cancellation, CancellationToken, ContentAddress, ContentFetcher, Error,
    GatewayFetchClient, TransportError,
};

const ROOT: &str = "QmfMYyn8LUWEfRXfijKFjBAshSsPVRUgwLZzsD7kcTtX1A";

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serves `body` at `/{cid}` and 404 for everything else
fn serve_content(cid: &'static str, body: &'static [u8]) -> Router {
    Router::new().route(
        "/:cid",
        get(move |Path(requested): Path<String>| async move {
            if requested == cid {
                (StatusCode::OK, Bytes::from_static(body))
            } else {
                (StatusCode::NOT_FOUND, Bytes::from_static(b"not found"))
            }
        }),
    )
}

#[tokio::test]
async fn test_fetch_returns_upstream_bytes() {
    let base = spawn_upstream(serve_content(ROOT, b"hello")).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let stream = client.fetch(&CancellationToken::new(), &addr).await.unwrap();
    assert_eq!(stream.content_length(), Some(5));

    let out = stream.into_bytes().await.unwrap();
    assert_eq!(&out[..], b"hello");
}

#[tokio::test]
async fn test_fetch_as_async_read() {
    let base = spawn_upstream(serve_content(ROOT, b"hello")).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let stream = client.fetch(&CancellationToken::new(), &addr).await.unwrap();
    let mut reader = stream.into_reader();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();

    assert_eq!(out, b"hello");
}

#[tokio::test]
async fn test_fetch_under_path_prefix() {
    let router = Router::new().nest("/ipfs", serve_content(ROOT, b"prefixed"));
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(format!("{}/ipfs/", base)).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let out = client
        .fetch(&CancellationToken::new(), &addr)
        .await
        .unwrap()
        .into_bytes()
        .await
        .unwrap();
    assert_eq!(&out[..], b"prefixed");
}

#[tokio::test]
async fn test_fetch_server_error() {
    let router = Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let result = client.fetch(&CancellationToken::new(), &addr).await;
    let err = result.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(!err.is_transport());
    match err {
        Error::RetrievalFailed { cid, .. } => assert_eq!(cid, ROOT),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_non_success_statuses() {
    for status in [
        StatusCode::NOT_FOUND,
        StatusCode::UNAUTHORIZED,
        StatusCode::BAD_GATEWAY,
        StatusCode::NO_CONTENT,
        StatusCode::PARTIAL_CONTENT,
    ] {
        let router = Router::new().fallback(move || async move { (status, "ignored body") });
        let base = spawn_upstream(router).await;
        let client = GatewayFetchClient::new(base).unwrap();
        let addr = ContentAddress::parse(ROOT).unwrap();

        let err = client
            .fetch(&CancellationToken::new(), &addr)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(status), "status {status}");
    }
}

#[tokio::test]
async fn test_fetch_missing_content() {
    let base = spawn_upstream(serve_content(ROOT, b"hello")).await;
    let client = GatewayFetchClient::new(base).unwrap();

    let root = ContentAddress::parse(ROOT).unwrap();
    let other = ContentAddress::new(Cid::new_v1(0x55, root.cid().hash().to_owned()));

    let err = client
        .fetch(&CancellationToken::new(), &other)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = GatewayFetchClient::new(format!("http://{}", addr)).unwrap();
    let cid = ContentAddress::parse(ROOT).unwrap();

    let err = client
        .fetch(&CancellationToken::new(), &cid)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::Request(_))
    ));
}

#[tokio::test]
async fn test_cancel_before_response() {
    let router = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "too late"
    });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), client.fetch(&cancel, &addr))
        .await
        .expect("fetch did not return after cancellation");

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_cancel_while_streaming() {
    let router = Router::new().fallback(|| async {
        let first = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(
            b"partial",
        ))]);
        Body::from_stream(first.chain(futures::stream::pending()))
    });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let cancel = CancellationToken::new();
    let mut stream = client.fetch(&cancel, &addr).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b"partial");

    cancel.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("stream did not observe cancellation");
    let err = next.unwrap().unwrap_err();
    assert!(is_cancellation(&err));
    assert_ne!(err.kind(), std::io::ErrorKind::Interrupted);

    // Stays failed instead of looking like a clean end of content
    let again = stream.next().await.unwrap().unwrap_err();
    assert!(is_cancellation(&again));
}

#[tokio::test]
async fn test_cancelled_fetch_fails_through_std_reader() {
    let router = Router::new().fallback(|| async {
        let head = futures::stream::once(async {
            Ok::<_, std::io::Error>(Bytes::from_static(b"hel"))
        });
        let tail = futures::stream::once(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, std::io::Error>(Bytes::from_static(b"lo"))
        });
        Body::from_stream(head.chain(tail))
    });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let cancel = CancellationToken::new();
    let stream = client.fetch(&cancel, &addr).await.unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    // std::io::copy retries on ErrorKind::Interrupted
    let mut reader = SyncIoBridge::new(stream.into_reader());
    let copy = tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        let result = std::io::copy(&mut reader, &mut out);
        (result, out)
    });

    let (result, out) = tokio::time::timeout(Duration::from_secs(5), copy)
        .await
        .expect("copy did not observe cancellation")
        .unwrap();

    let err = result.unwrap_err();
    assert!(is_cancellation(&err), "unexpected error: {err}");
    assert_ne!(out, b"hello");
}

#[tokio::test]
async fn test_large_error_body_is_discarded() {
    let router = Router::new().fallback(|| async {
        // 64 MiB in 64 KiB chunks
        let chunk = Bytes::from(vec![b'x'; 64 * 1024]);
        let body = futures::stream::iter(
            (0..1024).map(move |_| Ok::<_, std::io::Error>(chunk.clone())),
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Body::from_stream(body))
    });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(30),
        client.fetch(&CancellationToken::new(), &addr),
    )
    .await
    .expect("fetch did not finish draining the error body");

    match result.unwrap_err() {
        Error::RetrievalFailed { cid, status } => {
            assert_eq!(cid, ROOT);
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_binary_body_in_chunks() {
    let content: Vec<u8> = (0..64).flat_map(|_| 0..=255u8).collect();

    let served = content.clone();
    let router = Router::new().fallback(move || {
        let served = served.clone();
        async move {
            let chunks: Vec<Result<Bytes, std::io::Error>> = served
                .chunks(1000)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Body::from_stream(futures::stream::iter(chunks))
        }
    });
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();
    let addr = ContentAddress::parse(ROOT).unwrap();

    let out = client
        .fetch(&CancellationToken::new(), &addr)
        .await
        .unwrap()
        .into_bytes()
        .await
        .unwrap();
    assert_eq!(out.len(), 64 * 256);
    assert_eq!(&out[..], &content[..]);

    let mut reader = client
        .fetch(&CancellationToken::new(), &addr)
        .await
        .unwrap()
        .into_reader();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, content);
}

#[tokio::test]
async fn test_concurrent_fetches_are_independent() {
    let router = Router::new().route(
        "/:cid",
        get(|Path(cid): Path<String>| async move {
            // Stagger responses so calls overlap
            let delay = (cid.len() % 7) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            format!("content:{}", cid)
        }),
    );
    let base = spawn_upstream(router).await;
    let client = GatewayFetchClient::new(base).unwrap();

    let root = ContentAddress::parse(ROOT).unwrap();
    let hash = root.cid().hash().to_owned();
    let addresses = vec![
        root,
        ContentAddress::new(Cid::new_v1(0x55, hash.clone())),
        ContentAddress::new(Cid::new_v1(0x70, hash.clone())),
        ContentAddress::new(Cid::new_v1(0x71, hash)),
    ];

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for round in 0..5 {
        for addr in &addresses {
            let client = client.clone();
            let cancel = cancel.clone();
            let addr = *addr;
            handles.push(tokio::spawn(async move {
                let body = client
                    .fetch(&cancel, &addr)
                    .await
                    .unwrap()
                    .into_bytes()
                    .await
                    .unwrap();
                (round, addr, body)
            }));
        }
    }

    for handle in handles {
        let (_, addr, body) = handle.await.unwrap();
        assert_eq!(body, Bytes::from(format!("content:{}", addr)));
    }
}

#[tokio::test]
async fn test_fetch_through_trait_object() {
    let base = spawn_upstream(serve_content(ROOT, b"hello")).await;
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(GatewayFetchClient::new(base).unwrap());
    let addr = ContentAddress::parse(ROOT).unwrap();

    let out = fetcher
        .fetch(&CancellationToken::new(), &addr)
        .await
        .unwrap()
        .into_bytes()
        .await
        .unwrap();
    assert_eq!(&out[..], b"hello");
}
