use axum::{http::StatusCode, routing::post, Router};
use passgate::gate::relay::{RelayNotifier, RelayOutcome, WebhookRelay};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use url::Url;

async fn spawn_relay(hits: Arc<AtomicUsize>) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let ok_hits = hits.clone();
    let app = Router::new()
        .route(
            "/open",
            post(move || {
                let hits = ok_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }
            }),
        )
        .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn relay(
    addr: SocketAddr,
    path: &str,
    timeout: Duration,
) -> Result<WebhookRelay, Box<dyn std::error::Error>> {
    let url = Url::parse(&format!("http://{addr}{path}?token=webhook-secret"))?;
    Ok(WebhookRelay::new(url, timeout)?)
}

#[tokio::test]
async fn success_on_2xx() -> Result<(), Box<dyn std::error::Error>> {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_relay(hits.clone()).await?;

    let outcome = relay(addr, "/open", Duration::from_secs(2))?.notify().await;

    assert_eq!(outcome, RelayOutcome::Success);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_on_server_error() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_relay(Arc::new(AtomicUsize::new(0))).await?;

    let outcome = relay(addr, "/broken", Duration::from_secs(2))?.notify().await;

    match outcome {
        RelayOutcome::RelayRejected(detail) => {
            assert!(detail.contains("500"));
            assert!(!detail.contains("webhook-secret"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unreachable_on_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let addr = spawn_relay(Arc::new(AtomicUsize::new(0))).await?;

    let outcome = relay(addr, "/slow", Duration::from_millis(200))?
        .notify()
        .await;

    assert_eq!(
        outcome,
        RelayOutcome::RelayUnreachable("relay request timed out".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_when_nothing_listens() -> Result<(), Box<dyn std::error::Error>> {
    // Grab a free port, then release it before calling.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let outcome = relay(addr, "/open", Duration::from_secs(2))?.notify().await;

    match outcome {
        RelayOutcome::RelayUnreachable(detail) => {
            assert!(!detail.contains("webhook-secret"));
            assert!(!detail.contains(&addr.port().to_string()));
        }
        other => panic!("expected unreachable, got {other:?}"),
    }
    Ok(())
}
