use std::sync::Arc;
use tokio::sync::Mutex;
use waypoint::graceful_shutdown::GracefulShutdown;

#[tokio::test]
async fn subscribe_has_no_signal_initially() {
    let shutdown = GracefulShutdown::new();
    let mut receiver = shutdown.subscribe();
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn multiple_subscribers_all_see_the_signal() {
    let shutdown = Arc::new(GracefulShutdown::new());
    let mut receiver1 = shutdown.subscribe();
    let mut receiver2 = shutdown.subscribe();

    shutdown.shutdown().await;

    assert!(receiver1.try_recv().is_ok());
    assert!(receiver2.try_recv().is_ok());
}

#[tokio::test]
async fn shutdown_runs_registered_components() {
    let shutdown = GracefulShutdown::new();
    let called = Arc::new(Mutex::new(false));
    let called_clone = called.clone();

    shutdown
        .register("test_component", move || {
            let called = called_clone.clone();
            async move {
                *called.lock().await = true;
            }
        })
        .await;

    shutdown.shutdown().await;
    assert!(*called.lock().await);
}

#[tokio::test]
async fn shutdown_cancels_the_root_cancel_token() {
    let shutdown = GracefulShutdown::new();
    assert!(!shutdown.root_cancel().is_cancelled());
    shutdown.shutdown().await;
    assert!(shutdown.root_cancel().is_cancelled());
}

#[tokio::test]
async fn child_cancel_follows_root_cancellation() {
    let shutdown = GracefulShutdown::new();
    let child = shutdown.root_cancel().child();
    assert!(!child.is_cancelled());

    shutdown.shutdown().await;
    child.cancelled().await;
    assert!(child.is_cancelled());
}
