use super::fake_backend::isolated_config;
use devtunnel::runtime::tunnel::TunnelMethod;
use devtunnel::{StopOutcome, TunnelError, TunnelManager};
use tempfile::TempDir;

#[tokio::test]
async fn absent_backend_suggests_quick_fallback() {
    let tmp = TempDir::new().unwrap();
    let manager = TunnelManager::new(isolated_config(tmp.path())).unwrap();

    let err = manager
        .start(3000, Some("web"), Some(TunnelMethod::OverlayFunnel))
        .await
        .unwrap_err();
    assert!(matches!(err, TunnelError::NotInstalled { .. }));
    assert_eq!(err.fallback(), Some(TunnelMethod::QuickEphemeral));
    assert!(manager.list().unwrap().is_empty());
}

#[tokio::test]
async fn stop_unknown_name_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let manager = TunnelManager::new(isolated_config(tmp.path())).unwrap();
    assert_eq!(manager.stop("nothing-here").await.unwrap(), StopOutcome::NotFound);
}

#[cfg(unix)]
mod with_fake_cloudflared {
    use super::*;
    use crate::fake_backend::{SPAWN_LOCK, install_quick_cloudflared};

    #[tokio::test]
    async fn quick_tunnel_round_trip() {
        let _guard = SPAWN_LOCK.lock().await;
        let tmp = TempDir::new().unwrap();
        let mut config = isolated_config(tmp.path());
        config.quick.binary = install_quick_cloudflared(tmp.path(), "cf-it-roundtrip", "quiet-harbor-test");
        let manager = TunnelManager::new(config).unwrap();

        let record = manager
            .start(3000, Some("demo"), Some(TunnelMethod::QuickEphemeral))
            .await
            .unwrap();
        assert_eq!(record.public_url, "https://quiet-harbor-test.trycloudflare.com");
        assert_eq!(manager.list().unwrap().len(), 1);

        let tail = manager.log_tail("demo", 5).unwrap().unwrap();
        assert!(tail.contains("trycloudflare.com"));

        let verified = manager.list_verified().await.unwrap();
        assert!(verified[0].1, "freshly started tunnel should be alive");

        let outcome = manager.stop("demo").await.unwrap();
        assert!(matches!(outcome, StopOutcome::Stopped(_)));
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_all_counts_cleared_records() {
        let _guard = SPAWN_LOCK.lock().await;
        let tmp = TempDir::new().unwrap();
        let mut config = isolated_config(tmp.path());
        config.quick.binary = install_quick_cloudflared(tmp.path(), "cf-it-stopall", "busy-meadow-test");
        let manager = TunnelManager::new(config).unwrap();

        for (port, name) in [(3000, "one"), (3001, "two")] {
            manager
                .start(port, Some(name), Some(TunnelMethod::QuickEphemeral))
                .await
                .unwrap();
        }
        let verified = manager.list_verified().await.unwrap();
        assert!(verified.iter().all(|(_, alive)| *alive));

        assert_eq!(manager.stop_all().await, 2);
        assert!(manager.list().unwrap().is_empty());
        let verified = manager.list_verified().await.unwrap();
        assert!(verified.is_empty());
    }
}
