//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置契约测试
//! - 通过 `Loader` 的端到端测试（内存源 + 本地文件 + 真实解码器）

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::LoaderConfig;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = LoaderConfig::default();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed = ConfigLoader::load_from_str(
            r#"{ "retry": { "network_retry_count": 5 } }"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(parsed.retry.network_retry_count, 5);
        assert_eq!(parsed.dispatcher, LoaderConfig::default().dispatcher);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        LoadError, LoadedFrom, Locator, LocatorKind, LoaderConfig, MemoryPolicy, NetworkInfo,
        Request, TargetId,
    };
    use dispatcher::{Broadcast, Loader, LoaderSnapshot, SourceSet};
    use image::{ImageFormat, Rgba, RgbaImage};
    use sources::{FileSource, ImageDecoder, MemorySource, ScriptedFailure};

    const IMG_1: &str = "https://img.example.com/1.png";
    const IMG_2: &str = "https://img.example.com/2.png";

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([20, 120, 220, 255]));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Short batch delay keeps the tests quick
    fn config() -> LoaderConfig {
        let mut config = LoaderConfig::default();
        config.dispatcher.batch_delay_ms = 20;
        config
    }

    fn network_source() -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new(LoadedFrom::Network).with_name("net"));
        source.insert(IMG_1, png_bytes(4, 4));
        source.insert(IMG_2, png_bytes(8, 2));
        source
    }

    fn loader(source: &Arc<MemorySource>) -> Loader {
        Loader::builder()
            .config(config())
            .sources(
                SourceSet::new()
                    .with(LocatorKind::Network, source.clone())
                    .with(LocatorKind::PlainFile, Arc::new(FileSource::new())),
            )
            .decoder(Arc::new(ImageDecoder::new()))
            .build()
            .unwrap()
    }

    /// Poll the loader until `check` holds
    async fn wait_until(loader: &Loader, check: impl Fn(&LoaderSnapshot) -> bool) {
        for _ in 0..200 {
            let snapshot = loader.snapshot().await.unwrap();
            if check(&snapshot) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    /// img:1 requested twice while in flight: one fetch, both delivered
    #[tokio::test]
    async fn test_e2e_equal_requests_share_one_fetch() {
        let source = network_source();
        let loader = loader(&source);
        source.hold();

        let first = loader.load(Request::new(IMG_1)).target(TargetId(1)).submit();
        let second = loader.load(Request::new(IMG_1)).target(TargetId(2)).submit();
        wait_until(&loader, |s| s.dispatcher.live_hunters == 1).await;
        source.release();

        let first = first.wait().await.unwrap();
        let second = second.wait().await.unwrap();
        assert_eq!(source.fetch_count(IMG_1), 1);
        assert_eq!(first.from, LoadedFrom::Network);
        assert!(Arc::ptr_eq(&first.image, &second.image));
        assert_eq!((first.image.width, first.image.height), (4, 4));

        loader.shutdown().await;
    }

    /// img:2 submitted under a paused tag never reaches the pool until resumed
    #[tokio::test]
    async fn test_e2e_paused_tag_holds_request() {
        let source = network_source();
        let loader = loader(&source);

        loader.pause_tag("gallery");
        let ticket = loader.load(Request::new(IMG_2)).tag("gallery").submit();
        wait_until(&loader, |s| s.dispatcher.paused_actions == 1).await;
        assert_eq!(source.fetch_count(IMG_2), 0);
        assert_eq!(loader.snapshot().await.unwrap().dispatcher.live_hunters, 0);

        loader.resume_tag("gallery");
        let loaded = ticket.wait().await.unwrap();
        assert_eq!((loaded.image.width, loaded.image.height), (8, 2));
        assert_eq!(source.fetch_count(IMG_2), 1);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_cancel_sole_request_drops_result() {
        let source = network_source();
        let loader = loader(&source);
        source.hold();

        let ticket = loader.fetch(Request::new(IMG_1));
        wait_until(&loader, |s| s.dispatcher.live_hunters == 1).await;
        ticket.cancel();
        wait_until(&loader, |s| s.dispatcher.live_hunters == 0).await;
        source.release();

        assert_eq!(ticket.wait().await.unwrap_err(), LoadError::Cancelled);
        // Let the abandoned fetch finish; its result must not be cached
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(loader.cache().is_empty());

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_shared_cancel_keeps_other_consumer() {
        let source = network_source();
        let loader = loader(&source);
        source.hold();

        let cancelled = loader.load(Request::new(IMG_1)).target(TargetId(1)).submit();
        let kept = loader.load(Request::new(IMG_1)).target(TargetId(2)).submit();
        wait_until(&loader, |s| s.dispatcher.live_hunters == 1).await;

        loader.cancel_target(TargetId(1));
        source.release();

        assert!(kept.wait().await.is_ok());
        assert_eq!(cancelled.wait().await.unwrap_err(), LoadError::Cancelled);
        assert_eq!(source.fetch_count(IMG_1), 1);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_new_request_replaces_target() {
        let source = network_source();
        let loader = loader(&source);
        source.hold();

        let old = loader.load(Request::new(IMG_1)).target(TargetId(5)).submit();
        let new = loader.load(Request::new(IMG_2)).target(TargetId(5)).submit();
        source.release();

        assert_eq!(old.wait().await.unwrap_err(), LoadError::Cancelled);
        assert_eq!(new.wait().await.unwrap().image.width, 8);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_memory_cache_serves_second_load() {
        let source = network_source();
        let loader = loader(&source);

        let first = loader.fetch(Request::new(IMG_1)).wait().await.unwrap();
        assert_eq!(first.from, LoadedFrom::Network);
        assert_eq!(loader.cache().len(), 1);

        let second = loader.fetch(Request::new(IMG_1)).wait().await.unwrap();
        assert_eq!(second.from, LoadedFrom::Memory);
        assert_eq!(source.fetch_count(IMG_1), 1);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_no_store_skips_cache() {
        let source = network_source();
        let loader = loader(&source);

        let request = Request::new(IMG_1).memory_policy(MemoryPolicy::NO_STORE);
        loader.fetch(request).wait().await.unwrap();
        assert!(loader.cache().is_empty());

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_unsupported_locator() {
        let source = network_source();
        let loader = loader(&source);

        let err = loader
            .fetch(Request::new("package:com.example.app"))
            .wait()
            .await
            .unwrap_err();
        assert_eq!(err, LoadError::unsupported("package:com.example.app"));

        let err = loader.fetch(Request::new("not a locator")).wait().await.unwrap_err();
        assert!(matches!(err, LoadError::Unsupported { .. }));

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_transient_failure_is_retried() {
        let source = network_source();
        let loader = loader(&source);
        source.fail_next(IMG_1, ScriptedFailure::ConnectionReset, 1);

        let loaded = loader.fetch(Request::new(IMG_1)).wait().await.unwrap();
        assert_eq!(loaded.from, LoadedFrom::Network);
        assert_eq!(source.fetch_count(IMG_1), 2);

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_not_found_is_delivered() {
        let source = network_source();
        let loader = loader(&source);

        let err = loader
            .fetch(Request::new("https://img.example.com/missing.png"))
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));

        loader.shutdown().await;
    }

    /// Failure while offline parks the request; reconnecting replays it
    #[tokio::test]
    async fn test_e2e_replay_after_reconnect() {
        let source = network_source();
        let loader = loader(&source);
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let forwarder = loader.monitor().forward(rx);

        tx.send(Broadcast::Connectivity(None)).await.unwrap();
        wait_until(&loader, |s| s.pool.thread_count == 1).await;

        source.fail_next(IMG_1, ScriptedFailure::Timeout, 1);
        let ticket = loader.fetch(Request::new(IMG_1));
        wait_until(&loader, |s| s.dispatcher.failed_actions == 1).await;
        assert_eq!(source.fetch_count(IMG_1), 1);

        tx.send(Broadcast::Connectivity(Some(NetworkInfo::wifi())))
            .await
            .unwrap();
        let loaded = ticket.wait().await.unwrap();
        assert_eq!(loaded.from, LoadedFrom::Network);
        assert_eq!(source.fetch_count(IMG_1), 2);

        let snapshot = loader.snapshot().await.unwrap();
        assert_eq!(snapshot.dispatcher.failed_actions, 0);
        assert_eq!(snapshot.pool.thread_count, 4);

        drop(tx);
        forwarder.await.unwrap();
        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_airplane_mode_parks_failed_request() {
        let source = network_source();
        let loader = loader(&source);

        loader
            .monitor()
            .on_broadcast(Some(Broadcast::AirplaneMode(Some(true))));
        source.fail_next(IMG_2, ScriptedFailure::Timeout, 1);
        let ticket = loader.fetch(Request::new(IMG_2));
        wait_until(&loader, |s| s.dispatcher.failed_actions == 1).await;

        loader
            .monitor()
            .on_broadcast(Some(Broadcast::AirplaneMode(Some(false))));
        loader
            .monitor()
            .on_broadcast(Some(Broadcast::Connectivity(Some(NetworkInfo::wifi()))));
        assert!(ticket.wait().await.is_ok());

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_shutdown_cancels_pending_and_later_loads() {
        let source = network_source();
        let loader = loader(&source);
        source.hold();

        let pending = loader.fetch(Request::new(IMG_1));
        wait_until(&loader, |s| s.dispatcher.live_hunters == 1).await;
        loader.shutdown().await;

        assert_eq!(pending.wait().await.unwrap_err(), LoadError::Cancelled);
        assert!(source.is_shut_down());
        assert!(!loader.monitor().is_registered());
        assert!(loader.snapshot().await.is_err());

        let late = loader.fetch(Request::new(IMG_2));
        assert_eq!(late.wait().await.unwrap_err(), LoadError::Cancelled);
    }

    #[tokio::test]
    async fn test_e2e_local_file_with_real_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, png_bytes(40, 20)).unwrap();

        let source = network_source();
        let loader = loader(&source);

        let locator = Locator::from_path(&path);
        let loaded = loader
            .fetch(Request::new(locator.clone()).resize(10, 10).center_crop())
            .wait()
            .await
            .unwrap();
        assert_eq!(loaded.from, LoadedFrom::Disk);
        assert_eq!((loaded.image.width, loaded.image.height), (10, 10));

        let rotated = loader
            .fetch(Request::new(locator).rotate(90.0))
            .wait()
            .await
            .unwrap();
        assert_eq!((rotated.image.width, rotated.image.height), (20, 40));

        let missing = Locator::from_path(dir.path().join("missing.png"));
        let err = loader.fetch(Request::new(missing)).wait().await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));

        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_undecodable_bytes() {
        let source = network_source();
        source.insert("https://img.example.com/garbage", b"definitely not an image".to_vec());
        let loader = loader(&source);

        let err = loader
            .fetch(Request::new("https://img.example.com/garbage"))
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));

        loader.shutdown().await;
    }
}
