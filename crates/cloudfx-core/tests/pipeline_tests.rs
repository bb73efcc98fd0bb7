//! End-to-end session behavior over fake upload and probe seams

use cloudfx_core::{
    DetectorState, Phase, PipelineError, Session, TransformParams, UploadChannel, UploadError,
};
use cloudfx_test_utils::{
    delivery_url, sample_image, setup_test_session, test_composer, test_config, uploaded_asset,
    FakeProbe, FakeUploader,
};
use cloudfx_transform::AssetId;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn size(width: i64, height: i64) -> TransformParams {
    TransformParams::new().with("width", width).with("height", height)
}

#[tokio::test(start_paused = true)]
async fn baseline_upload_becomes_ready() {
    let uploader = Arc::new(FakeUploader::new().then_ok("x"));
    let session = setup_test_session(uploader.clone(), Arc::new(FakeProbe::always()));

    let u0 = session.upload_the_image(&sample_image()).await.unwrap();
    assert_eq!(u0, *uploaded_asset("x").delivery_url(true));
    assert_eq!(session.url(), Some(u0.clone()));

    assert_eq!(session.wait_until_ready().await.unwrap(), u0);
    assert!(!session.processing());
    assert_eq!(uploader.calls()[0].channel, UploadChannel::Neutral);
}

#[test]
fn resize_fill_segment_precedes_asset() {
    let asset = AssetId::new("abc123").unwrap();
    let url = test_composer().resize_fill_image(&asset, 200, 100).unwrap();
    assert_eq!(url, delivery_url("c_fill,h_100,w_200/abc123"));
}

#[test]
fn profile_needs_no_params() {
    let asset = AssetId::new("xyz").unwrap();
    let url = test_composer().profile_image(&asset);
    assert_eq!(url, delivery_url("c_fill,h_170,w_170/r_max/xyz"));
}

#[tokio::test(start_paused = true)]
async fn reset_restores_baseline_not_transform() {
    let uploader = Arc::new(FakeUploader::new().then_ok("base").then_ok("derived"));
    let session = setup_test_session(uploader, Arc::new(FakeProbe::always()));

    let u0 = session.upload_the_image(&sample_image()).await.unwrap();
    let transformed = session
        .invoke("resizeFillImage", &sample_image(), &size(200, 100))
        .await
        .unwrap();
    assert_eq!(transformed, delivery_url("c_fill,h_100,w_200/derived"));
    assert_eq!(session.url(), Some(transformed));

    assert_eq!(session.reset_image().unwrap(), u0);
    assert_eq!(session.url(), Some(u0.clone()));
    assert_eq!(session.wait_until_ready().await.unwrap(), u0);
}

#[tokio::test(start_paused = true)]
async fn reset_is_idempotent() {
    let uploader = Arc::new(FakeUploader::new().then_ok("base"));
    let session = setup_test_session(uploader.clone(), Arc::new(FakeProbe::always()));
    let u0 = session.upload_the_image(&sample_image()).await.unwrap();

    let first = session.reset_image().unwrap();
    let second = session.reset_image().unwrap();
    assert_eq!(first, u0);
    assert_eq!(second, u0);
    assert_eq!(session.wait_until_ready().await.unwrap(), u0);
    assert_eq!(uploader.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn network_failure_leaves_state_untouched() {
    let uploader = Arc::new(
        FakeUploader::new().then_err(UploadError::Transport("dns error".to_string())),
    );
    let session = setup_test_session(uploader, Arc::new(FakeProbe::always()));

    let err = session.upload_the_image(&sample_image()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Upload(UploadError::Transport(_))));
    assert!(err.is_retryable());

    let state = session.state();
    assert!(state.processing());
    assert_eq!(state.current_url(), None);
    assert_eq!(state.phase(), Phase::Idle);
    assert!(state.original().is_none());
    assert!(matches!(session.reset_image(), Err(PipelineError::NoBaseline)));
}

#[tokio::test(start_paused = true)]
async fn failure_after_transform_keeps_transformed_url() {
    let uploader = Arc::new(
        FakeUploader::new()
            .then_ok("a")
            .then_err(UploadError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
    );
    let session = setup_test_session(uploader, Arc::new(FakeProbe::succeeding_after(3)));

    let url = session
        .invoke("imageBrightness", &sample_image(), &TransformParams::new().with("brightness", 40))
        .await
        .unwrap();
    // fails while the first render is still pending
    assert!(session.upload_image(&sample_image()).await.is_err());

    assert_eq!(session.url(), Some(url.clone()));
    assert_eq!(session.state().phase(), Phase::AwaitingRender);
    assert_eq!(session.wait_until_ready().await.unwrap(), url);
}

#[tokio::test(start_paused = true)]
async fn ready_implies_confirmed_url() {
    let probe = Arc::new(FakeProbe::succeeding_after(4));
    let session = setup_test_session(Arc::new(FakeUploader::new()), probe.clone());
    let mut rx = session.subscribe();

    let url = session
        .invoke("pixelFace", &sample_image(), &TransformParams::new().with("pixelation", 20))
        .await
        .unwrap();

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        if !state.processing() {
            assert_eq!(state.current_url(), Some(&url));
            assert_eq!(probe.calls(&url), 4);
            break;
        }
    }
    assert_eq!(session.detector_state(), DetectorState::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn only_latest_url_is_polled() {
    let probe = Arc::new(FakeProbe::never());
    let session = setup_test_session(Arc::new(FakeUploader::new()), probe.clone());

    let first = session
        .invoke("resizeImage", &sample_image(), &size(10, 10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let first_calls = probe.calls(&first);
    assert_eq!(first_calls, 2);

    let second = session
        .invoke("resizeImage", &sample_image(), &size(20, 20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(probe.calls(&first), first_calls);
    assert!(probe.calls(&second) >= 5);
    assert_eq!(session.detector_state(), DetectorState::Polling);
}

#[tokio::test(start_paused = true)]
async fn render_timeout_is_reported() {
    let session = setup_test_session(Arc::new(FakeUploader::new()), Arc::new(FakeProbe::never()));
    let url = session
        .invoke("profileImage", &sample_image(), &TransformParams::new())
        .await
        .unwrap();

    match session.wait_until_ready().await {
        Err(PipelineError::DecodeTimeout { url: polled, attempts }) => {
            assert_eq!(polled, url);
            assert_eq!(attempts, 10);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state().phase(), Phase::RenderTimedOut { attempts: 10 });
    assert!(session.processing());
}

#[tokio::test(start_paused = true)]
async fn last_completion_wins() {
    let uploader = Arc::new(
        FakeUploader::new()
            .then_ok_after("slow", Duration::from_secs(2))
            .then_ok("fast"),
    );
    let session = setup_test_session(uploader, Arc::new(FakeProbe::always()));
    let image = sample_image();

    let (size_slow, size_fast) = (size(1, 1), size(2, 2));
    let (slow, fast) = futures::join!(
        session.invoke("resizeFillImage", &image, &size_slow),
        session.invoke("resizeFillImage", &image, &size_fast),
    );
    let slow = slow.unwrap();
    assert_eq!(fast.unwrap(), delivery_url("c_fill,h_2,w_2/fast"));
    assert_eq!(slow, delivery_url("c_fill,h_1,w_1/slow"));

    assert_eq!(session.url(), Some(slow.clone()));
    assert_eq!(session.wait_until_ready().await.unwrap(), slow);
}

#[tokio::test(start_paused = true)]
async fn stale_failure_does_not_roll_back_newer_publish() {
    let uploader = Arc::new(
        FakeUploader::new()
            .then_err_after(UploadError::Timeout, Duration::from_secs(2))
            .then_ok("fast"),
    );
    let session = setup_test_session(uploader, Arc::new(FakeProbe::always()));
    let image = sample_image();

    let (params_slow, params_fast) = (TransformParams::new(), TransformParams::new());
    let (slow, fast) = futures::join!(
        session.invoke("profileImage", &image, &params_slow),
        session.invoke("profileImage", &image, &params_fast),
    );
    assert!(matches!(slow, Err(PipelineError::Upload(UploadError::Timeout))));
    let fast = fast.unwrap();

    let state = session.state();
    assert_eq!(state.current_url(), Some(&fast));
    assert_eq!(state.phase(), Phase::Ready);
    assert_eq!(state.last_error(), Some("upload timed out"));
}

#[tokio::test(start_paused = true)]
async fn remove_background_uses_default_channel() {
    let uploader = Arc::new(FakeUploader::new().then_ok("cat"));
    let session = setup_test_session(uploader.clone(), Arc::new(FakeProbe::always()));

    let url = session
        .invoke("uploadImage", &sample_image(), &TransformParams::new())
        .await
        .unwrap();
    assert_eq!(url, delivery_url("e_background_removal/cat"));

    let calls = uploader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].channel, UploadChannel::Default);
    assert_eq!(calls[0].file_name, "sample.png");
}

#[tokio::test]
async fn session_from_test_config() {
    let session = Session::new(&test_config()).unwrap();
    assert_eq!(session.effects().len(), 6);
    assert_eq!(
        session.composer().base().as_str(),
        "https://res.cloudinary.com/demo/image/upload"
    );
}
