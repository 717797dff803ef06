//! Background-removal conversation tests with a scripted removal API.


use image::Rgba;
use std::time::Duration;

use stashbot::flow::{
    Command, CutoutCoordinator, EventHandler, EventKind, OutboundAction, RecompositeRequest,
};
use stashbot::removal_api::RemovalError;
use stashbot::session::InteractionState;
use test_helpers::*;

const MAX_SIZE: u64 = 10_000_000;

fn coordinator(
    remover: FakeRemover,
    fetcher: FakeFetcher,
) -> CutoutCoordinator<FakeRemover, FakeFetcher> {
    CutoutCoordinator::new(
        test_context(100, MAX_SIZE),
        remover,
        fetcher,
        Duration::from_secs(5),
    )
}

fn with_photo() -> FakeFetcher {
    FakeFetcher::new().with("photo-1", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

#[tokio::test]
async fn test_photo_upload_offers_palette() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let actions = bot.handle(upload(USER, photo("photo-1", 4))).await;
    match &actions[..] {
        [OutboundAction::SendText {
            keyboard: Some(keyboard),
            ..
        }] => {
            assert!(keyboard.iter().all(|row| row.len() <= 3));
            let data: Vec<_> = keyboard.iter().flatten().map(|b| b.data.as_str()).collect();
            assert_eq!(data.len(), 13);
            assert!(data.contains(&"bg:transparent"));
            assert!(data.contains(&"bg:navy"));
        }
        other => panic!("expected palette, got {:?}", other),
    }
    assert_eq!(
        bot.context().sessions.state(USER),
        InteractionState::AwaitingBackgroundChoice
    );
}

#[tokio::test]
async fn test_choice_delivers_png_and_clears_session() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());
    bot.handle(upload(USER, photo("photo-1", 4))).await;

    let actions = bot.handle(callback(USER, "bg:red", 21)).await;
    assert_eq!(actions.len(), 2);
    match &actions[0] {
        OutboundAction::EditText { message_id, text, .. } => {
            assert_eq!(*message_id, 21);
            assert!(text.contains("Background removed"));
        }
        other => panic!("expected edited palette, got {:?}", other),
    }
    match &actions[1] {
        OutboundAction::SendImage { bytes, file_name, .. } => {
            assert_eq!(file_name, "no_bg.png");
            assert_eq!(bytes, &cutout_png());
        }
        other => panic!("expected image delivery, got {:?}", other),
    }

    assert_eq!(bot.remover().last_color.lock().as_deref(), Some("ff0000"));
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_transparent_choice_sends_no_color() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());
    bot.handle(upload(USER, photo("photo-1", 4))).await;
    bot.handle(callback(USER, "bg:transparent", 1)).await;

    assert_eq!(bot.remover().call_count(), 1);
    assert_eq!(*bot.remover().last_color.lock(), None);
}

#[tokio::test]
async fn test_quota_exceeded_is_reported_and_session_released() {
    let bot = coordinator(FakeRemover::failing(RemovalError::QuotaExceeded), with_photo());
    bot.handle(upload(USER, photo("photo-1", 4))).await;

    let reply = single_text(&bot.handle(callback(USER, "bg:white", 2)).await);
    assert!(reply.contains("quota"), "{}", reply);
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_each_failure_class_has_its_own_message() {
    let cases = [
        (RemovalError::BadRequest("bad".into()), "could not be processed"),
        (RemovalError::Unauthorized, "credentials"),
        (RemovalError::Timeout, "too long"),
        (
            RemovalError::Unknown {
                status: Some(500),
                detail: "boom".into(),
            },
            "failed",
        ),
    ];

    for (err, expected) in cases {
        let bot = coordinator(FakeRemover::failing(err), with_photo());
        bot.handle(upload(USER, photo("photo-1", 4))).await;
        let reply = single_text(&bot.handle(callback(USER, "bg:blue", 2)).await);
        assert!(reply.contains(expected), "{} !~ {}", reply, expected);
    }
}

#[tokio::test]
async fn test_slow_api_times_out() {
    let bot = CutoutCoordinator::new(
        test_context(100, MAX_SIZE),
        FakeRemover::slow(Duration::from_secs(5)),
        with_photo(),
        Duration::from_millis(50),
    );
    bot.handle(upload(USER, photo("photo-1", 4))).await;

    let reply = single_text(&bot.handle(callback(USER, "bg:white", 2)).await);
    assert!(reply.contains("too long"));
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_choice_without_session_reports_expiry() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let reply = single_text(&bot.handle(callback(USER, "bg:white", 2)).await);
    assert!(reply.contains("expired"));
    assert_eq!(bot.remover().call_count(), 0);
}

#[tokio::test]
async fn test_oversized_photo_is_rejected_before_download() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let reply = single_text(&bot.handle(upload(USER, photo("photo-1", MAX_SIZE + 1))).await);
    assert!(reply.contains("too large"));
    assert_eq!(bot.fetcher().fetch_count(), 0);
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_failed_download_creates_no_session() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), FakeFetcher::new());

    let reply = single_text(&bot.handle(upload(USER, photo("missing", 4))).await);
    assert!(reply.contains("couldn't download"));
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_non_image_upload_gets_hint() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let reply = single_text(
        &bot.handle(upload(USER, document("doc", "notes.pdf", "application/pdf", 10)))
            .await,
    );
    assert!(reply.contains("send me a photo"));
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_text_hints_depend_on_state() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let idle = single_text(&bot.handle(text(USER, "hi")).await);
    assert!(idle.contains("send me a photo"));

    bot.handle(upload(USER, photo("photo-1", 4))).await;
    let waiting = single_text(&bot.handle(text(USER, "red please")).await);
    assert!(waiting.contains("buttons"));
    assert_eq!(
        bot.context().sessions.state(USER),
        InteractionState::AwaitingBackgroundChoice
    );
}

#[tokio::test]
async fn test_recomposite_over_named_color() {
    let fetcher = FakeFetcher::new().with("result-1", cutout_png());
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), fetcher);

    let actions = bot.handle(reply_with_color(USER, "result-1", "blue")).await;
    match &actions[..] {
        [OutboundAction::SendImage { bytes, file_name, .. }] => {
            assert_eq!(file_name, "composited.png");
            let image = decode(bytes);
            assert_eq!(image.dimensions(), (2, 1));
            assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
            assert_eq!(*image.get_pixel(1, 0), Rgba([255, 0, 0, 255]));
        }
        other => panic!("expected composited image, got {:?}", other),
    }
    assert_eq!(bot.remover().call_count(), 0);
    assert!(bot.context().sessions.is_empty());
}

#[tokio::test]
async fn test_recomposite_over_hex_color() {
    let fetcher = FakeFetcher::new().with("result-1", cutout_png());
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), fetcher);

    let actions = bot.handle(reply_with_color(USER, "result-1", "#0f0")).await;
    match &actions[..] {
        [OutboundAction::SendImage { bytes, .. }] => {
            assert_eq!(*decode(bytes).get_pixel(0, 0), Rgba([0, 255, 0, 255]));
        }
        other => panic!("expected composited image, got {:?}", other),
    }
}

#[tokio::test]
async fn test_recomposite_rejects_unknown_color_before_download() {
    let fetcher = FakeFetcher::new().with("result-1", cutout_png());
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), fetcher);

    let reply = single_text(&bot.handle(reply_with_color(USER, "result-1", "sparkly")).await);
    assert!(reply.contains("don't know that color"));
    assert_eq!(bot.fetcher().fetch_count(), 0);
}

#[tokio::test]
async fn test_recomposite_over_image() {
    let mut background = image::RgbaImage::new(4, 4);
    for pixel in background.pixels_mut() {
        *pixel = Rgba([10, 200, 30, 255]);
    }
    let fetcher = FakeFetcher::new()
        .with("result-1", cutout_png())
        .with("bg-photo", png_bytes(&background));
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), fetcher);

    let event = event(
        USER,
        EventKind::ReplyToResult {
            result: document("result-1", "no_bg.png", "image/png", 100),
            request: RecompositeRequest::Image(photo("bg-photo", 64)),
        },
    );
    let actions = bot.handle(event).await;
    match &actions[..] {
        [OutboundAction::SendImage { bytes, .. }] => {
            let image = decode(bytes);
            assert_eq!(image.dimensions(), (2, 1));
            let shown = image.get_pixel(0, 0).0;
            for (got, want) in shown.iter().zip([10u8, 200, 30, 255]) {
                assert!(got.abs_diff(want) <= 1, "{:?}", shown);
            }
            assert_eq!(*image.get_pixel(1, 0), Rgba([255, 0, 0, 255]));
        }
        other => panic!("expected composited image, got {:?}", other),
    }
    assert_eq!(bot.fetcher().fetch_count(), 2);
}

#[tokio::test]
async fn test_start_and_unknown_commands() {
    let bot = coordinator(FakeRemover::succeeding(cutout_png()), with_photo());

    let welcome = single_text(&bot.handle(command(USER, Command::Start)).await);
    assert!(welcome.contains("Test"));
    assert!(welcome.contains("remove its background"));

    let reply = single_text(&bot.handle(command(USER, Command::MyFiles)).await);
    assert!(reply.contains("/help"));
}
