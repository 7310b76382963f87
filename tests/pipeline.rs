//! Integration tests for the capture pipeline.
//!
//! Everything runs against the in-process [`VirtualBrowser`], so no real
//! browser and no LLM calls are needed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::sync::Arc;
use tabscribe::browser::VirtualBrowser;
use tabscribe::selector::surface::{Key, PageEvent};
use tabscribe::{
    export_images, AbortReason, CaptureCoordinator, CapturedImage, Envelope, Handled, ImageStore,
    JsonFileBackend, MemoryBackend, Point, ScribeConfig, Settings, TabId, ViewportRaster,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// 1600×1200 device pixels at scale 2: left half red, right half blue.
fn two_tone_viewport() -> ViewportRaster {
    let img = RgbaImage::from_fn(1600, 1200, |x, _| {
        if x < 800 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    ViewportRaster::new(DynamicImage::ImageRgba8(img), 2.0)
}

/// Library logs go to the test output; set `RUST_LOG=tabscribe=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

struct Rig {
    browser: Arc<VirtualBrowser>,
    store: Arc<ImageStore>,
    coordinator: CaptureCoordinator,
    rx: UnboundedReceiver<Envelope>,
}

fn rig_with(store: Arc<ImageStore>) -> Rig {
    init_tracing();
    let browser = Arc::new(VirtualBrowser::new());
    let (coordinator, rx) = CaptureCoordinator::new(
        browser.clone(),
        browser.clone(),
        store.clone(),
        &ScribeConfig::default(),
    );
    Rig {
        browser,
        store,
        coordinator,
        rx,
    }
}

fn rig() -> Rig {
    rig_with(Arc::new(ImageStore::new(Arc::new(MemoryBackend::default()))))
}

fn drag(browser: &VirtualBrowser, tab: TabId, path: &[Point]) {
    let (first, rest) = path.split_first().expect("non-empty path");
    browser.dispatch(tab, PageEvent::PointerDown(*first));
    for p in rest {
        browser.dispatch(tab, PageEvent::PointerMove(*p));
    }
    let last = rest.last().unwrap_or(first);
    browser.dispatch(tab, PageEvent::PointerUp(*last));
}

fn decode(image: &CapturedImage) -> DynamicImage {
    image::load_from_memory(&image.png_bytes().expect("png bytes")).expect("decodable png")
}

fn is_red(px: Rgba<u8>) -> bool {
    px[0] > 250 && px[2] < 5
}

fn is_blue(px: Rgba<u8>) -> bool {
    px[2] > 250 && px[0] < 5
}

async fn next_handled(rig: &mut Rig) -> Handled {
    let env = rig.rx.recv().await.expect("selector reported");
    rig.coordinator.handle(env).await
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn drag_across_boundary_captures_both_halves() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();

    // Drag right to left; the rect is normalised.
    drag(
        &rig.browser,
        tab,
        &[Point::new(500.0, 300.0), Point::new(450.0, 250.0), Point::new(300.0, 200.0)],
    );
    assert_eq!(next_handled(&mut rig).await, Handled::Stored { len: 1 });

    let images = rig.store.images().await.unwrap();
    let png = decode(&images[0]);
    assert_eq!(png.dimensions(), (200, 100));
    assert!(is_red(png.get_pixel(10, 50)));
    assert!(is_blue(png.get_pixel(190, 50)));
}

#[tokio::test]
async fn small_drag_is_not_captured() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();

    drag(&rig.browser, tab, &[Point::new(100.0, 100.0), Point::new(108.0, 300.0)]);
    assert_eq!(
        next_handled(&mut rig).await,
        Handled::Aborted(AbortReason::BelowThreshold)
    );
    assert!(rig.store.images().await.unwrap().is_empty());
    assert_eq!(rig.coordinator.in_flight(tab).await, None);
}

#[tokio::test]
async fn escape_mid_drag_cleans_up_the_page() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    let before = rig.browser.page_counts(tab).unwrap();
    rig.coordinator.start_capture().await.unwrap();

    rig.browser.dispatch(tab, PageEvent::PointerDown(Point::new(10.0, 10.0)));
    rig.browser.dispatch(tab, PageEvent::PointerMove(Point::new(200.0, 200.0)));
    rig.browser.dispatch(tab, PageEvent::KeyDown(Key::Escape));

    assert_eq!(
        next_handled(&mut rig).await,
        Handled::Aborted(AbortReason::Cancelled)
    );
    assert_eq!(rig.browser.overlay_count(tab), 0);
    assert_eq!(rig.browser.page_counts(tab).unwrap(), before);
    assert!(!rig.browser.has_session(tab));
}

#[tokio::test]
async fn page_is_restored_after_every_outcome() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    let before = rig.browser.page_counts(tab).unwrap();

    for path in [
        vec![Point::new(0.0, 0.0), Point::new(100.0, 100.0)],
        vec![Point::new(0.0, 0.0), Point::new(3.0, 3.0)],
    ] {
        rig.coordinator.start_capture().await.unwrap();
        assert_eq!(rig.browser.overlay_count(tab), 1);
        drag(&rig.browser, tab, &path);
        next_handled(&mut rig).await;
        assert_eq!(rig.browser.page_counts(tab).unwrap(), before);
    }
    assert_eq!(rig.store.images().await.unwrap().len(), 1);
}

#[tokio::test]
async fn events_after_completion_do_nothing() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();
    drag(&rig.browser, tab, &[Point::new(0.0, 0.0), Point::new(50.0, 50.0)]);

    assert!(rig.browser.dispatch(tab, PageEvent::PointerDown(Point::new(1.0, 1.0))).is_none());
    assert!(rig.browser.dispatch(tab, PageEvent::KeyDown(Key::Escape)).is_none());

    next_handled(&mut rig).await;
    assert!(rig.rx.try_recv().is_err(), "exactly one message per session");
}

#[tokio::test]
async fn tabs_capture_independently() {
    let mut rig = rig();
    let a = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();
    let b = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();

    drag(&rig.browser, b, &[Point::new(500.0, 0.0), Point::new(600.0, 40.0)]);
    drag(&rig.browser, a, &[Point::new(0.0, 0.0), Point::new(40.0, 40.0)]);

    assert_eq!(next_handled(&mut rig).await, Handled::Stored { len: 1 });
    assert_eq!(next_handled(&mut rig).await, Handled::Stored { len: 2 });

    let images = rig.store.images().await.unwrap();
    assert!(is_blue(decode(&images[0]).get_pixel(0, 0)), "tab b first");
    assert!(is_red(decode(&images[1]).get_pixel(0, 0)));
}

#[tokio::test]
async fn subscribers_see_each_change_in_order() {
    let mut rig = rig();
    let mut sub = rig.store.subscribe().await;
    let tab = rig.browser.open_tab(two_tone_viewport());

    for _ in 0..2 {
        rig.coordinator.start_capture().await.unwrap();
        drag(&rig.browser, tab, &[Point::new(0.0, 0.0), Point::new(30.0, 30.0)]);
        next_handled(&mut rig).await;
    }
    rig.store.remove_at(0).await.unwrap();

    let lens: Vec<usize> = [
        sub.recv().await.unwrap().len(),
        sub.recv().await.unwrap().len(),
        sub.recv().await.unwrap().len(),
    ]
    .into();
    assert_eq!(lens, vec![1, 2, 1]);
}

#[tokio::test]
async fn pointer_leaving_the_viewport_keeps_crop_aligned() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();

    drag(&rig.browser, tab, &[Point::new(420.0, 100.0), Point::new(-60.0, 140.0)]);
    assert_eq!(next_handled(&mut rig).await, Handled::Stored { len: 1 });

    let png = decode(&rig.store.images().await.unwrap()[0]);
    assert_eq!(png.dimensions(), (420, 40));
    assert!(is_red(png.get_pixel(5, 20)), "left edge starts at viewport x=0");
    assert!(is_red(png.get_pixel(390, 20)));
    assert!(is_blue(png.get_pixel(410, 20)));
}

#[tokio::test]
async fn closing_a_tab_mid_drag_frees_it() {
    let mut rig = rig();
    let tab = rig.browser.open_tab(two_tone_viewport());
    rig.coordinator.start_capture().await.unwrap();
    rig.browser.dispatch(tab, PageEvent::PointerDown(Point::new(5.0, 5.0)));
    rig.browser.close_tab(tab);

    assert_eq!(
        next_handled(&mut rig).await,
        Handled::Aborted(AbortReason::TabClosed)
    );
    assert_eq!(rig.coordinator.in_flight(tab).await, None);
    assert!(rig.store.images().await.unwrap().is_empty());
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn collection_survives_reopen_and_exports_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(JsonFileBackend::in_dir(dir.path()));

    {
        let mut rig = rig_with(Arc::new(ImageStore::new(backend.clone())));
        let tab = rig.browser.open_tab(two_tone_viewport());
        for path in [
            [Point::new(0.0, 0.0), Point::new(40.0, 20.0)],
            [Point::new(700.0, 0.0), Point::new(760.0, 30.0)],
        ] {
            rig.coordinator.start_capture().await.unwrap();
            drag(&rig.browser, tab, &path);
            next_handled(&mut rig).await;
        }
    }

    let reopened = ImageStore::new(Arc::new(JsonFileBackend::in_dir(dir.path())));
    let images = reopened.images().await.unwrap();
    assert_eq!(images.len(), 2);
    assert!(images[0].timestamp() <= images[1].timestamp());

    let out = tempfile::tempdir().unwrap();
    let paths = export_images(&images, out.path()).unwrap();
    assert_eq!(image::open(&paths[0]).unwrap().dimensions(), (40, 20));
    assert_eq!(image::open(&paths[1]).unwrap().dimensions(), (60, 30));
}

#[tokio::test]
async fn settings_live_apart_from_images() {
    let dir = tempfile::tempdir().unwrap();
    let config = ScribeConfig::builder().data_dir(dir.path()).build().unwrap();
    let store = ImageStore::new(Arc::new(config.image_backend()));
    store
        .append(CapturedImage::with_timestamp("data:image/png;base64,AAAA", 1))
        .await
        .unwrap();

    let mut settings = Settings::default();
    settings.default_title = Some("Lecture notes".into());
    settings.save(&config.settings_path()).unwrap();

    Settings::reset(&config.settings_path()).unwrap();
    assert_eq!(Settings::load(&config.settings_path()).unwrap(), Settings::default());
    assert_eq!(store.images().await.unwrap().len(), 1, "images untouched by settings reset");
}
