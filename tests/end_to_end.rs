use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use paperclock::transport::decode_frame_message;
use paperclock::{
    should_sleep_at, DaySelector, Device, DeviceId, DeviceStore, DeviceType, FixedClock,
    Ingestor, MemoryPublisher, MemoryStore, PowerState, QueueStore, RenderDispatcher,
    ScheduleSpec, Settings, TickOutcome, UploadSpec, WallpaperId,
};

fn upload(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(120, 90, |x, y| {
        Rgb([(x * 2) as u8, (y * 2) as u8 ^ seed, seed])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn label() -> UploadSpec {
    UploadSpec {
        x: 0.6,
        y: 0.7,
        width: 0.35,
        height: 0.2,
        text_color: "yellow".to_string(),
        shadow_color: "black".to_string(),
    }
}

#[tokio::test]
async fn test_reupload_yields_same_hash() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let settings = Settings::default()
        .with_asset_dir(dir.path())
        .with_canvas(80, 48);
    let ingestor = Arc::new(Ingestor::new(settings, store.clone()).unwrap());

    let first = ingestor
        .spawn_ingest(upload(9), label())
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    let second = ingestor
        .spawn_ingest(upload(9), label())
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.wallpaper().hash, second.wallpaper().hash);
    assert_eq!(store.wallpaper_count(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_rotate_then_move_to_front() {
    let queues = QueueStore::new();
    let device = DeviceId(1);
    queues
        .load(device, [WallpaperId(3), WallpaperId(7), WallpaperId(9)])
        .unwrap();

    queues.shift_next(device);
    assert_eq!(
        queues.snapshot(device),
        vec![WallpaperId(7), WallpaperId(9), WallpaperId(3)]
    );

    queues.move_to_front(device, WallpaperId(9)).unwrap();
    assert_eq!(
        queues.snapshot(device),
        vec![WallpaperId(9), WallpaperId(7), WallpaperId(3)]
    );
}

#[test]
fn test_late_window_wraps_past_midnight() {
    let schedule = ScheduleSpec {
        days: DaySelector::Named("everyday".to_string()),
        start: "23:30".to_string(),
        duration: 60,
        enabled: true,
    }
    .validate(1, DeviceId(1))
    .unwrap();
    let schedules = [schedule];

    // 2024-01-01 is a Monday.
    let at = |d, h, m| Utc.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap();
    assert!(should_sleep_at(&schedules, &at(1, 23, 45)));
    assert!(should_sleep_at(&schedules, &at(2, 0, 15)));
    assert!(!should_sleep_at(&schedules, &at(2, 0, 45)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_to_published_frame() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default()
        .with_asset_dir(dir.path())
        .with_canvas(80, 48);
    let store = Arc::new(MemoryStore::new());
    let queues = Arc::new(QueueStore::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let ingestor = Arc::new(Ingestor::new(settings.clone(), store.clone()).unwrap());
    let a = ingestor.ingest_bytes(&upload(1), &label()).unwrap();
    let b = ingestor.ingest_bytes(&upload(2), &label()).unwrap();

    let device = Device::new(DeviceId(5), "clock-5", DeviceType::Acep7);
    store.put_device(device.clone());
    queues
        .append(device.id, a.wallpaper().id, store.as_ref())
        .unwrap();
    queues
        .append(device.id, b.wallpaper().id, store.as_ref())
        .unwrap();

    // Monday 22:10 UTC, before a 22:30 sleep window.
    let evening = Utc.with_ymd_and_hms(2024, 1, 1, 22, 10, 0).unwrap();
    store.put_schedules(
        device.id,
        vec![ScheduleSpec {
            days: DaySelector::List(vec!["mon".to_string()]),
            start: "22:30".to_string(),
            duration: 480,
            enabled: true,
        }
        .validate(1, device.id)
        .unwrap()],
    );

    let dispatcher = RenderDispatcher::new(
        settings.clone(),
        store.clone(),
        store.clone(),
        queues.clone(),
        publisher.clone(),
    )
    .unwrap()
    .with_clock(Arc::new(FixedClock(evening)));
    let dispatcher = Arc::new(dispatcher);

    let outcomes = dispatcher.tick_all().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].1,
        Ok(TickOutcome::Rendered(id)) if id == a.wallpaper().id
    ));

    let frames = publisher.on_channel("draw_clock-5");
    assert_eq!(frames.len(), 1);
    let packed = decode_frame_message(&frames[0]).unwrap();
    assert_eq!(packed.len(), 800 * 480 / 2);
    assert!(packed.iter().all(|b| (b >> 4) <= 6 && (b & 0x0F) <= 6));

    assert_eq!(dispatcher.next(device.id).unwrap(), Some(b.wallpaper().id));
    assert_eq!(publisher.on_channel("draw_clock-5").len(), 2);

    // Inside the window: one clear, then silence.
    let night = dispatcher
        .as_ref()
        .clone()
        .with_clock(Arc::new(FixedClock(evening + chrono::Duration::minutes(30))));
    assert_eq!(night.tick(device.id).unwrap(), TickOutcome::Cleared);
    assert_eq!(night.tick(device.id).unwrap(), TickOutcome::Asleep);
    assert_eq!(publisher.on_channel("clear_clock-5"), vec!["clear"]);
    assert_eq!(store.power_state(device.id), PowerState::Sleep);

    // Deleting a wallpaper unqueues it everywhere.
    ingestor.delete(b.wallpaper().id, &queues).unwrap();
    assert_eq!(queues.snapshot(device.id), vec![a.wallpaper().id]);
}
