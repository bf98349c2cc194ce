//! Ingest an image and render one frame for a simulated clock.
//!
//! Run with:
//! ```sh
//! cargo run --example render_frame -- path/to/photo.jpg
//! ```
//!
//! Without an argument a generated gradient is used. The dithered panel
//! image is written to `frame_preview.png`.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use paperclock::transport::{channel_name, decode_frame_message};
use paperclock::{
    Device, DeviceId, DeviceType, FrameEncoder, IndexedImage, Ingestor, MemoryPublisher,
    MemoryStore, QueueStore, RenderDispatcher, Settings, UploadSpec,
};

fn gradient() -> Result<Vec<u8>, paperclock::Error> {
    let img = RgbImage::from_fn(640, 400, |x, y| {
        Rgb([(x * 255 / 639) as u8, (y * 255 / 399) as u8, 160])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[tokio::main]
async fn main() -> Result<(), paperclock::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let source = match std::env::args().nth(1) {
        Some(path) => std::fs::read(&path)?,
        None => gradient()?,
    };

    let assets = std::env::temp_dir().join("paperclock-demo");
    let settings = Settings::default().with_env().with_asset_dir(&assets);
    let store = Arc::new(MemoryStore::new());
    let queues = Arc::new(QueueStore::new());
    let publisher = Arc::new(MemoryPublisher::new());

    let ingestor = Arc::new(Ingestor::new(settings.clone(), store.clone())?);
    let spec = UploadSpec {
        x: 0.55,
        y: 0.65,
        width: 0.4,
        height: 0.25,
        text_color: "white".to_string(),
        shadow_color: "black".to_string(),
    };
    let outcome = ingestor.spawn_ingest(source, spec)?.await??;
    println!(
        "Stored wallpaper {} as {}",
        outcome.wallpaper().id,
        ingestor.asset_path(outcome.wallpaper()).display()
    );

    let device = Device::new(DeviceId(1), "10.0.0.7", DeviceType::Spectra6);
    store.put_device(device.clone());
    queues.append(device.id, outcome.wallpaper().id, store.as_ref())?;

    let draw_channel = channel_name(&settings.draw_channel_prefix, &device.address);
    let dispatcher = Arc::new(RenderDispatcher::new(
        settings,
        store.clone(),
        store.clone(),
        queues,
        publisher.clone(),
    )?);
    for (id, result) in dispatcher.tick_all().await {
        println!("Device {}: {:?}", id, result?);
    }

    for payload in publisher.on_channel(&draw_channel) {
        println!("{} <- {} chars", draw_channel, payload.len());
        let packed = decode_frame_message(&payload)?;
        let codes = FrameEncoder::for_device(device.device_type)
            .frame_from_bytes(packed)?
            .unpack();
        let (width, height) = device.device_type.native_size();
        let preview = IndexedImage::from_codes(width, height, codes)?.to_rgb(&device.palette());
        preview.save("frame_preview.png")?;
        println!("Wrote frame_preview.png");
    }
    Ok(())
}
