#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::rc::Rc;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tessera_io::{CgiSink, LocalFs, open_dir_cache};
use tessera_pipeline::{CacheStore, Color, Format, Pipeline, Rectangle, Scale, cache_file_name};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tessera_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_png(path: &std::path::Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 40, 255]));
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn pipeline(cache_dir: &std::path::Path) -> Pipeline {
    let cache = Rc::new(open_dir_cache(cache_dir).unwrap());
    Pipeline::new(Rc::new(LocalFs)).with_cache(cache)
}

#[test]
fn directory_cache_round_trips_artifacts() {
    let tmp = temp_dir("dir_cache_round_trip");
    let source = tmp.join("photo.png");
    write_png(&source, 80, 40);
    let cache_dir = tmp.join("cache");

    let mut p = pipeline(&cache_dir);
    p.load(&source).unwrap();
    p.add_operation(Scale::new(Some(20), None));
    let bytes = p.encode(Format::Png).unwrap();

    let fp = p.last_fingerprint().unwrap();
    let entry = cache_dir.join(cache_file_name(fp, Format::Png));
    assert!(entry.is_file());
    assert_eq!(std::fs::read(&entry).unwrap(), bytes);

    let cache = open_dir_cache(&cache_dir).unwrap();
    assert!(cache.exists(fp, Format::Png));
    assert_eq!(cache.read(fp, Format::Png).unwrap(), bytes);

    // A fresh pipeline with the same recipe reuses the entry.
    let mut again = pipeline(&cache_dir);
    again.load(&source).unwrap();
    again.add_operation(Scale::new(Some(20), None));
    assert_eq!(again.encode(Format::Png).unwrap(), bytes);
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn save_writes_target_file() {
    let tmp = temp_dir("dir_cache_save");
    let mut p = pipeline(&tmp.join("cache"));
    p.create(30, 30).unwrap();
    p.add_operation(Rectangle::new(5, 5, 10, 10).color(Color::rgb(0, 0, 255)));
    let target = tmp.join("out.gif");
    p.save(&target, None).unwrap();
    let saved = image::open(&target).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (30, 30));

    // Served from cache the second time; the existing target is current.
    let mut again = pipeline(&tmp.join("cache"));
    again.create(30, 30).unwrap();
    again.add_operation(Rectangle::new(5, 5, 10, 10).color(Color::rgb(0, 0, 255)));
    again.save(&target, None).unwrap();
    assert!(target.is_file());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn cgi_sink_streams_header_and_body() {
    let tmp = temp_dir("dir_cache_cgi");
    let source = tmp.join("photo.jpeg");
    let img = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]));
    image::DynamicImage::ImageRgba8(img)
        .to_rgb8()
        .save_with_format(&source, image::ImageFormat::Jpeg)
        .unwrap();

    let mut p = pipeline(&tmp.join("cache"));
    p.load(&source).unwrap();
    let mut sink = CgiSink::new(Vec::new());
    p.send_to(&mut sink, None).unwrap();
    let out = sink.into_inner().unwrap();

    let header = b"Content-Type: image/png\r\n\r\n";
    assert!(out.starts_with(header));
    assert_eq!(&out[header.len()..header.len() + 2], &[0xFF, 0xD8]);

    std::fs::remove_dir_all(&tmp).ok();
}
