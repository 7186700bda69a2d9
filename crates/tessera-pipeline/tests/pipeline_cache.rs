//! End-to-end cache behavior of the pipeline over an in-memory
//! filesystem.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, UNIX_EPOCH};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tessera_pipeline::{
    BufferSink, CacheStore, Color, Crop, Dimensions, Filesystem, Format, FsCache, Line, MemoryFs,
    Overlay, Pipeline, PipelineConfig, PipelineError, Rectangle, Recipe, Rotate, Scale,
    ScaleAndCrop, Text, cache_file_name,
};

const CACHE_DIR: &str = "/cache";

struct Harness {
    fs: Rc<MemoryFs>,
    cache: Rc<FsCache>,
}

impl Harness {
    fn new() -> Self {
        let fs = Rc::new(MemoryFs::new());
        let cache = Rc::new(FsCache::new(fs.clone(), CACHE_DIR));
        Self { fs, cache }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.fs.clone()).with_cache(self.cache.clone())
    }

    fn cache_entries(&self) -> usize {
        self.fs
            .paths()
            .iter()
            .filter(|p| p.starts_with(CACHE_DIR))
            .count()
    }

    /// Store a `width`×`height` gradient PNG at `path`.
    fn insert_png(&self, path: &str, width: u32, height: u32) {
        self.fs.insert(path, png_bytes(&gradient(width, height)));
    }
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90, 255])
    })
}

fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .unwrap();
    bytes
}

fn red() -> Color {
    Color::rgb(255, 0, 0)
}

// --- Idempotence ---

#[test]
fn second_request_is_served_from_cache() {
    let h = Harness::new();
    let mut first = h.pipeline();
    first.create(64, 32).unwrap();
    first.add_operation(Rectangle::new(4, 4, 10, 10).color(red()));
    first.add_operation(Rotate::new(30.0));
    let bytes = first.encode(Format::Png).unwrap();
    let writes = h.fs.writes();
    assert_eq!(h.cache_entries(), 1);

    let mut second = h.pipeline();
    second.create(64, 32).unwrap();
    second.add_operation(Rectangle::new(4, 4, 10, 10).color(red()));
    second.add_operation(Rotate::new(30.0));
    assert_eq!(second.encode(Format::Png).unwrap(), bytes);
    assert_eq!(h.fs.writes(), writes);
    assert!(second.is_up_to_date());
}

#[test]
fn cached_entry_is_named_by_fingerprint() {
    let h = Harness::new();
    let mut pipeline = h.pipeline();
    pipeline.create(8, 8).unwrap();
    pipeline.encode(Format::Gif).unwrap();
    let fp = pipeline.last_fingerprint().unwrap();
    let expected = Path::new(CACHE_DIR).join(cache_file_name(fp, Format::Gif));
    assert!(h.fs.exists(&expected));
    assert!(h.cache.exists(fp, Format::Gif));
    assert!(!h.cache.exists(fp, Format::Png));
}

#[test]
fn cache_disabled_never_writes() {
    let h = Harness::new();
    let mut pipeline = h.pipeline();
    pipeline.set_use_cache(false);
    pipeline.create(8, 8).unwrap();
    pipeline.encode(Format::Png).unwrap();
    assert_eq!(h.cache_entries(), 0);
}

// --- Fingerprint sensitivity ---

#[test]
fn fingerprint_changes_with_any_parameter() {
    let h = Harness::new();
    let key = |op: Rectangle| {
        let mut p = h.pipeline();
        p.create(32, 32).unwrap();
        p.add_operation(op);
        p.fingerprint(Format::Png).unwrap()
    };
    let base = key(Rectangle::new(1, 1, 5, 5));
    assert_eq!(base, key(Rectangle::new(1, 1, 5, 5)));
    assert_ne!(base, key(Rectangle::new(2, 1, 5, 5)));
    assert_ne!(base, key(Rectangle::new(1, 1, 6, 5)));
    assert_ne!(base, key(Rectangle::new(1, 1, 5, 5).color(red())));
}

#[test]
fn fingerprint_is_order_sensitive() {
    let h = Harness::new();
    let build = |first: Color, second: Color| {
        let mut p = h.pipeline();
        p.create(32, 32).unwrap();
        p.add_operation(Rectangle::new(0, 0, 10, 10).color(first));
        p.add_operation(Rectangle::new(20, 20, 5, 5).color(second));
        p.fingerprint(Format::Png).unwrap()
    };
    assert_ne!(build(red(), Color::WHITE), build(Color::WHITE, red()));
}

#[test]
fn fingerprint_depends_on_format_and_size() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(32, 32).unwrap();
    let png = p.fingerprint(Format::Png).unwrap();
    assert_ne!(png, p.fingerprint(Format::Jpg).unwrap());
    p.create(32, 33).unwrap();
    assert_ne!(png, p.fingerprint(Format::Png).unwrap());
}

#[test]
fn fingerprint_tracks_source_modification_time() {
    let h = Harness::new();
    h.insert_png("/src/photo.png", 20, 10);
    let mut p = h.pipeline();
    p.load("/src/photo.png").unwrap();
    let before = p.fingerprint(Format::Png).unwrap();
    h.fs.set_modified(Path::new("/src/photo.png"), UNIX_EPOCH + Duration::from_secs(42));
    assert_ne!(before, p.fingerprint(Format::Png).unwrap());
}

#[test]
fn fingerprint_depends_on_render_settings() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(32, 32).unwrap();
    let jpg = p.fingerprint(Format::Jpg).unwrap();
    let png = p.fingerprint(Format::Png).unwrap();
    p.set_jpeg_quality(50).unwrap();
    assert_ne!(jpg, p.fingerprint(Format::Jpg).unwrap());
    assert_eq!(png, p.fingerprint(Format::Png).unwrap());
}

#[test]
fn fingerprint_depends_on_fonts_dir() {
    let h = Harness::new();
    let with_fonts = |dir: &str| {
        let config = PipelineConfig {
            fonts_dir: dir.into(),
            ..PipelineConfig::default()
        };
        let mut p = h.pipeline().with_config(config).unwrap();
        p.create(20, 20).unwrap();
        p.add_operation(Text::new("hi", 1, 10, 8.0));
        p.fingerprint(Format::Png).unwrap()
    };
    assert_ne!(with_fonts("/fonts_a"), with_fonts("/fonts_b"));
    assert_eq!(with_fonts("/fonts_a"), with_fonts("/fonts_a"));
}

#[test]
fn missing_font_in_other_fonts_dir_is_not_a_cache_hit() {
    let h = Harness::new();
    let font = std::fs::read("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf");
    let Ok(font) = font else {
        eprintln!("skipping: system font not installed");
        return;
    };
    h.fs.insert("/fonts_a/dejavusans.ttf", font);
    let run = |dir: &str| {
        let config = PipelineConfig {
            fonts_dir: dir.into(),
            ..PipelineConfig::default()
        };
        let mut p = h.pipeline().with_config(config).unwrap();
        p.create(20, 20).unwrap();
        p.add_operation(Text::new("hi", 1, 10, 8.0));
        p.encode(Format::Png)
    };
    run("/fonts_a").unwrap();
    assert!(matches!(run("/fonts_b"), Err(PipelineError::FontNotFound(_))));
}

// --- Rendering ---

#[test]
fn replaced_source_file_is_rendered_again() {
    let h = Harness::new();
    let red_px = Rgba([255, 0, 0, 255]);
    let blue_px = Rgba([0, 0, 255, 255]);
    h.fs.insert("/src/swap.png", png_bytes(&RgbaImage::from_pixel(4, 4, red_px)));
    let mut p = h.pipeline();
    p.load("/src/swap.png").unwrap();
    let red_bytes = p.encode(Format::Png).unwrap();
    assert!(p.is_up_to_date());

    // Re-inserting advances the file's modification time.
    h.fs.insert("/src/swap.png", png_bytes(&RgbaImage::from_pixel(4, 4, blue_px)));
    assert!(!p.is_up_to_date());
    let blue_bytes = p.encode(Format::Png).unwrap();
    assert_ne!(red_bytes, blue_bytes);
    assert_eq!(*p.canvas().unwrap().image().get_pixel(0, 0), blue_px);

    let mut fresh = h.pipeline();
    fresh.load("/src/swap.png").unwrap();
    assert_eq!(*fresh.canvas().unwrap().image().get_pixel(0, 0), blue_px);
}

#[test]
fn replaced_source_file_is_rendered_again_without_cache() {
    let h = Harness::new();
    h.fs.insert("/src/swap.png", png_bytes(&RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))));
    let mut p = Pipeline::new(h.fs.clone());
    p.load("/src/swap.png").unwrap();
    p.canvas().unwrap();

    let blue_px = Rgba([0, 0, 255, 255]);
    h.fs.insert("/src/swap.png", png_bytes(&RgbaImage::from_pixel(4, 4, blue_px)));
    assert_eq!(*p.canvas().unwrap().image().get_pixel(2, 2), blue_px);
}

#[test]
fn scale_of_fitting_source_keeps_pixels() {
    let h = Harness::new();
    h.insert_png("/src/small.png", 20, 10);
    let mut p = h.pipeline();
    p.load("/src/small.png").unwrap();
    p.add_operation(Scale::new(Some(40), Some(40)));
    assert_eq!(p.canvas().unwrap().image(), &gradient(20, 10));

    // Served from the cache on the second request, still unchanged.
    let mut again = h.pipeline();
    again.load("/src/small.png").unwrap();
    again.add_operation(Scale::new(Some(40), Some(40)));
    assert_eq!(again.canvas().unwrap().image(), &gradient(20, 10));
}

#[test]
fn loaded_source_is_decoded_and_transformed() {
    let h = Harness::new();
    h.insert_png("/src/wide.PNG", 1000, 500);
    let mut p = h.pipeline();
    p.load("/src/wide.PNG").unwrap();
    p.add_operation(Scale::new(Some(100), Some(100)));
    assert_eq!(p.canvas().unwrap().dimensions(), Dimensions::new(100, 50));

    p.load("/src/wide.PNG").unwrap();
    p.add_operation(ScaleAndCrop::new(Some(200), Some(200)));
    assert_eq!(p.canvas().unwrap().dimensions(), Dimensions::new(200, 200));
}

#[test]
fn canvas_decodes_cached_png_without_rendering() {
    let h = Harness::new();
    h.insert_png("/src/a.png", 16, 16);
    let mut first = h.pipeline();
    first.load("/src/a.png").unwrap();
    first.add_operation(Crop::new(2, 2, 8, 4));
    let expected = first.canvas().unwrap().image().clone();
    let source_reads = h.fs.reads();

    let mut second = h.pipeline();
    second.load("/src/a.png").unwrap();
    second.add_operation(Crop::new(2, 2, 8, 4));
    assert_eq!(second.canvas().unwrap().image(), &expected);
    // One read for the cached artifact, none for the source.
    assert_eq!(h.fs.reads(), source_reads + 1);
}

#[test]
fn failed_operation_caches_nothing() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(40, 40).unwrap();
    p.add_operation(Line::new(0, 0, 39, 39));
    p.add_operation(Text::new("hello", 2, 20, 10.0));
    let err = p.encode(Format::Png).unwrap_err();
    assert!(matches!(err, PipelineError::FontNotFound(_)));
    assert_eq!(h.cache_entries(), 0);
    assert!(!p.is_up_to_date());
}

#[test]
fn crop_outside_canvas_fails() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(10, 10).unwrap();
    p.add_operation(Crop::new(5, 5, 10, 10));
    assert!(matches!(p.canvas(), Err(PipelineError::Engine(_))));
    assert_eq!(h.cache_entries(), 0);
}

#[test]
fn unsupported_source_extension_fails_on_render() {
    let h = Harness::new();
    h.fs.insert("/src/image.bmp", vec![0u8; 4]);
    let mut p = h.pipeline();
    p.load("/src/image.bmp").unwrap();
    assert!(matches!(p.encode(Format::Png), Err(PipelineError::UnsupportedFormat(_))));
}

// --- Source configuration ---

#[test]
fn load_missing_path_keeps_previous_state() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(12, 12).unwrap();
    p.add_operation(Rectangle::new(0, 0, 2, 2));
    let before = p.fingerprint(Format::Png).unwrap();
    let err = p.load("/does/not/exist.png").unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(_)));
    assert_eq!(p.operation_count(), 1);
    assert_eq!(p.fingerprint(Format::Png).unwrap(), before);
}

#[test]
fn vanished_source_is_reported() {
    let h = Harness::new();
    h.insert_png("/src/gone.png", 4, 4);
    let mut p = h.pipeline();
    p.load("/src/gone.png").unwrap();
    h.fs.remove(Path::new("/src/gone.png"));
    assert!(matches!(p.encode(Format::Png), Err(PipelineError::SourceNotFound(_))));
}

// --- Overlay ---

#[test]
fn overlay_change_invalidates_outer_pipeline() {
    let h = Harness::new();
    let mut inner = h.pipeline();
    inner.create(4, 4).unwrap();
    let inner = inner.into_shared();

    let mut outer = h.pipeline();
    outer.create(16, 16).unwrap();
    outer.add_operation(Overlay::new(inner.clone(), 2, 2));
    let before = outer.encode(Format::Png).unwrap();
    assert!(outer.is_up_to_date());

    inner
        .borrow_mut()
        .add_operation(Rectangle::new(0, 0, 3, 3).color(red()));
    assert!(!outer.is_up_to_date());
    let after = outer.encode(Format::Png).unwrap();
    assert_ne!(before, after);
    assert_eq!(*outer.canvas().unwrap().image().get_pixel(3, 3), Rgba([255, 0, 0, 255]));
}

#[test]
fn self_overlay_is_rejected() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(4, 4).unwrap();
    let handle = p.into_shared();
    let overlay = Overlay::new(handle.clone(), 0, 0);
    handle.borrow_mut().add_operation(overlay);
    let result = handle.borrow_mut().encode(Format::Png);
    assert!(matches!(result, Err(PipelineError::OverlayCycle)));
    assert_eq!(h.cache_entries(), 0);
}

#[test]
fn cache_id_resolves_and_matches_png_fingerprint() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(5, 5).unwrap();
    let id = p.cache_id().unwrap();
    assert_eq!(id, p.fingerprint(Format::Png).unwrap());
    assert!(h.cache.exists(id, Format::Png));
}

// --- Outputs ---

#[test]
fn save_infers_format_and_writes_target() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(10, 10).unwrap();
    p.save("/out/thumb.JPEG", None).unwrap();
    let bytes = h.fs.get(Path::new("/out/thumb.JPEG")).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    assert!(matches!(
        p.save("/out/thumb.tiff", None),
        Err(PipelineError::UnsupportedFormat(_))
    ));
}

#[test]
fn save_skips_copy_when_target_is_current() {
    let h = Harness::new();
    let build = || {
        let mut p = h.pipeline();
        p.create(10, 10).unwrap();
        p.add_operation(Rectangle::new(0, 0, 4, 4).color(red()));
        p
    };
    build().save("/out/a.png", None).unwrap();
    let writes = h.fs.writes();

    // Cache hit, target newer than the cache entry: nothing written.
    build().save("/out/a.png", None).unwrap();
    assert_eq!(h.fs.writes(), writes);

    // Target older than the cache entry: copied again.
    h.fs.set_modified(Path::new("/out/a.png"), UNIX_EPOCH);
    build().save("/out/a.png", None).unwrap();
    assert_eq!(h.fs.writes(), writes + 1);

    // Missing target: copied.
    build().save("/out/b.png", None).unwrap();
    assert_eq!(h.fs.get(Path::new("/out/b.png")), h.fs.get(Path::new("/out/a.png")));
}

#[test]
fn send_to_uses_legacy_content_types_by_default() {
    let h = Harness::new();
    h.insert_png("/src/a.png", 6, 6);
    let mut p = h.pipeline();
    p.load("/src/a.png").unwrap();
    let mut sink = BufferSink::new();
    p.send_to(&mut sink, None).unwrap();
    assert_eq!(sink.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(&sink.body[1..4], b"PNG");

    let mut sink = BufferSink::new();
    p.send_to(&mut sink, Some(Format::Jpg)).unwrap();
    assert_eq!(sink.content_type.as_deref(), Some("image/png"));
}

#[test]
fn send_to_can_use_registered_mime_types() {
    let h = Harness::new();
    let config = PipelineConfig {
        legacy_content_types: false,
        ..PipelineConfig::default()
    };
    let mut p = h.pipeline().with_config(config).unwrap();
    p.create(6, 6).unwrap();
    let mut sink = BufferSink::new();
    p.send_to(&mut sink, Some(Format::Png)).unwrap();
    assert_eq!(sink.content_type.as_deref(), Some("image/png"));
}

#[test]
fn cached_bytes_are_streamed_on_hit() {
    let h = Harness::new();
    let mut first = h.pipeline();
    first.create(6, 6).unwrap();
    let bytes = first.encode(Format::Gif).unwrap();

    let mut second = h.pipeline();
    second.create(6, 6).unwrap();
    let mut sink = BufferSink::new();
    second.send_to(&mut sink, Some(Format::Gif)).unwrap();
    assert_eq!(sink.body, bytes);
}

#[test]
fn base64_output_is_a_png_data_uri() {
    let h = Harness::new();
    let mut p = h.pipeline();
    p.create(3, 3).unwrap();
    let uri = p.to_base64().unwrap();
    assert!(uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
}

// --- Recipes ---

#[test]
fn recipe_output_matches_cache_of_hand_built_pipeline() {
    let h = Harness::new();
    let mut by_hand = h.pipeline();
    by_hand.create(30, 20).unwrap();
    by_hand.add_operation(Rectangle::new(1, 1, 5, 5).color(red()));
    by_hand.add_operation(ScaleAndCrop::new(Some(10), Some(10)));
    by_hand.encode(Format::Png).unwrap();
    let writes = h.fs.writes();

    let recipe: Recipe = serde_json::from_str(
        r##"{
            "source": { "kind": "blank", "width": 30, "height": 20 },
            "operations": [
                { "op": "rectangle", "x": 1, "y": 1, "width": 5, "height": 5, "color": "#FF0000" },
                { "op": "scale_and_crop", "width": 10, "height": 10 }
            ]
        }"##,
    )
    .unwrap();
    let mut from_recipe = h.pipeline();
    recipe.apply(&mut from_recipe).unwrap();
    from_recipe.encode(Format::Png).unwrap();
    assert_eq!(h.fs.writes(), writes);
}
