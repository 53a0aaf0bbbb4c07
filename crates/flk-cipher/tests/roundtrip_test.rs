//! Encrypt → decrypt round trips across whole, partial, and border areas.

use flk_cipher::{CipherEngine, FractalGenerator, KeyMaterial, KeystreamSource, SegmentBuckets};
use flk_core::{EncryptionArea, MandelbrotParameters};
use flk_crypto::{CryptoSession, KdfParams, MasterSeed};
use image::{Rgba, RgbaImage};
use proptest::prelude::*;

fn engine() -> CipherEngine {
    CipherEngine::new(FractalGenerator::new(4).unwrap(), SegmentBuckets::default())
}

fn keystream() -> KeystreamSource<'static> {
    KeystreamSource::Parameters(MandelbrotParameters {
        width: 0,
        height: 0,
        zoom: 75.0,
        offset_x: -0.7435,
        offset_y: 0.1314,
        max_iterations: 520,
    })
}

fn photo(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 13 + y) as u8,
            (y * 7) as u8,
            ((x * y) >> 2) as u8,
            255 - (x % 3) as u8,
        ])
    })
}

fn roundtrip(img: &RgbaImage, area: EncryptionArea, seed: [u8; 32]) {
    let e = engine();
    let out = e
        .encrypt_with(img, &area, &MasterSeed::from_bytes(seed), keystream())
        .unwrap();
    let plain = e.decrypt(&out.image, &out.key_material).unwrap();
    assert_eq!(&plain, img, "area {area:?}");
}

#[test]
fn whole_64px_image_uses_four_pixel_blocks() {
    let img = photo(64, 64);
    let e = engine();
    let out = e
        .encrypt_with(&img, &EncryptionArea::whole(64, 64), &MasterSeed::generate(), keystream())
        .unwrap();

    let seg = &out.key_material.segmentation;
    assert_eq!(seg.segment_size, 4);
    assert_eq!(seg.block_count(), 256);
    let mut sorted = seg.mapping.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..256).collect::<Vec<u32>>());

    assert_eq!(out.image.dimensions(), (64, 64));
    assert_ne!(out.image, img);
    assert_eq!(e.decrypt(&out.image, &out.key_material).unwrap(), img);
}

#[test]
fn centered_area_pads_to_block_multiple() {
    let img = photo(100, 100);
    let area = EncryptionArea::partial(10, 10, 50, 50);
    let e = engine();
    let out = e
        .encrypt_with(&img, &area, &MasterSeed::generate(), keystream())
        .unwrap();

    let seg = &out.key_material.segmentation;
    assert_eq!(seg.segment_size, 4);
    assert_eq!((seg.padded_width, seg.padded_height), (52, 52));
    assert_eq!(out.image.dimensions(), (102, 102));

    // Outside the area the image is untouched (modulo the gutter shift)
    assert_eq!(out.image.get_pixel(0, 0), img.get_pixel(0, 0));
    assert_eq!(out.image.get_pixel(101, 101), img.get_pixel(99, 99));
    assert_eq!(out.image.get_pixel(5, 40), img.get_pixel(5, 40));

    assert_eq!(e.decrypt(&out.image, &out.key_material).unwrap(), img);
}

#[test]
fn areas_touching_every_border() {
    let img = photo(37, 29);
    let areas = [
        EncryptionArea::partial(0, 0, 37, 29),
        EncryptionArea::partial(0, 0, 5, 5),
        EncryptionArea::partial(30, 0, 7, 11),
        EncryptionArea::partial(0, 22, 13, 7),
        EncryptionArea::partial(31, 23, 6, 6),
        EncryptionArea::partial(36, 28, 1, 1),
        EncryptionArea::whole(37, 29),
    ];
    for (i, area) in areas.into_iter().enumerate() {
        roundtrip(&img, area, [i as u8; 32]);
    }
}

#[test]
fn different_seeds_shuffle_differently() {
    let img = photo(32, 32);
    let area = EncryptionArea::whole(32, 32);
    let e = engine();
    let a = e
        .encrypt_with(&img, &area, &MasterSeed::from_bytes([1; 32]), keystream())
        .unwrap();
    let b = e
        .encrypt_with(&img, &area, &MasterSeed::from_bytes([2; 32]), keystream())
        .unwrap();
    assert_ne!(a.key_material.segmentation.mapping, b.key_material.segmentation.mapping);
    assert_ne!(a.image, b.image);
}

#[test]
fn key_material_survives_disk_with_sealed_seed() {
    let dir = tempfile::tempdir().unwrap();
    let img = photo(48, 40);
    let area = EncryptionArea::partial(4, 3, 30, 21);
    let seed = MasterSeed::generate();
    let session = CryptoSession::new(KdfParams { iterations: 1000 });

    let e = engine();
    let mut out = e.encrypt_with(&img, &area, &seed, keystream()).unwrap();
    out.key_material.seal_seed(&seed, b"correct horse", &session).unwrap();

    let image_path = dir.path().join("cipher.png");
    let key_path = dir.path().join("cipher.flk");
    out.image.save(&image_path).unwrap();
    std::fs::write(&key_path, out.key_material.to_bytes().unwrap()).unwrap();

    let cipher = image::open(&image_path).unwrap().to_rgba8();
    let km = KeyMaterial::from_bytes(&std::fs::read(&key_path).unwrap()).unwrap();
    assert_eq!(e.decrypt(&cipher, &km).unwrap(), img);

    let recovered = km.open_seed(b"correct horse", &session).unwrap().unwrap();
    assert_eq!(recovered.as_bytes(), seed.as_bytes());
}

#[test]
fn tampered_key_material_does_not_decrypt_cleanly() {
    let img = photo(24, 24);
    let e = engine();
    let out = e
        .encrypt_with(&img, &EncryptionArea::whole(24, 24), &MasterSeed::generate(), keystream())
        .unwrap();
    let mut km = out.key_material.clone();
    km.mandelbrot.offset_x += 0.05;
    assert_ne!(e.decrypt(&out.image, &km).unwrap(), img);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_area_roundtrips(
        width in 1u32..48,
        height in 1u32..48,
        x_frac in 0.0f64..1.0,
        y_frac in 0.0f64..1.0,
        w_frac in 0.0f64..1.0,
        h_frac in 0.0f64..1.0,
        seed in any::<[u8; 32]>(),
    ) {
        let start_x = (x_frac * f64::from(width)) as u32 % width;
        let start_y = (y_frac * f64::from(height)) as u32 % height;
        let area_w = 1 + (w_frac * f64::from(width - start_x - 1)) as u32;
        let area_h = 1 + (h_frac * f64::from(height - start_y - 1)) as u32;
        let area = EncryptionArea::partial(start_x, start_y, area_w, area_h);

        let img = photo(width, height);
        let e = engine();
        let out = e
            .encrypt_with(&img, &area, &MasterSeed::from_bytes(seed), keystream())
            .unwrap();
        prop_assert!(out.key_material.segmentation.validate().is_ok());
        prop_assert_eq!(e.decrypt(&out.image, &out.key_material).unwrap(), img);
    }
}
