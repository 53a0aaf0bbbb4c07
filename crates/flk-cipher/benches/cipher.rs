use flk_cipher::{
    segment_and_shuffle, CipherEngine, DeterministicRandomSource, FractalGenerator, KeystreamSource,
    QualityReport, SegmentBuckets,
};
use flk_core::{EncryptionArea, MandelbrotParameters};
use flk_crypto::MasterSeed;
use image::{Rgba, RgbaImage};

fn make_image(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, 255]))
}

fn params(size: u32) -> MandelbrotParameters {
    MandelbrotParameters {
        width: size,
        height: size,
        zoom: 120_000.0,
        offset_x: -0.743_643_9,
        offset_y: 0.131_825_9,
        max_iterations: 800,
    }
}

#[divan::bench(args = [128, 512])]
fn bench_render_keystream(bencher: divan::Bencher, size: u32) {
    let generator = FractalGenerator::new(0).unwrap();
    let p = params(size);
    bencher
        .counter(divan::counter::ItemsCount::new(size as usize * size as usize))
        .bench(|| generator.generate(divan::black_box(&p)).unwrap());
}

#[divan::bench(args = [128, 512])]
fn bench_quality_screen(bencher: divan::Bencher, size: u32) {
    let img = FractalGenerator::new(0).unwrap().generate(&params(size)).unwrap();
    bencher.bench(|| QualityReport::measure(divan::black_box(&img)));
}

#[divan::bench(args = [256, 1024])]
fn bench_shuffle(bencher: divan::Bencher, size: u32) {
    let img = make_image(size);
    let buckets = SegmentBuckets::default();
    bencher.bench(|| {
        let mut rng = DeterministicRandomSource::from_seed([3u8; 32]);
        segment_and_shuffle(divan::black_box(&img), &mut rng, &buckets).unwrap()
    });
}

#[divan::bench(args = [256])]
fn bench_encrypt_decrypt(bencher: divan::Bencher, size: u32) {
    let engine = CipherEngine::new(FractalGenerator::new(0).unwrap(), SegmentBuckets::default());
    let img = make_image(size);
    let area = EncryptionArea::whole(size, size);
    let seed = MasterSeed::from_bytes([9u8; 32]);
    bencher.bench(|| {
        let out = engine
            .encrypt_with(&img, &area, &seed, KeystreamSource::Parameters(params(size)))
            .unwrap();
        engine.decrypt(&out.image, &out.key_material).unwrap()
    });
}

fn main() {
    divan::main();
}
