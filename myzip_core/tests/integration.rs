/// Integration tests: pack a file into a stand-in program image, then unpack it
/// again through the archive's own markers, using the real zstd codecs.
///
/// The stand-in image is arbitrary filler with both marker templates embedded,
/// which is all the patch engine and the unpack path look at.
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;

use myzip_codecs::{decoder, encoder_for};
use myzip_core::config::DEFAULT_BUFFER_SIZE;
use myzip_core::format::{scan_mode, DATA_OFFSET_TEMPLATE, MODE_TEMPLATE};
use myzip_core::{
    pack_archive, read_mode, read_offset, resolve, unpack_archive, EncoderConfiguration, Error,
    Mode, RunOptions, StreamSession,
};
use proptest::prelude::*;

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn program_image() -> Vec<u8> {
    let mut image = pseudo_random_bytes(5000, 7);
    image.extend_from_slice(&DATA_OFFSET_TEMPLATE);
    image.extend(pseudo_random_bytes(300, 8));
    image.extend_from_slice(&MODE_TEMPLATE);
    image.extend(pseudo_random_bytes(2000, 9));
    image
}

/// Pack `data` through a file in `dir` and unpack it again.
fn pack_then_unpack(dir: &Path, data: &[u8], config: &EncoderConfiguration) -> Vec<u8> {
    let input = dir.join("input.bin");
    let archive = dir.join("archive.run");
    let restored = dir.join("restored.bin");
    fs::write(&input, data).unwrap();

    let options = RunOptions::default();
    let mut encoder = encoder_for(config).unwrap();
    let packed = pack_archive(
        program_image(),
        &input,
        &archive,
        &mut encoder,
        &options,
        |_, _| {},
    )
    .unwrap();
    assert_eq!(packed.input_len, data.len() as u64);
    assert_eq!(fs::metadata(&archive).unwrap().len(), packed.archive_len());

    let mut decoder = decoder().unwrap();
    let unpacked = unpack_archive(&archive, &restored, &mut decoder, &options, |_, _| {}).unwrap();
    assert_eq!(unpacked.data_offset, packed.header_len);
    assert_eq!(unpacked.payload_len, packed.payload_len);
    assert_eq!(unpacked.output_len, data.len() as u64);

    fs::read(&restored).unwrap()
}

/// Encode `data` in memory with the given buffer size.
fn encode(data: &[u8], config: &EncoderConfiguration, buffer_size: usize) -> Vec<u8> {
    let mut encoder = encoder_for(config).unwrap();
    let mut out = Vec::new();
    StreamSession::new(buffer_size, data.len() as u64)
        .run(&mut encoder, Cursor::new(data), &mut out, |_, _| {})
        .unwrap();
    out
}

/// Decode `data` in memory with the given buffer size.
fn decode(data: &[u8], buffer_size: usize) -> Result<Vec<u8>, Error> {
    let mut decoder = decoder().unwrap();
    let mut out = Vec::new();
    StreamSession::new(buffer_size, data.len() as u64).run(
        &mut decoder,
        Cursor::new(data),
        &mut out,
        |_, _| {},
    )?;
    Ok(out)
}

/// Accepts at most half of every write.
struct HalfSink;

impl Write for HalfSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok((buf.len() / 2).max(1).min(buf.len()))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_empty_input() {
    let dir = tempfile::tempdir().unwrap();
    let restored = pack_then_unpack(dir.path(), &[], &EncoderConfiguration::default());
    assert!(restored.is_empty());
}

#[test]
fn test_roundtrip_larger_than_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let data = compressible_bytes(40 * DEFAULT_BUFFER_SIZE + 321);
    let restored = pack_then_unpack(dir.path(), &data, &EncoderConfiguration::default());
    assert_eq!(restored, data, "zstd round-trip should be byte-exact");
}

#[test]
fn test_roundtrip_incompressible() {
    let dir = tempfile::tempdir().unwrap();
    let data = pseudo_random_bytes(300_000, 42);
    let config = resolve(Some(1), false, None, 1);
    assert_eq!(pack_then_unpack(dir.path(), &data, &config), data);
}

#[test]
fn test_roundtrip_multithreaded_extreme() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = compressible_bytes(1_500_000);
    data.extend(pseudo_random_bytes(700_000, 3));
    let mut config = resolve(Some(2), true, Some(4), 4);
    config.block_size = 512 * 1024;
    assert_eq!(config.threads, 4);
    assert_eq!(pack_then_unpack(dir.path(), &data, &config), data);
}

#[test]
fn test_archive_header_is_self_describing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let archive = dir.path().join("archive.run");
    fs::write(&input, compressible_bytes(10_000)).unwrap();

    let image = program_image();
    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    let packed = pack_archive(
        image.clone(),
        &input,
        &archive,
        &mut encoder,
        &RunOptions::default(),
        |_, _| {},
    )
    .unwrap();

    let bytes = fs::read(&archive).unwrap();
    assert_eq!(packed.header_len, image.len() as u64);
    assert_eq!(read_offset(&bytes).unwrap(), packed.header_len);

    // The payload starts exactly at the recorded offset with a zstd frame.
    let payload = &bytes[packed.header_len as usize..];
    assert_eq!(&payload[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
    assert_eq!(payload.len() as u64, packed.payload_len);
}

#[test]
fn test_mode_flips_from_pack_to_unpack() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let archive = dir.path().join("archive.run");
    fs::write(&input, b"payload").unwrap();

    let image = program_image();
    assert_eq!(read_mode(&image).unwrap(), Mode::Pack);

    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    pack_archive(image, &input, &archive, &mut encoder, &RunOptions::default(), |_, _| {})
        .unwrap();
    assert_eq!(scan_mode(fs::File::open(&archive).unwrap()).unwrap(), Mode::Unpack);
}

#[cfg(unix)]
#[test]
fn test_archive_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let archive = dir.path().join("archive.run");
    fs::write(&input, b"x").unwrap();

    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    pack_archive(program_image(), &input, &archive, &mut encoder, &RunOptions::default(), |_, _| {})
        .unwrap();
    let mode = fs::metadata(&archive).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[test]
fn test_missing_marker_creates_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let archive = dir.path().join("archive.run");
    fs::write(&input, b"data").unwrap();

    let mut image = pseudo_random_bytes(4096, 1);
    image.extend_from_slice(&MODE_TEMPLATE);

    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    let result = pack_archive(image, &input, &archive, &mut encoder, &RunOptions::default(), |_, _| {});
    assert!(matches!(result, Err(Error::MissingOffsetMarker)));
    assert!(!archive.exists(), "no partial archive may be left behind");
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive.run");

    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    let result = pack_archive(
        program_image(),
        dir.path().join("does-not-exist"),
        &archive,
        &mut encoder,
        &RunOptions::default(),
        |_, _| {},
    );
    match result {
        Err(Error::Io { stage, source }) => {
            assert_eq!(stage, "opening input file");
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected Io error, got {:?}", other),
    }
}

#[test]
fn test_progress_reports_input_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let archive = dir.path().join("archive.run");
    let data = pseudo_random_bytes(100_000, 11);
    fs::write(&input, &data).unwrap();

    let mut reports = Vec::new();
    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    pack_archive(
        program_image(),
        &input,
        &archive,
        &mut encoder,
        &RunOptions {
            buffer_size: 4096,
            verbose: false,
        },
        |read, total| reports.push((read, total)),
    )
    .unwrap();

    assert!(reports.len() > 1);
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
    assert!(reports.iter().all(|&(_, total)| total == data.len() as u64));
    assert_eq!(reports.last().unwrap().0, data.len() as u64);
}

#[test]
fn test_concatenated_streams_decode_as_one() {
    let first = compressible_bytes(30_000);
    let second = pseudo_random_bytes(20_000, 5);

    let mut joined = encode(&first, &EncoderConfiguration::default(), 1024);
    joined.extend(encode(&second, &resolve(Some(9), false, None, 1), 1024));

    let mut expected = first;
    expected.extend_from_slice(&second);
    assert_eq!(decode(&joined, 1024).unwrap(), expected);
}

#[test]
fn test_truncated_payload_is_codec_error() {
    let data = pseudo_random_bytes(50_000, 99);
    let compressed = encode(&data, &EncoderConfiguration::default(), 4096);
    let truncated = &compressed[..compressed.len() - 10];
    assert!(matches!(
        decode(truncated, 4096),
        Err(Error::Codec { codec: "zstd", .. })
    ));
}

#[test]
fn test_empty_payload_is_codec_error() {
    assert!(matches!(decode(&[], 4096), Err(Error::Codec { .. })));
}

#[test]
fn test_short_write_aborts_encode() {
    let data = compressible_bytes(100_000);
    let mut encoder = encoder_for(&EncoderConfiguration::default()).unwrap();
    let result = StreamSession::new(1024, data.len() as u64).run(
        &mut encoder,
        Cursor::new(&data),
        HalfSink,
        |_, _| {},
    );
    assert!(matches!(result, Err(Error::ShortWrite { .. })));
}

#[test]
fn test_offset_past_end_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive.run");
    let restored = dir.path().join("restored.bin");

    let image = myzip_core::locate_and_patch(program_image(), 1 << 40)
        .unwrap()
        .into_bytes();
    fs::write(&archive, image).unwrap();

    let mut decoder = decoder().unwrap();
    let result = unpack_archive(&archive, &restored, &mut decoder, &RunOptions::default(), |_, _| {});
    assert!(matches!(result, Err(Error::CorruptOffset(_))));
}

#[test]
fn test_unpatched_image_cannot_be_unpacked() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("template.bin");
    fs::write(&archive, program_image()).unwrap();

    let mut decoder = decoder().unwrap();
    let result = unpack_archive(
        &archive,
        dir.path().join("out"),
        &mut decoder,
        &RunOptions::default(),
        |_, _| {},
    );
    assert!(matches!(result, Err(Error::CorruptOffset(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_encode_decode_round_trip(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        buffer_size in 1usize..5000,
    ) {
        let compressed = encode(&data, &EncoderConfiguration::default(), buffer_size);
        prop_assert_eq!(decode(&compressed, buffer_size).unwrap(), data);
    }
}
