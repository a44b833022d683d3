//! Unit tests for capture.rs

use crate::error::Error;
use crate::renderer::capture::*;

#[test]
fn test_format_buffer_dump_words() {
    let first: Vec<u8> = [1u32, 0xDEADBEEF].iter().flat_map(|w| w.to_le_bytes()).collect();
    let second: Vec<u8> = 0x10u32.to_le_bytes().to_vec();
    assert_eq!(format_buffer_dump(&[first, second]), "1\nDEADBEEF\n10\n");
}

#[test]
fn test_format_buffer_dump_pads_partial_word() {
    assert_eq!(format_buffer_dump(&[[0xAAu8, 0xBB, 0xCC]]), "CCBBAA\n");
}

#[test]
fn test_format_buffer_dump_empty() {
    let none: [Vec<u8>; 0] = [];
    assert_eq!(format_buffer_dump(&none), "");
}

#[test]
fn test_write_png_round_trips_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shot.png");
    let pixels: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8 * 10).collect();

    write_png(&path, 2, 2, &pixels).unwrap();

    let decoded = image::open(&path).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (2, 2));
    assert_eq!(decoded.into_raw(), pixels);
}

#[test]
fn test_write_png_rejects_wrong_length() {
    let dir = tempfile::tempdir().unwrap();
    let result = write_png(&dir.path().join("bad.png"), 4, 4, &[0u8; 10]);
    assert!(matches!(result, Err(Error::Capture(_))));
}

#[test]
fn test_write_png_reports_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("shot.png");
    let result = write_png(&path, 1, 1, &[0, 0, 0, 255]);
    assert!(matches!(result, Err(Error::Capture(_))));
}
