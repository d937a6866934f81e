//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::buffer::{release_result, result_data, result_len, InputSource, ResultHandle};
use crate::pipeline::{compress_with, ColorSpace, CompressRequest};
use crate::progress::{EventRecord, JobContext, PortSink, ProgressChannel, ProgressEvent};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sink that records everything posted to it.
#[derive(Default)]
pub(crate) struct CollectingSink {
    refuse: bool,
    records: Mutex<Vec<(i64, EventRecord)>>,
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    /// A sink that rejects every record.
    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub(crate) fn records(&self) -> Vec<EventRecord> {
        lock(&self.records).iter().map(|(_, r)| *r).collect()
    }

    pub(crate) fn ports(&self) -> Vec<i64> {
        lock(&self.records).iter().map(|(p, _)| *p).collect()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub(crate) fn events_for(&self, context: JobContext) -> Vec<ProgressEvent> {
        self.records()
            .into_iter()
            .filter(|r| r.job() == context)
            .map(|r| r.event())
            .collect()
    }

    /// The job's exit status, once it has been reported.
    pub(crate) fn exit_status(&self, context: JobContext) -> Option<i32> {
        self.events_for(context).into_iter().find_map(|e| match e {
            ProgressEvent::Exit { status } => Some(status),
            _ => None,
        })
    }

    /// Copy out and release every result buffer the job handed over.
    pub(crate) fn take_results(&self, context: JobContext) -> Vec<Vec<u8>> {
        let mut records = lock(&self.records);
        let mut results = Vec::new();
        for (_, record) in records.iter_mut() {
            if record.job() != context {
                continue;
            }
            if let ProgressEvent::Result { address } = record.event() {
                if address == 0 {
                    continue;
                }
                let handle = address as ResultHandle;
                // SAFETY: the handle came from the channel and is released once;
                // the record is rewritten below so it cannot be taken again.
                unsafe {
                    let bytes = std::slice::from_raw_parts(result_data(handle), result_len(handle));
                    results.push(bytes.to_vec());
                    release_result(handle);
                }
                *record = EventRecord::new(context, ProgressEvent::Result { address: 0 });
            }
        }
        results
    }
}

impl PortSink for CollectingSink {
    fn post_event(&self, port: i64, record: EventRecord) -> bool {
        if self.refuse {
            return false;
        }
        lock(&self.records).push((port, record));
        true
    }

    fn post_text(&self, _port: i64, line: &str) -> bool {
        lock(&self.lines).push(line.to_string());
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A channel of its own with a collecting sink on port 7.
pub(crate) fn collecting_channel() -> (&'static ProgressChannel, Arc<CollectingSink>) {
    let channel: &'static ProgressChannel = Box::leak(Box::new(ProgressChannel::new()));
    let sink = Arc::new(CollectingSink::default());
    channel.register(7, sink.clone());
    (channel, sink)
}

fn encode_rgb(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Baseline JPEG of a smooth color gradient.
pub(crate) fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 255 / width.max(1)) as u8);
            pixels.push((y * 255 / height.max(1)) as u8);
            pixels.push(128);
        }
    }
    encode_rgb(width, height, &pixels)
}

/// Baseline JPEG of pseudo-random pixels, which barely compresses.
pub(crate) fn noise_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_F491;
    let pixels: Vec<u8> = (0..width * height * 3)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect();
    encode_rgb(width, height, &pixels)
}

/// Baseline JPEG filled with one color.
pub(crate) fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let pixels: Vec<u8> = rgb
        .iter()
        .copied()
        .cycle()
        .take((width * height * 3) as usize)
        .collect();
    encode_rgb(width, height, &pixels)
}

/// Multi-scan progressive JPEG from the max-compression profile.
pub(crate) fn progressive_jpeg(width: u32, height: u32) -> Vec<u8> {
    let (channel, sink) = collecting_channel();
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for i in 0..width * height {
        pixels.extend_from_slice(&[(i % 251) as u8, (i % 127) as u8, (i % 61) as u8]);
    }
    let request = CompressRequest {
        pixels: InputSource::Owned(pixels),
        width,
        height,
        stride: width as usize * 3,
        color_space: ColorSpace::Rgb as i32,
        quality: 85,
        dpi: 72,
    };
    compress_with(channel, &request, JobContext(0));
    sink.take_results(JobContext(0)).remove(0)
}

/// Insert an EXIF segment carrying Orientation = 1 right after SOI.
pub(crate) fn with_exif(jpeg: &[u8]) -> Vec<u8> {
    #[rustfmt::skip]
    const TIFF: [u8; 26] = [
        b'I', b'I', 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00,
        // one IFD entry: Orientation, SHORT, count 1, value 1
        0x01, 0x00,
        0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        // no next IFD
        0x00, 0x00, 0x00, 0x00,
    ];
    let payload_len = 6 + TIFF.len();
    let segment_len = (payload_len + 2) as u16;

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&TIFF);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub(crate) fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
