//! Lossless transcode job.
//!
//! A job takes a jpegtran-style argument vector, decodes the single input
//! file to DCT coefficients, applies the requested lossless transform and
//! re-encodes into a growable in-memory buffer. Whatever happens, the job
//! ends with exactly one exit event, sent after both engine handles have been
//! released.

use std::fs;

use crate::args::{parse_switches, program_name, usage_error, ParsePass, TransformRequest};
use crate::buffer::{InputPolicy, InputSource, OutputBuffer};
use crate::codec::{copy_markers, Compressor, Decompressor, HandleOptions, Reporter, Transform};
use crate::error::{ExitStatus, TranscodeError};
use crate::progress::{JobContext, ProgressChannel};

/// Pipeline stages, in the order a successful job passes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    HeaderRead,
    WorkspaceRequested,
    CoefficientsRead,
    ParamsAdjusted,
    DestinationBound,
    MarkersCopied,
    TransformExecuted,
    Finished,
}

/// Tracks and logs stage transitions for one job.
#[derive(Debug)]
struct StageLog {
    context: JobContext,
    stage: Stage,
}

impl StageLog {
    fn new(context: JobContext) -> Self {
        Self {
            context,
            stage: Stage::Init,
        }
    }

    fn enter(&mut self, next: Stage) {
        log::debug!("job {}: {:?} -> {:?}", self.context.0, self.stage, next);
        self.stage = next;
    }
}

/// How a job that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done { warnings: u64 },
    Version,
}

/// Runs transcode jobs against one progress channel.
#[derive(Debug, Clone, Copy)]
pub struct Transcoder {
    channel: &'static ProgressChannel,
    policy: InputPolicy,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(ProgressChannel::global())
    }
}

impl Transcoder {
    /// A transcoder that reads inputs from files only.
    pub fn new(channel: &'static ProgressChannel) -> Self {
        Self {
            channel,
            policy: InputPolicy::files_only(),
        }
    }

    /// Also accept `@buffer@:<address>,<length>` input names.
    ///
    /// # Safety
    ///
    /// See [`InputPolicy::trusting_foreign_buffers`]: every such name passed
    /// to [`Transcoder::run`] must describe readable memory that outlives the
    /// job.
    pub unsafe fn trusting_foreign_buffers(mut self) -> Self {
        self.policy = InputPolicy::trusting_foreign_buffers();
        self
    }

    pub fn channel(&self) -> &'static ProgressChannel {
        self.channel
    }

    pub fn input_policy(&self) -> InputPolicy {
        self.policy
    }

    /// Run one job to completion.
    ///
    /// The result buffer, if any, and the exit status are reported on the
    /// channel; the status is also returned.
    pub fn run<S: AsRef<str>>(&self, args: &[S], context: JobContext) -> ExitStatus {
        let mut stages = StageLog::new(context);
        let status = match self.execute(args, context, &mut stages) {
            Ok(Outcome::Done { warnings: 0 }) | Ok(Outcome::Version) => ExitStatus::Success,
            Ok(Outcome::Done { warnings }) => {
                log::warn!("job {}: finished with {warnings} warning(s)", context.0);
                ExitStatus::Warnings
            }
            Err(err) => {
                log::error!(
                    "job {}: {}: failed after {:?}: {err}",
                    context.0,
                    program_name(args),
                    stages.stage
                );
                err.exit_status()
            }
        };
        self.channel.report_exit(context, status);
        status
    }

    fn execute<S: AsRef<str>>(
        &self,
        args: &[S],
        context: JobContext,
        stages: &mut StageLog,
    ) -> Result<Outcome, TranscodeError> {
        let program = program_name(args);
        let provisional = parse_switches(args, 0, ParsePass::Provisional)?;
        if provisional.version_requested {
            log::info!("{program} version {}", env!("CARGO_PKG_VERSION"));
            return Ok(Outcome::Version);
        }

        let file_index = provisional.first_file_index;
        if file_index >= args.len() {
            return Err(usage_error(program, "missing input file name"));
        }
        if file_index + 1 != args.len() {
            return Err(usage_error(program, "only one input file allowed"));
        }
        let request = provisional.request;
        let input = InputSource::open(args[file_index].as_ref(), self.policy)?;

        let (encoded, warnings) = self.transcode_input(args, &request, &input, context, stages)?;

        let chosen = if request.prefer_smallest && input.len() < encoded.len() {
            log::debug!(
                "job {}: keeping input ({} bytes) over output ({} bytes)",
                context.0,
                input.len(),
                encoded.len()
            );
            input.as_bytes().to_vec()
        } else {
            encoded
        };

        if let Some(path) = &request.outfile {
            fs::write(path, &chosen).map_err(|e| TranscodeError::io("can't write to", path, e))?;
        }
        self.channel.report_result(context, chosen);
        stages.enter(Stage::Finished);
        Ok(Outcome::Done { warnings })
    }

    /// Drive the engine over `input`. Both handles are gone on return.
    fn transcode_input<S: AsRef<str>>(
        &self,
        args: &[S],
        request: &TransformRequest,
        input: &InputSource,
        context: JobContext,
        stages: &mut StageLog,
    ) -> Result<(Vec<u8>, u64), TranscodeError> {
        let options = HandleOptions {
            trace_level: request.trace_level,
            strict: request.strict,
            max_memory_bytes: request.max_memory_bytes(),
        };

        let mut src = Decompressor::new(input.as_bytes(), options)?;
        src.set_max_scans(request.max_scans);
        let mut dst = Compressor::new(options)?;
        dst.set_reporter(Reporter {
            channel: self.channel,
            context,
        });

        src.save_markers(request.copy.engine_code())?;
        src.read_header()?;
        stages.enter(Stage::HeaderRead);

        let mut transform = Transform::new(request);
        transform.request_workspace(&mut src)?;
        stages.enter(Stage::WorkspaceRequested);

        let src_arrays = src.read_coefficients()?;
        stages.enter(Stage::CoefficientsRead);

        // the profile must be in place before the copy applies defaults
        dst.apply_settings(&request.encoder)?;
        dst.copy_critical_parameters(&src)?;
        let dst_arrays = transform.adjust_parameters(&mut src, &mut dst, src_arrays)?;
        stages.enter(Stage::ParamsAdjusted);

        let adjusted = parse_switches(
            args,
            0,
            ParsePass::Final {
                scan_script_present: dst.has_scan_script(),
            },
        )?;
        dst.apply_settings(&adjusted.request.encoder)?;

        dst.bind_destination(OutputBuffer::new())?;
        stages.enter(Stage::DestinationBound);

        if transform.runs_extra_pass() {
            dst.tracker_mut().add_extra_passes(1);
        }
        dst.write_coefficients(dst_arrays)?;
        copy_markers(&mut src, &mut dst, request.copy)?;
        stages.enter(Stage::MarkersCopied);

        transform.execute(&mut src, &mut dst, src_arrays)?;
        if transform.runs_extra_pass() {
            dst.tracker_mut().complete_extra_pass();
        }
        stages.enter(Stage::TransformExecuted);

        dst.finish()?;
        src.finish()?;
        let encoded = dst.take_output()?;
        Ok((encoded, src.warnings() + dst.warnings()))
    }
}

/// Run a transcode job on the process-wide channel, reading files only.
pub fn transcode<S: AsRef<str>>(args: &[S], context: JobContext) -> ExitStatus {
    Transcoder::default().run(args, context)
}

/// Like [`transcode`], but `@buffer@:` input names are dereferenced.
///
/// # Safety
///
/// Every `@buffer@:<address>,<length>` name in `args` must describe memory
/// readable for `length` bytes that stays valid until this call returns.
pub unsafe fn transcode_trusting_buffers<S: AsRef<str>>(args: &[S], context: JobContext) -> ExitStatus {
    Transcoder::default().trusting_foreign_buffers().run(args, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;
    use crate::test_support::{
        collecting_channel, gradient_jpeg, init_logger, noise_jpeg, progressive_jpeg, solid_jpeg,
        with_exif, write_fixture,
    };
    use image::GenericImageView;

    fn decode(bytes: &[u8]) -> image::DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn test_rotate_90_swaps_dimensions() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "in.jpg", &gradient_jpeg(64, 48));
        let out = dir.path().join("out.jpg");
        let (channel, sink) = collecting_channel();

        let args = [
            "jpegxf",
            "-rotate",
            "90",
            "-outfile",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ];
        let status = Transcoder::new(channel).run(&args, JobContext(1));
        assert_eq!(status, ExitStatus::Success);

        let events = sink.events_for(JobContext(1));
        let results = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Result { .. }))
            .count();
        assert_eq!(results, 1);
        assert_eq!(events.last(), Some(&ProgressEvent::Exit { status: 0 }));
        assert!(matches!(events[events.len() - 2], ProgressEvent::Result { .. }));

        let result = sink.take_results(JobContext(1)).remove(0);
        assert_eq!(decode(&result).dimensions(), (48, 64));
        assert_eq!(fs::read(&out).unwrap(), result);
    }

    #[test]
    fn test_progress_events_are_deduplicated() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "in.jpg", &gradient_jpeg(64, 48));
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-flip", "h", input.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(2)), ExitStatus::Success);

        let progress: Vec<_> = sink
            .events_for(JobContext(2))
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress {
                    pass,
                    total,
                    percent,
                } => Some((pass, total, percent)),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        for (pass, total, percent) in &progress {
            assert!(*pass >= 1 && *total >= 1, "pass {pass} of {total}");
            assert!((0..=100).contains(percent));
        }
        for pair in progress.windows(2) {
            assert_ne!(pair[0].2, pair[1].2);
        }
    }

    /// Encode `jpeg` the way a job given `args` would, without the size check.
    fn fresh_encode(args: &[&str], jpeg: &[u8]) -> Vec<u8> {
        let (channel, _sink) = collecting_channel();
        let context = JobContext(90);
        let request = parse_switches(args, 0, ParsePass::Provisional).unwrap().request;
        let input = InputSource::Owned(jpeg.to_vec());
        let (encoded, _) = Transcoder::new(channel)
            .transcode_input(args, &request, &input, context, &mut StageLog::new(context))
            .unwrap();
        encoded
    }

    #[test]
    fn test_prefer_smallest_returns_smaller_encode() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let original = gradient_jpeg(64, 48);
        let input = write_fixture(&dir, "in.jpg", &original);
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", input.to_str().unwrap()];
        let fresh = fresh_encode(&args, &original);
        assert!(fresh.len() < original.len(), "re-encode should beat a baseline input");

        assert_eq!(Transcoder::new(channel).run(&args, JobContext(3)), ExitStatus::Success);
        let result = sink.take_results(JobContext(3)).remove(0);
        assert_eq!(result.len(), fresh.len());
        assert_eq!(result, fresh);
        assert_eq!(decode(&result).dimensions(), (64, 48));
    }

    #[test]
    fn test_prefer_smallest_keeps_smaller_input_verbatim() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let original = fresh_encode(&["jpegxf", "in.jpg"], &gradient_jpeg(64, 48));
        let input = write_fixture(&dir, "small.jpg", &original);
        let (channel, sink) = collecting_channel();

        // a restart marker after every MCU only adds bytes
        let args = ["jpegxf", "-restart", "1b", input.to_str().unwrap()];
        let fresh = fresh_encode(&args, &original);
        assert!(original.len() < fresh.len());

        assert_eq!(Transcoder::new(channel).run(&args, JobContext(19)), ExitStatus::Success);
        let result = sink.take_results(JobContext(19)).remove(0);
        assert_eq!(result, original);
    }

    #[test]
    fn test_perfect_rejects_partial_blocks() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "in.jpg", &gradient_jpeg(100, 100));
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-rotate", "90", "-perfect", input.to_str().unwrap()];
        let status = Transcoder::new(channel).run(&args, JobContext(4));
        assert_eq!(status, ExitStatus::TransformInfeasible);
        assert!(sink.take_results(JobContext(4)).is_empty());
        assert_eq!(sink.exit_status(JobContext(4)), Some(5));
    }

    #[test]
    fn test_conflicting_rotations_are_usage_errors() {
        init_logger();
        let (channel, sink) = collecting_channel();
        let args = ["jpegxf", "-rotate", "90", "-rotate", "180", "in.jpg"];
        let status = Transcoder::new(channel).run(&args, JobContext(5));
        assert_eq!(status, ExitStatus::Usage);
        assert_eq!(
            sink.events_for(JobContext(5)),
            vec![ProgressEvent::Exit {
                status: ExitStatus::Usage.code()
            }]
        );
    }

    #[test]
    fn test_file_count_is_checked() {
        init_logger();
        let (channel, sink) = collecting_channel();
        let transcoder = Transcoder::new(channel);
        assert_eq!(transcoder.run(&["jpegxf", "-rotate", "90"], JobContext(6)), ExitStatus::Usage);
        assert_eq!(transcoder.run(&["jpegxf", "a.jpg", "b.jpg"], JobContext(7)), ExitStatus::Usage);
        assert!(sink.take_results(JobContext(6)).is_empty());
        assert!(sink.take_results(JobContext(7)).is_empty());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jpg");
        let (channel, _sink) = collecting_channel();
        let args = ["jpegxf", missing.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(8)), ExitStatus::Io);
    }

    #[test]
    fn test_corrupt_input_is_codec_failure() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "junk.jpg", b"definitely not a jpeg");
        let (channel, sink) = collecting_channel();
        let args = ["jpegxf", input.to_str().unwrap()];
        let status = Transcoder::new(channel).run(&args, JobContext(9));
        assert_eq!(status, ExitStatus::CodecFailure);
        assert!(sink.take_results(JobContext(9)).is_empty());
    }

    #[test]
    fn test_max_scans_limits_progressive_input() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "prog.jpg", &progressive_jpeg(64, 48));
        let out = dir.path().join("out.jpg");
        let (channel, sink) = collecting_channel();

        let args = [
            "jpegxf",
            "-maxscans",
            "1",
            "-outfile",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ];
        let status = Transcoder::new(channel).run(&args, JobContext(10));
        assert_eq!(status, ExitStatus::TooManyScans);
        assert!(sink.take_results(JobContext(10)).is_empty());
        assert!(!out.exists());

        // zero disables the limit
        let args = ["jpegxf", "-maxscans", "0", input.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(11)), ExitStatus::Success);
    }

    #[test]
    fn test_copy_policy_controls_exif() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "exif.jpg", &with_exif(&gradient_jpeg(64, 48)));
        let (channel, sink) = collecting_channel();
        let transcoder = Transcoder::new(channel);
        let orientation = |bytes: &[u8]| {
            exif::Reader::new()
                .read_from_container(&mut std::io::Cursor::new(bytes))
                .ok()
                .and_then(|e| {
                    e.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                        .and_then(|f| f.value.get_uint(0))
                })
        };

        let args = ["jpegxf", "-copy", "all", "-flip", "v", input.to_str().unwrap()];
        assert_eq!(transcoder.run(&args, JobContext(12)), ExitStatus::Success);
        let kept = sink.take_results(JobContext(12)).remove(0);
        assert_eq!(orientation(&kept), Some(1));

        let args = ["jpegxf", "-copy", "none", "-flip", "v", input.to_str().unwrap()];
        assert_eq!(transcoder.run(&args, JobContext(13)), ExitStatus::Success);
        let dropped = sink.take_results(JobContext(13)).remove(0);
        assert_eq!(orientation(&dropped), None);
    }

    #[test]
    fn test_wipe_grays_out_region() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "red.jpg", &solid_jpeg(64, 48, [200, 30, 30]));
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-wipe", "16x16+0+0", input.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(14)), ExitStatus::Success);
        let result = sink.take_results(JobContext(14)).remove(0);
        let image = decode(&result).to_rgb8();
        assert_eq!(image.dimensions(), (64, 48));

        let wiped = image.get_pixel(4, 4);
        for value in wiped.0 {
            assert!(value.abs_diff(128) <= 4, "wiped pixel {wiped:?}");
        }
        let kept = image.get_pixel(48, 40);
        assert!(kept.0[0] > 150, "untouched pixel {kept:?}");
    }

    #[test]
    fn test_wipe_outside_image_fails_without_result() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "in.jpg", &solid_jpeg(64, 48, [200, 30, 30]));
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-wipe", "16x16+100+0", input.to_str().unwrap()];
        let status = Transcoder::new(channel).run(&args, JobContext(20));
        assert_eq!(status, ExitStatus::CodecFailure);
        assert!(sink.take_results(JobContext(20)).is_empty());
        assert_eq!(sink.exit_status(JobContext(20)), Some(status.code()));
    }

    #[test]
    fn test_large_output_spans_buffer_growth() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let original = noise_jpeg(512, 384);
        let input = write_fixture(&dir, "noise.jpg", &original);
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-rotate", "90", input.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(21)), ExitStatus::Success);
        let result = sink.take_results(JobContext(21)).remove(0);
        assert!(result.len() > 32 * 1024, "only {} bytes", result.len());
        assert_eq!(&result[..2], &[0xFF, 0xD8]);
        assert_eq!(&result[result.len() - 2..], &[0xFF, 0xD9]);

        let rotated = decode(&result).to_luma8();
        assert_eq!(rotated.dimensions(), (384, 512));
        let expected = image::imageops::rotate90(&decode(&original).to_luma8());
        for (x, y) in [(0, 0), (100, 37), (383, 511), (250, 400), (17, 300)] {
            let (got, want) = (rotated.get_pixel(x, y).0[0], expected.get_pixel(x, y).0[0]);
            assert!(got.abs_diff(want) <= 16, "pixel ({x},{y}): {got} vs {want}");
        }
    }

    #[test]
    fn test_crop_shrinks_output() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(&dir, "in.jpg", &gradient_jpeg(64, 48));
        let (channel, sink) = collecting_channel();

        let args = ["jpegxf", "-crop", "32x16+16+16", input.to_str().unwrap()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(15)), ExitStatus::Success);
        let result = sink.take_results(JobContext(15)).remove(0);
        assert_eq!(decode(&result).dimensions(), (32, 16));
    }

    #[test]
    fn test_version_reports_success_without_result() {
        init_logger();
        let (channel, sink) = collecting_channel();
        let status = Transcoder::new(channel).run(&["jpegxf", "-version"], JobContext(16));
        assert_eq!(status, ExitStatus::Success);
        assert_eq!(
            sink.events_for(JobContext(16)),
            vec![ProgressEvent::Exit { status: 0 }]
        );
    }

    #[test]
    fn test_foreign_buffer_input() {
        init_logger();
        let jpeg = gradient_jpeg(64, 48);
        let name = format!("@buffer@:{},{}", jpeg.as_ptr() as usize, jpeg.len());
        let (channel, sink) = collecting_channel();

        // SAFETY: `jpeg` outlives the synchronous run.
        let transcoder = unsafe { Transcoder::new(channel).trusting_foreign_buffers() };
        let args = ["jpegxf", "-rotate", "180", name.as_str()];
        assert_eq!(transcoder.run(&args, JobContext(17)), ExitStatus::Success);
        let result = sink.take_results(JobContext(17)).remove(0);
        assert_eq!(decode(&result).dimensions(), (64, 48));

        // without trust the name is just a missing file
        let args = ["jpegxf", name.as_str()];
        assert_eq!(Transcoder::new(channel).run(&args, JobContext(18)), ExitStatus::Io);
    }
}
