//! Frames on disk through to slices and a Zarr volume.

use std::path::Path;

use image::{ImageBuffer, Luma};
use test_utils::fixtures::{self, BAND_ROWS, REFERENCE_FRAME, TWO_BAND_FRAMES, TWO_BAND_PERIOD};
use tomo_core::{
    AngleCalibrator, CancellationToken, CenterCalibrator, CentreSearchConfig, CropRegion,
    FrameSource, GeometryPreprocessor, NoProgress, PeriodSearchConfig, PreprocessOptions,
    ReconAlgorithm, ReconstructionOrchestrator,
};
use tomo_io::{read_volume, DirectoryFrameSource, SliceWriter, VolumeMetadata, VolumeWriter};

fn write_phantom_frames(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let phantom = fixtures::two_band_phantom();
    for (index, frame) in phantom.frames(TWO_BAND_FRAMES).iter().enumerate() {
        let (height, width) = frame.dim();
        let pixels: Vec<u16> = frame
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16)
            .collect();
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width as u32, height as u32, pixels)
            .unwrap()
            .save(dir.join(format!("frame_{:04}.png", index)))
            .unwrap();
    }
}

#[test]
fn test_directory_to_slices_and_volume() {
    let root = tempfile::tempdir().unwrap();
    let frame_dir = root.path().join("frames");
    write_phantom_frames(&frame_dir);

    let mut source = DirectoryFrameSource::new(&frame_dir, "png");
    let stack = source.load().unwrap();
    assert_eq!(stack.frame_count(), TWO_BAND_FRAMES);

    let angles = AngleCalibrator::new(&stack, REFERENCE_FRAME)
        .unwrap()
        .automatic(&PeriodSearchConfig::new(TWO_BAND_PERIOD))
        .unwrap();
    assert_eq!(angles.num_images(), TWO_BAND_PERIOD + 1);

    let centre = CenterCalibrator::new(&stack, &angles)
        .automatic(&CentreSearchConfig {
            window: 20,
            downsample: (2, 1),
        })
        .unwrap();
    assert_eq!(centre.cor_offset(), 0);

    let options = PreprocessOptions {
        downsample: (2, 2),
        average: false,
        median_kernel: None,
    };
    let prepared = GeometryPreprocessor::new(&stack, &angles, &centre)
        .prepare(&CropRegion::none(), &options)
        .unwrap();

    let algorithm = ReconAlgorithm::VisualHull { threshold: 0.5 };
    let volume = ReconstructionOrchestrator::new(algorithm)
        .run(prepared.view(), &angles, &NoProgress, &CancellationToken::new())
        .unwrap();
    assert_eq!(volume.slice_count(), BAND_ROWS);

    let slices = SliceWriter::beside(&frame_dir);
    let paths = slices.write(&volume).unwrap();
    assert_eq!(slices.dir(), root.path().join("reconstruction"));
    assert_eq!(paths.len(), BAND_ROWS);
    let first = image::open(&paths[0]).unwrap().to_luma16();
    assert_eq!(first.dimensions(), (32, 32));

    let volume_path = slices.dir().join("volume.zarr");
    let metadata = VolumeMetadata::new(&angles, &centre, algorithm, false);
    VolumeWriter::default()
        .write(&volume_path, &volume, &metadata)
        .unwrap();

    let (restored, restored_meta) = read_volume(&volume_path).unwrap();
    assert_eq!(restored, volume);
    assert_eq!(restored_meta.num_images, TWO_BAND_PERIOD + 1);
    assert_eq!(restored_meta.angles.len(), TWO_BAND_PERIOD + 1);
    assert_eq!(restored_meta.algorithm, algorithm);
}

#[test]
fn test_rerun_replaces_previous_slices() {
    let root = tempfile::tempdir().unwrap();
    let writer = SliceWriter::new(root.path().join("out"));

    let big = tomo_core::ReconVolume::new(ndarray::Array3::from_elem((5, 4, 4), 1.0f32));
    let small = tomo_core::ReconVolume::new(ndarray::Array3::from_elem((2, 4, 4), 1.0f32));
    writer.write(&big).unwrap();
    writer.write(&small).unwrap();

    let count = std::fs::read_dir(writer.dir()).unwrap().count();
    assert_eq!(count, 2);
}
