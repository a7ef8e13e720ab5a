//! Zarr V3 storage for reconstructed volumes.
//!
//! The volume is a single float32 array of shape `[slices, y, x]`, chunked
//! along the slice axis. The calibration that produced it travels with the
//! data as array attributes so a volume can be interpreted without the run
//! configuration.

use std::path::Path;
use std::sync::Arc;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::info;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use tomo_core::{AngleCalibration, CenterCalibration, ReconAlgorithm, ReconVolume};

use crate::error::{IoError, Result};

/// Calibration and algorithm recorded alongside a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub reference_index: usize,
    pub num_images: usize,
    pub ang_range: f64,
    pub angles: Vec<f64>,
    pub cor_offset: i64,
    pub algorithm: ReconAlgorithm,
    pub crop_circle: bool,
}

impl VolumeMetadata {
    pub fn new(
        angles: &AngleCalibration,
        centre: &CenterCalibration,
        algorithm: ReconAlgorithm,
        crop_circle: bool,
    ) -> Self {
        Self {
            reference_index: angles.reference_index(),
            num_images: angles.num_images(),
            ang_range: angles.range().degrees(),
            angles: angles.angles().to_vec(),
            cor_offset: centre.cor_offset(),
            algorithm,
            crop_circle,
        }
    }

    /// Serialize into Zarr attributes.
    pub fn to_attributes(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self).map_err(IoError::zarr)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(IoError::zarr(format!("metadata is not an object: {}", other))),
        }
    }

    pub fn from_attributes(attrs: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(attrs.clone())).map_err(IoError::zarr)
    }
}

/// Compression applied to volume chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VolumeCompression {
    #[default]
    None,
    /// Blosc with Zstd at the given level (1-9).
    BloscZstd(u8),
}

/// Writer for volume arrays on the local filesystem.
#[derive(Debug, Clone)]
pub struct VolumeWriter {
    /// Slices per chunk.
    chunk_slices: usize,
    compression: VolumeCompression,
}

impl Default for VolumeWriter {
    fn default() -> Self {
        Self {
            chunk_slices: 16,
            compression: VolumeCompression::None,
        }
    }
}

impl VolumeWriter {
    pub fn new(chunk_slices: usize, compression: VolumeCompression) -> Self {
        Self {
            chunk_slices: chunk_slices.max(1),
            compression,
        }
    }

    /// Write `volume` as a Zarr array rooted at `path`.
    pub fn write(&self, path: &Path, volume: &ReconVolume, metadata: &VolumeMetadata) -> Result<()> {
        let (slices, height, width) = volume.view().dim();
        std::fs::create_dir_all(path)?;
        let store = Arc::new(FilesystemStore::new(path).map_err(IoError::zarr)?);

        let chunk_grid: zarrs::array::ChunkGrid = vec![
            self.chunk_slices.min(slices) as u64,
            height as u64,
            width as u64,
        ]
        .try_into()
        .map_err(|e| IoError::zarr(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            vec![slices as u64, height as u64, width as u64],
            DataType::Float32,
            chunk_grid,
            FillValue::from(0.0f32),
        );
        let mut builder = binding.attributes(metadata.to_attributes()?);
        if let VolumeCompression::BloscZstd(level) = self.compression {
            builder = builder.bytes_to_bytes_codecs(vec![blosc_codec(level)?]);
        }

        let array = builder.build(store, "/").map_err(IoError::zarr)?;
        array.store_metadata().map_err(IoError::zarr)?;

        let subset = ArraySubset::new_with_start_shape(
            vec![0, 0, 0],
            vec![slices as u64, height as u64, width as u64],
        )
        .map_err(IoError::zarr)?;
        let data: Vec<f32> = volume.view().iter().copied().collect();
        array
            .store_array_subset_elements(&subset, &data)
            .map_err(IoError::zarr)?;

        info!(
            path = %path.display(),
            slices,
            height,
            width,
            compression = ?self.compression,
            "Wrote volume"
        );
        Ok(())
    }
}

fn blosc_codec(level: u8) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
    let level = BloscCompressionLevel::try_from(level)
        .map_err(|_| IoError::zarr(format!("invalid compression level {}", level)))?;
    // typesize is required when shuffle is enabled
    let codec = BloscCodec::new(
        BloscCompressor::Zstd,
        level,
        None,
        BloscShuffleMode::Shuffle,
        Some(4),
    )
    .map_err(IoError::zarr)?;
    Ok(Arc::new(codec))
}

/// Read a volume and its metadata back from `path`.
pub fn read_volume(path: &Path) -> Result<(ReconVolume, VolumeMetadata)> {
    let store = Arc::new(FilesystemStore::new(path).map_err(IoError::zarr)?);
    let array = Array::open(store, "/").map_err(IoError::zarr)?;

    let shape = array.shape().to_vec();
    if shape.len() != 3 {
        return Err(IoError::zarr(format!("expected a 3D array, found {:?}", shape)));
    }
    let metadata = VolumeMetadata::from_attributes(array.attributes())?;

    let subset = ArraySubset::new_with_shape(shape.clone());
    let data: Vec<f32> = array
        .retrieve_array_subset_elements(&subset)
        .map_err(IoError::zarr)?;
    let dims = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
    let data = Array3::from_shape_vec(dims, data).map_err(IoError::zarr)?;

    Ok((ReconVolume::new(data), metadata))
}
