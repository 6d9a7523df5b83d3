use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rand::{seq::SliceRandom, Rng};
use tracing::debug;

use crate::data::manifest::read_manifest;
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::train::{batch::Batch, config::Hyperparameters};

/// One subject slice, flattened channel-major.
#[derive(Debug, Clone)]
pub struct Sample {
    pub subject: String,
    pub t1: Option<Vec<f64>>,
    pub b0: Option<Vec<f64>>,
    pub cond: Vec<f64>,
    pub dwi: Vec<f64>,
}

/// A split held fully in memory.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Dataset {
        Dataset { samples }
    }

    /// Loads every row of the manifest at `manifest`. Image paths are
    /// resolved against `data_dir`; slices are resized to `image_size` and
    /// scaled to [0, 1].
    pub fn load(manifest: &Path, data_dir: &Path, hp: &Hyperparameters) -> Result<Dataset> {
        let rows = read_manifest(manifest)?;
        let side = hp.image_size;
        let samples = rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let invalid = |reason: String| Error::Manifest {
                    path: manifest.to_path_buf(),
                    reason: format!("row {} ({}): {reason}", i + 1, row.subject),
                };
                if row.cond.len() != hp.cond_dim {
                    return Err(invalid(format!(
                        "{} condition values, cond_dim is {}",
                        row.cond.len(),
                        hp.cond_dim
                    )));
                }
                Ok(Sample {
                    subject: row.subject.clone(),
                    t1: load_modality("t1", &row.t1, hp.multimodal_t1, data_dir, side).map_err(&invalid)?,
                    b0: load_modality("b0", &row.b0, hp.multimodal_b0, data_dir, side).map_err(&invalid)?,
                    cond: row.cond.clone(),
                    dwi: load_channels("dwi", &row.dwi, hp.output_dim, data_dir, side).map_err(&invalid)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(samples = samples.len(), manifest = %manifest.display(), "loaded split");
        Ok(Dataset { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Batches in manifest order; the last one may be short.
    pub fn batches(&self, batch_size: usize) -> Vec<Batch> {
        let order: Vec<usize> = (0..self.samples.len()).collect();
        self.collate(&order, batch_size)
    }

    /// Batches over a fresh random permutation of the samples.
    pub fn shuffled_batches<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(rng);
        self.collate(&order, batch_size)
    }

    fn collate(&self, order: &[usize], batch_size: usize) -> Vec<Batch> {
        order.chunks(batch_size.max(1))
            .map(|chunk| Batch {
                t1: self.stack(chunk, |s| s.t1.as_ref()),
                b0: self.stack(chunk, |s| s.b0.as_ref()),
                cond: Matrix::from_data(chunk.iter().map(|&i| self.samples[i].cond.clone()).collect()),
                dwi: Matrix::from_data(chunk.iter().map(|&i| self.samples[i].dwi.clone()).collect()),
            })
            .collect()
    }

    /// Stacks an optional modality; `None` unless every sample carries it.
    fn stack<'a>(&'a self, chunk: &[usize], field: impl Fn(&'a Sample) -> Option<&'a Vec<f64>>) -> Option<Matrix> {
        chunk.iter()
            .map(|&i| field(&self.samples[i]).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Matrix::from_data)
    }
}

fn load_modality(
    name: &str,
    paths: &[PathBuf],
    channels: usize,
    data_dir: &Path,
    side: usize,
) -> std::result::Result<Option<Vec<f64>>, String> {
    if channels == 0 {
        return Ok(None);
    }
    load_channels(name, paths, channels, data_dir, side).map(Some)
}

fn load_channels(
    name: &str,
    paths: &[PathBuf],
    channels: usize,
    data_dir: &Path,
    side: usize,
) -> std::result::Result<Vec<f64>, String> {
    if paths.len() != channels {
        return Err(format!("{} {name} files, expected {channels}", paths.len()));
    }
    let mut voxels = Vec::with_capacity(channels * side * side);
    for path in paths {
        let path = data_dir.join(path);
        voxels.extend(load_slice(&path, side).map_err(|e| format!("{}: {e}", path.display()))?);
    }
    Ok(voxels)
}

/// Reads a greyscale slice resized to `side` × `side`, scaled to [0, 1].
pub fn load_slice(path: &Path, side: usize) -> Result<Vec<f64>> {
    let side = u32::try_from(side)
        .map_err(|_| Error::Config(format!("image_size {side} is too large")))?;
    let image = image::open(path)?;
    let slice = image.resize_exact(side, side, FilterType::Triangle).to_luma16();
    Ok(slice.into_raw().into_iter().map(|v| f64::from(v) / f64::from(u16::MAX)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use rand::{rngs::StdRng, SeedableRng};

    fn sample(id: usize) -> Sample {
        Sample {
            subject: format!("sub-{id}"),
            t1: Some(vec![id as f64; 4]),
            b0: None,
            cond: vec![id as f64, 0.0],
            dwi: vec![id as f64; 4],
        }
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let data = Dataset::new((0..7).map(sample).collect());
        let batches = data.shuffled_batches(3, &mut StdRng::seed_from_u64(1));
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 1]);

        let mut seen: Vec<f64> = batches.iter().flat_map(|b| b.cond.iter().step_by(2).copied().collect::<Vec<_>>()).collect();
        seen.sort_by(f64::total_cmp);
        assert_eq!(seen, (0..7).map(|i| i as f64).collect::<Vec<_>>());
        assert!(batches.iter().all(|b| b.t1.is_some() && b.b0.is_none()));
    }

    #[test]
    fn slices_are_resized_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.png");
        GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 0 } else { 255 }])).save(&path).unwrap();

        let voxels = load_slice(&path, 4).unwrap();
        assert_eq!(voxels.len(), 16);
        assert_eq!(voxels[0], 0.0);
        assert_eq!(voxels[3], 1.0);
    }

    #[test]
    fn channel_count_is_checked() {
        let err = load_channels("dwi", &[], 1, Path::new("."), 4).unwrap_err();
        assert_eq!(err, "0 dwi files, expected 1");
    }
}
