use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::error::{Error, Result};
use crate::train::step::Visuals;

/// Writes the input, target and prediction slices of `visuals` as
/// `<tag>_<name>.png` into `dir`. Each slice is min-max stretched to 0..=255.
pub fn save_visuals(dir: &Path, tag: &str, visuals: &Visuals) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let side = u32::try_from(visuals.side)
        .map_err(|_| Error::Config(format!("image side {} is too large", visuals.side)))?;

    let mut written = Vec::with_capacity(3);
    for (name, voxels) in [
        ("input", &visuals.input),
        ("target", &visuals.target),
        ("prediction", &visuals.prediction),
    ] {
        let found = (1, voxels.len());
        let image = GrayImage::from_raw(side, side, stretch(voxels))
            .ok_or_else(|| Error::shape(name, (1, visuals.side * visuals.side), found))?;
        let path = dir.join(format!("{tag}_{name}.png"));
        image.save(&path)?;
        written.push(path);
    }
    Ok(written)
}

fn stretch(voxels: &[f64]) -> Vec<u8> {
    let (lo, hi) = voxels.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    voxels.iter()
        .map(|&v| {
            if range > 0.0 {
                ((v - lo) / range * 255.0).round() as u8
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_spans_full_range() {
        assert_eq!(stretch(&[-1.0, 0.0, 1.0]), vec![0, 128, 255]);
        assert_eq!(stretch(&[0.3, 0.3]), vec![0, 0]);
    }

    #[test]
    fn writes_three_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = Visuals {
            side: 2,
            input: vec![0.0, 0.1, 0.2, 0.3],
            target: vec![1.0; 4],
            prediction: vec![0.5, 0.4, 0.3, 0.2],
            cond: vec![1.0],
        };
        let paths = save_visuals(dir.path(), "epoch1step10", &visuals).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));
        assert!(paths[2].ends_with("epoch1step10_prediction.png"));
    }

    #[test]
    fn short_slices_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = Visuals { side: 3, input: vec![0.0; 4], target: vec![0.0; 9], prediction: vec![0.0; 9], cond: vec![] };
        assert!(matches!(save_visuals(dir.path(), "x", &visuals), Err(Error::ShapeMismatch { .. })));
    }
}
