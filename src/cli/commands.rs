use crate::builder::Builder;
use crate::cli::loader::{load_image, ImageOptions};
use crate::common::{FacesError, Result};
use crate::core::{BoundingBox, Identity};
use crate::storage::Registry;
use std::fs;
use std::path::{Path, PathBuf};

fn output_path(output_dir: &Path, image_path: &Path, suffix: &str) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output_dir.join(format!("{}_{}.png", stem, suffix))
}

/// Highlight detected faces, optionally coloured by their likelihood.
/// Returns where the annotated copy was written.
pub fn detect(
    builder: &mut Builder,
    image_path: &Path,
    show_probability: bool,
    output_dir: &Path,
    options: &ImageOptions,
) -> Result<PathBuf> {
    let image = load_image(image_path, options)?;
    let detector = builder.detector()?;
    let annotator = builder.annotator()?;

    let faces = detector.detect(&image)?;
    tracing::info!("{}: {} face(s)", image_path.display(), faces.len());

    let annotated = if show_probability {
        annotator.with_probability(&image, &faces)
    } else {
        let boxes: Vec<BoundingBox> = faces.iter().map(|(bbox, _)| *bbox).collect();
        annotator.boxes(&image, &boxes)
    };

    fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, image_path, "detected");
    annotated.save(&path)?;
    Ok(path)
}

/// Identify every face in an image and write an annotated copy.
pub fn identify(
    builder: &mut Builder,
    image_path: &Path,
    output_dir: &Path,
    options: &ImageOptions,
) -> Result<(Vec<(BoundingBox, Identity)>, PathBuf)> {
    let image = load_image(image_path, options)?;
    let faces = builder.identify_image(&image)?;

    let annotator = builder.annotator()?;
    let annotated = annotator.with_identity(&image, &faces, builder.sentinel());

    fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, image_path, "identified");
    annotated.save(&path)?;
    Ok((faces, path))
}

/// Registry summary, one `count: identity` line per identity.
pub fn list(builder: &Builder, json: bool) -> Result<String> {
    let summary = builder.registry()?.summary();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = summary
            .into_iter()
            .map(|(identity, count)| (identity.to_string(), count.into()))
            .collect();
        return serde_json::to_string_pretty(&map)
            .map_err(|e| FacesError::Other(anyhow::anyhow!("JSON encoding failed: {}", e)));
    }

    Ok(summary
        .iter()
        .map(|(identity, count)| format!("{:4}: {}", count, identity))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Remove identities and all of their faces from the registry.
pub fn remove(builder: &Builder, identities: &[Identity]) -> Result<()> {
    let mut registry = builder.registry()?;
    for identity in identities {
        registry.remove(identity)?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddReport {
    pub added: usize,
    pub skipped: usize,
}

/// Register faces from an image file, or from every file in a directory.
///
/// Without an explicit identity, a file is registered under its stem and a
/// directory's files under the directory name. Images without exactly one
/// face, faces already known under another identity, and files in a
/// directory that do not decode as images are skipped.
pub fn add(
    builder: &mut Builder,
    path: &Path,
    identity: Option<&Identity>,
    options: &ImageOptions,
) -> Result<AddReport> {
    let identity = match identity {
        Some(identity) => identity.clone(),
        None => Identity::from_path(path).ok_or_else(|| {
            FacesError::InvalidOperation(format!("cannot derive an identity from {:?}", path))
        })?,
    };

    let from_dir = path.is_dir();
    let files: Vec<PathBuf> = if from_dir {
        let mut files: Vec<PathBuf> = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        files.retain(|p| p.is_file());
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut report = AddReport::default();
    for file in files {
        let image = match load_image(&file, options) {
            Ok(image) => image,
            Err(FacesError::Image(e)) if from_dir => {
                tracing::warn!("Skipping {}: {}", file.display(), e);
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        match builder.register_image(&image, identity.clone()) {
            Ok(()) => report.added += 1,
            Err(e @ (FacesError::Conflict { .. } | FacesError::InvalidOperation(_))) => {
                tracing::warn!("Skipping {}: {}", file.display(), e);
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}
