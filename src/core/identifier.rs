use crate::common::{FacesError, Result};
use crate::core::encoder::{stack_patches, Encoder};
use crate::core::types::{FaceEncoding, FacePatch, Identity};
use ndarray::{Array2, ArrayView1};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Identify faces.
pub trait Identifier {
    /// Identity of the person in `patch`, or the sentinel when no reference
    /// is close enough.
    fn identify(&self, patch: &FacePatch) -> Result<Identity>;

    /// Nearest reference identity and its distance, before thresholding.
    fn nearest_neighbour(&self, patch: &FacePatch) -> Result<(Identity, f32)>;
}

/// Reference encodings and the class index of each row.
#[derive(Debug, Clone)]
struct NearestNeighbour {
    encodings: Array2<f32>,
    targets: Vec<usize>,
}

impl NearestNeighbour {
    fn new(encodings: Array2<f32>, targets: Vec<usize>) -> Result<Self> {
        if encodings.nrows() != targets.len() {
            return Err(FacesError::Model(format!(
                "{} reference encodings for {} targets",
                encodings.nrows(),
                targets.len()
            )));
        }
        Ok(Self { encodings, targets })
    }

    fn empty() -> Self {
        Self {
            encodings: Array2::zeros((0, 0)),
            targets: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Class index and distance of the closest reference.
    ///
    /// The first row wins among equidistant references. Rows at a NaN
    /// distance never win.
    fn nearest(&self, encoding: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (row, reference) in self.encodings.outer_iter().enumerate() {
            let distance = euclidean_distance(encoding, reference);
            match best {
                Some((_, best_distance)) if !(distance < best_distance) => {}
                _ if distance.is_nan() => {}
                _ => best = Some((row, distance)),
            }
        }
        best.map(|(row, distance)| (self.targets[row], distance))
    }
}

fn euclidean_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Open-set nearest neighbour classifier.
///
/// Patches are compared through their encodings. A nearest neighbour further
/// away than the distance threshold is rejected in favour of the sentinel.
pub struct NearestNeighbourIdentifier {
    encoder: Rc<dyn Encoder>,
    distance_threshold: f32,
    sentinel: Identity,
    index_to_identity: Vec<Identity>,
    classifier: NearestNeighbour,
}

impl NearestNeighbourIdentifier {
    /// Fit a classifier to `samples`. Samples labelled with the sentinel are
    /// ignored; without any remaining sample the classifier rejects everything.
    pub fn fit<'a, I>(
        samples: I,
        encoder: Rc<dyn Encoder>,
        distance_threshold: f32,
        sentinel: Identity,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a FacePatch, &'a Identity)>,
    {
        let (patches, labels): (Vec<&FacePatch>, Vec<&Identity>) = samples
            .into_iter()
            .filter(|(_, identity)| **identity != sentinel)
            .unzip();

        if patches.is_empty() {
            tracing::debug!("No trainable samples, fitting an empty identifier");
            return Ok(Self {
                encoder,
                distance_threshold,
                sentinel,
                index_to_identity: Vec::new(),
                classifier: NearestNeighbour::empty(),
            });
        }

        let index_to_identity: Vec<Identity> = labels
            .iter()
            .map(|identity| (*identity).clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let identity_to_index: BTreeMap<&Identity, usize> = index_to_identity
            .iter()
            .enumerate()
            .map(|(index, identity)| (identity, index))
            .collect();

        let batch = stack_patches(&patches)?;
        let encodings = encoder.encode_batch(batch.view())?;
        let targets = labels.iter().map(|identity| identity_to_index[identity]).collect();
        let classifier = NearestNeighbour::new(encodings, targets)?;

        tracing::debug!(
            "Fitted identifier on {} faces of {} identities",
            patches.len(),
            index_to_identity.len()
        );
        Ok(Self {
            encoder,
            distance_threshold,
            sentinel,
            index_to_identity,
            classifier,
        })
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    pub fn sentinel(&self) -> &Identity {
        &self.sentinel
    }

    /// Number of reference faces.
    pub fn len(&self) -> usize {
        self.classifier.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifier.is_empty()
    }

    /// Identities the classifier can answer with, besides the sentinel.
    pub fn identities(&self) -> &[Identity] {
        &self.index_to_identity
    }

    fn nearest_to(&self, encoding: &FaceEncoding) -> (Identity, f32) {
        match self.classifier.nearest(encoding.view()) {
            Some((index, distance)) => (self.index_to_identity[index].clone(), distance),
            None => (self.sentinel.clone(), f32::INFINITY),
        }
    }
}

impl Identifier for NearestNeighbourIdentifier {
    fn identify(&self, patch: &FacePatch) -> Result<Identity> {
        let (identity, distance) = self.nearest_neighbour(patch)?;
        if distance > self.distance_threshold {
            return Ok(self.sentinel.clone());
        }
        Ok(identity)
    }

    fn nearest_neighbour(&self, patch: &FacePatch) -> Result<(Identity, f32)> {
        if self.classifier.is_empty() {
            return Ok((self.sentinel.clone(), f32::INFINITY));
        }
        let encoding = self.encoder.encode(patch)?;
        let width = self.classifier.encodings.ncols();
        if encoding.len() != width {
            return Err(FacesError::Model(format!(
                "Encoder returned {} values for the query, references have {}",
                encoding.len(),
                width
            )));
        }
        Ok(self.nearest_to(&encoding))
    }
}
