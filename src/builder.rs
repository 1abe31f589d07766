use crate::common::{Config, FacesError, Result};
use crate::core::{
    Annotate, BoundingBox, Detector, Encoder, FacePatch, Identifier, Identity, ImageAnnotator,
    NearestNeighbourIdentifier, OnnxDetector, OnnxEncoder,
};
use crate::storage::{FileRegistry, Registry};
use image::DynamicImage;
use std::rc::Rc;

/// Constructs the expensive components the builder caches.
pub trait ComponentFactory {
    fn detector(&self, config: &Config) -> Result<Rc<dyn Detector>>;

    fn encoder(&self, config: &Config) -> Result<Rc<dyn Encoder>>;

    fn annotator(&self, _config: &Config) -> Result<Rc<dyn Annotate>> {
        Ok(Rc::new(ImageAnnotator::new()))
    }
}

/// ONNX Runtime detector and encoder, `imageproc` annotator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxComponents;

impl ComponentFactory for OnnxComponents {
    fn detector(&self, config: &Config) -> Result<Rc<dyn Detector>> {
        Ok(Rc::new(OnnxDetector::new(config)?))
    }

    fn encoder(&self, config: &Config) -> Result<Rc<dyn Encoder>> {
        Ok(Rc::new(OnnxEncoder::new(config)?))
    }
}

/// Composition root.
///
/// Detector, encoder, annotator and identifier are built on first access and
/// shared afterwards. The identifier is a snapshot of the registry taken when
/// it is fitted; registry writes stay invisible to it until [`Builder::reload`].
/// The registry itself is re-read on every access.
pub struct Builder {
    config: Config,
    factory: Box<dyn ComponentFactory>,
    detector: Option<Rc<dyn Detector>>,
    encoder: Option<Rc<dyn Encoder>>,
    identifier: Option<Rc<dyn Identifier>>,
    annotator: Option<Rc<dyn Annotate>>,
}

impl Builder {
    pub fn new(config: Config, factory: Box<dyn ComponentFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            detector: None,
            encoder: None,
            identifier: None,
            annotator: None,
        })
    }

    pub fn from_config(config: Config) -> Result<Self> {
        Self::new(config, Box::new(OnnxComponents))
    }

    pub fn from_defaults() -> Result<Self> {
        Self::from_config(Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sentinel(&self) -> &Identity {
        &self.config.identifier.sentinel
    }

    pub fn detector(&mut self) -> Result<Rc<dyn Detector>> {
        if let Some(detector) = &self.detector {
            return Ok(detector.clone());
        }
        tracing::debug!("Building detector");
        let detector = self.factory.detector(&self.config)?;
        self.detector = Some(detector.clone());
        Ok(detector)
    }

    pub fn encoder(&mut self) -> Result<Rc<dyn Encoder>> {
        if let Some(encoder) = &self.encoder {
            return Ok(encoder.clone());
        }
        tracing::debug!("Building encoder");
        let encoder = self.factory.encoder(&self.config)?;
        self.encoder = Some(encoder.clone());
        Ok(encoder)
    }

    pub fn annotator(&mut self) -> Result<Rc<dyn Annotate>> {
        if let Some(annotator) = &self.annotator {
            return Ok(annotator.clone());
        }
        let annotator = self.factory.annotator(&self.config)?;
        self.annotator = Some(annotator.clone());
        Ok(annotator)
    }

    /// Open the registry afresh. Not cached.
    pub fn registry(&self) -> Result<FileRegistry> {
        FileRegistry::open(&self.config.registry.path)
    }

    /// The cached identifier, fitted against the current registry on first use.
    pub fn identifier(&mut self) -> Result<Rc<dyn Identifier>> {
        if let Some(identifier) = &self.identifier {
            return Ok(identifier.clone());
        }

        let encoder = self.encoder()?;
        let registry = self.registry()?;
        tracing::debug!("Fitting identifier on {} registry entries", registry.len());

        let identifier: Rc<dyn Identifier> = Rc::new(NearestNeighbourIdentifier::fit(
            registry.iter(),
            encoder,
            self.config.identifier.distance_threshold,
            self.config.identifier.sentinel.clone(),
        )?);
        self.identifier = Some(identifier.clone());
        Ok(identifier)
    }

    /// Drop the cached identifier so the next access refits it against the
    /// registry's current contents. Other components stay cached.
    pub fn reload(&mut self) -> &mut Self {
        if self.identifier.take().is_some() {
            tracing::debug!("Discarded cached identifier");
        }
        self
    }

    /// Detect every face in `image` and identify it.
    pub fn identify_image(&mut self, image: &DynamicImage) -> Result<Vec<(BoundingBox, Identity)>> {
        let detector = self.detector()?;
        let identifier = self.identifier()?;
        detector
            .extract(image)?
            .into_iter()
            .map(|(bbox, patch)| -> Result<(BoundingBox, Identity)> {
                Ok((bbox, identifier.identify(&patch)?))
            })
            .collect()
    }

    /// Register the single face found in an image under `identity`.
    ///
    /// Rejected without touching the registry when there is no face, more
    /// than one face, or `identity` is the sentinel.
    pub fn register_patches(&self, patches: Vec<FacePatch>, identity: Identity) -> Result<()> {
        if identity == self.config.identifier.sentinel {
            return Err(FacesError::InvalidOperation(format!(
                "{:?} is reserved for unidentified faces", identity.as_str()
            )));
        }

        let mut patches = patches.into_iter();
        let patch = match (patches.next(), patches.next()) {
            (Some(patch), None) => patch,
            (None, _) => {
                return Err(FacesError::InvalidOperation("no face to register".into()));
            }
            (Some(_), Some(_)) => {
                return Err(FacesError::InvalidOperation(format!(
                    "{} faces found, cannot tell which one is {}",
                    patches.len() + 2,
                    identity
                )));
            }
        };

        let mut registry = self.registry()?;
        registry.add(patch, identity)
    }

    /// Extract the faces of `image` and register the only one under `identity`.
    pub fn register_image(&mut self, image: &DynamicImage, identity: Identity) -> Result<()> {
        let detector = self.detector()?;
        let patches = detector
            .extract(image)?
            .into_iter()
            .map(|(_, patch)| patch)
            .collect();
        self.register_patches(patches, identity)
    }
}
