use crate::rules::RuleSet;

/// One object class the engine asks the capability for.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSpec {
    pub id: i32,
    pub name: String,
    /// Vehicles are counted, checked against rules and read for plates.
    pub vehicle: bool,
}

/// Restricted class set (COCO ids by default).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    classes: Vec<ClassSpec>,
}

impl ClassMap {
    pub fn new(classes: Vec<ClassSpec>) -> Self {
        Self { classes }
    }

    pub fn get(&self, class_id: i32) -> Option<&ClassSpec> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn ids(&self) -> Vec<i32> {
        self.classes.iter().map(|c| c.id).collect()
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        let spec = |id, name: &str, vehicle| ClassSpec {
            id,
            name: name.to_string(),
            vehicle,
        };
        Self::new(vec![
            spec(0, "person", false),
            spec(2, "car", true),
            spec(3, "motorcycle", true),
            spec(5, "bus", true),
            spec(7, "truck", true),
        ])
    }
}

/// Detection engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Sampled frames per second of video.
    pub sample_rate: f64,
    /// Minimum box confidence passed to (and enforced on) the capability.
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    /// Plate reads are only attempted on vehicles at or above this confidence.
    pub plate_confidence_floor: f64,
    /// Plate confidence, as a fraction of the vehicle box confidence, when
    /// the reader reports none.
    pub plate_confidence_scale: f64,
    /// Yield to the runtime after this many frames read.
    pub yield_every_frames: u64,
    pub classes: ClassMap,
    pub rules: RuleSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2.0,
            confidence_threshold: 0.4,
            iou_threshold: 0.5,
            plate_confidence_floor: 0.7,
            plate_confidence_scale: 0.85,
            yield_every_frames: 100,
            classes: ClassMap::default(),
            rules: RuleSet::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `DETECTION_SAMPLE_RATE`          | `2.0`   |
    /// | `DETECTION_CONFIDENCE_THRESHOLD` | `0.4`   |
    /// | `DETECTION_IOU_THRESHOLD`        | `0.5`   |
    /// | `PLATE_CONFIDENCE_FLOOR`         | `0.7`   |
    /// | `PLATE_CONFIDENCE_SCALE`         | `0.85`  |
    /// | `ENGINE_YIELD_EVERY_FRAMES`      | `100`   |
    ///
    /// Class set and violation rules always use the built-in defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back
    /// to the defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str, default: f64| -> f64 {
            lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let sample_rate = var("DETECTION_SAMPLE_RATE", defaults.sample_rate);
        let plate_confidence_scale =
            var("PLATE_CONFIDENCE_SCALE", defaults.plate_confidence_scale);
        let yield_every_frames: u64 = lookup("ENGINE_YIELD_EVERY_FRAMES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.yield_every_frames);

        Self {
            sample_rate: if sample_rate > 0.0 { sample_rate } else { defaults.sample_rate },
            confidence_threshold: var("DETECTION_CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            iou_threshold: var("DETECTION_IOU_THRESHOLD", defaults.iou_threshold),
            plate_confidence_floor: var("PLATE_CONFIDENCE_FLOOR", defaults.plate_confidence_floor),
            plate_confidence_scale: if (0.0..=1.0).contains(&plate_confidence_scale) {
                plate_confidence_scale
            } else {
                defaults.plate_confidence_scale
            },
            yield_every_frames: yield_every_frames.max(1),
            ..defaults
        }
    }

    /// Native frames between two samples: `max(1, floor(fps / sample_rate))`.
    pub fn sampling_stride(&self, fps: f64) -> u64 {
        if !(fps > 0.0) || !(self.sample_rate > 0.0) {
            return 1;
        }
        ((fps / self.sample_rate).floor() as u64).max(1)
    }
}
