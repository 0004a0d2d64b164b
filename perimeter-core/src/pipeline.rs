use crate::calibration::{calibrate, parse_feet_inches, Calibration};
use crate::classification::{
    apply_corner_corrections, parse_response, ClassificationMode, ClassifiedWall,
    CornerCorrectionResponse, GeometryClassifier, PerimeterSubsetResponse, WallLengthResponse,
};
use crate::clustering::cluster_points;
use crate::config::PerimeterConfig;
use crate::error::{PerimeterError, Result};
use crate::metrics::{compute_metrics, FoundationMetrics};
use crate::model::{GeometryModel, Point};
use crate::ordering::order_perimeter;
use crate::perimeter::rebuild_from_subset;
use crate::validity::{apply_classification, RestoreRule, ValidityReport};
use crate::wall_filter::{filter_walls, FilterOutcome};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// How the external classifier takes part in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStrategy {
    /// Geometric heuristics only, the classifier is never called
    #[default]
    GeometryOnly,
    /// Classifier flags invalid corners and reads wall lengths
    WallClassification,
    /// Classifier picks the perimeter corners and their connection order
    PerimeterSubset,
}

/// Inputs of one measurement run
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub candidates: Vec<Point>,
    /// `(width, height)` of the source image, used for relative clustering radii
    pub image_size: Option<(u32, u32)>,
    /// Real-world length of the reference dimension, e.g. `55'-0"`
    pub reference_length: String,
    pub wall_mask: Option<GrayImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerimeterReport {
    pub model: GeometryModel,
    pub calibration: Calibration,
    pub validity: ValidityReport,
    pub filter: FilterOutcome,
    pub metrics: FoundationMetrics,
    pub strategy: ClassificationStrategy,
    /// False when the classifier was unavailable or its answer was unusable
    pub classification_used: bool,
    /// Wall lengths as read by the classifier, for comparison with the calibrated ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifier_walls: Vec<ClassifiedWall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrected_corners: Vec<usize>,
    pub warnings: Vec<String>,
    pub stage_timings: Vec<(String, u128)>,
}

/// Outcome of the classification step before repair
struct Classified {
    model: GeometryModel,
    invalid_ids: Vec<usize>,
    classifier_walls: Vec<ClassifiedWall>,
    used: bool,
}

impl Classified {
    fn geometry_only(model: GeometryModel) -> Self {
        Self {
            model,
            invalid_ids: Vec::new(),
            classifier_walls: Vec::new(),
            used: false,
        }
    }
}

/// Model after validity repair and wall filtering
struct Repaired {
    model: GeometryModel,
    validity: ValidityReport,
    filter: FilterOutcome,
}

#[derive(Default)]
struct RunLog {
    warnings: Vec<String>,
    timings: Vec<(String, u128)>,
}

impl RunLog {
    fn record(&mut self, stage: &str, start: Instant) {
        self.timings.push((stage.to_string(), start.elapsed().as_millis()));
    }

    fn degrade(&mut self, step: &str, error: &anyhow::Error) {
        warn!("{} unavailable, continuing with geometry only: {:#}", step, error);
        self.warnings.push(format!("{} unavailable: {:#}", step, error));
    }
}

/// End-to-end perimeter reconstruction: cluster, order, classify, repair,
/// filter, correct, calibrate and measure
pub struct FoundationPipeline {
    config: PerimeterConfig,
    strategy: ClassificationStrategy,
    correct_corners: bool,
}

impl FoundationPipeline {
    pub fn new(config: PerimeterConfig, strategy: ClassificationStrategy) -> Self {
        Self {
            config,
            strategy,
            correct_corners: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PerimeterConfig::default(), ClassificationStrategy::GeometryOnly)
    }

    /// Ask the classifier to snap corners after filtering
    pub fn with_corner_correction(mut self, enabled: bool) -> Self {
        self.correct_corners = enabled;
        self
    }

    pub fn config(&self) -> &PerimeterConfig {
        &self.config
    }

    pub fn strategy(&self) -> ClassificationStrategy {
        self.strategy
    }

    /// Run without any classifier, whatever the configured strategy
    pub fn run_geometry_only(&self, input: &PipelineInput) -> Result<PerimeterReport> {
        let mut log = RunLog::default();

        let model = self.initial_model(input, &mut log)?;
        let classified = Classified::geometry_only(model);
        let repaired = self.repair(classified.model, &classified.invalid_ids, &mut log);

        self.measure(
            input,
            repaired,
            ClassificationStrategy::GeometryOnly,
            Vec::new(),
            false,
            Vec::new(),
            log,
        )
    }

    /// Run the configured strategy, degrading to geometry-only when the
    /// classifier fails or answers with something unusable
    pub async fn run<C: GeometryClassifier>(
        &self,
        input: &PipelineInput,
        classifier: &C,
    ) -> Result<PerimeterReport> {
        let mut log = RunLog::default();

        let model = self.initial_model(input, &mut log)?;

        let start = Instant::now();
        let classified = match self.strategy {
            ClassificationStrategy::GeometryOnly => Classified::geometry_only(model),
            ClassificationStrategy::WallClassification => {
                self.classify_walls(model, classifier, &mut log).await
            }
            ClassificationStrategy::PerimeterSubset => {
                self.classify_subset(model, classifier, &mut log).await?
            }
        };
        log.record("classification", start);

        let Classified {
            model,
            invalid_ids,
            classifier_walls,
            used,
        } = classified;
        let mut repaired = self.repair(model, &invalid_ids, &mut log);

        let mut corrected = Vec::new();
        if self.correct_corners {
            let start = Instant::now();
            corrected = self.correct(&mut repaired.model, classifier, &mut log).await;
            log.record("corner_correction", start);
        }

        self.measure(
            input,
            repaired,
            self.strategy,
            classifier_walls,
            used,
            corrected,
            log,
        )
    }

    /// Cluster candidates and build the angular-order model
    fn initial_model(&self, input: &PipelineInput, log: &mut RunLog) -> Result<GeometryModel> {
        if input.candidates.is_empty() {
            return Err(PerimeterError::EmptyCandidates);
        }
        // A bad reference fails the run before any classifier is consulted
        parse_feet_inches(&input.reference_length)?;

        let start = Instant::now();
        let epsilon = self.config.clustering.epsilon_for(input.image_size);
        let corners = cluster_points(&input.candidates, epsilon);
        info!(
            "Clustered {} candidates into {} corners (eps {:.1}px)",
            input.candidates.len(),
            corners.len(),
            epsilon
        );

        let ordered = order_perimeter(&corners)?;
        let model = GeometryModel::from_points(&ordered);
        log.record("geometry", start);

        Ok(model)
    }

    async fn classify_walls<C: GeometryClassifier>(
        &self,
        model: GeometryModel,
        classifier: &C,
        log: &mut RunLog,
    ) -> Classified {
        let response = match classifier
            .classify(ClassificationMode::WallLengths, &model.to_payload())
            .await
            .and_then(|raw| parse_response::<WallLengthResponse>(&raw))
        {
            Ok(response) => response,
            Err(e) => {
                log.degrade("wall classification", &e);
                return Classified::geometry_only(model);
            }
        };

        info!(
            "Classifier flagged {} invalid corners and read {} wall lengths",
            response.invalid_corners.len(),
            response.walls.len()
        );
        Classified {
            model,
            invalid_ids: response.invalid_corners,
            classifier_walls: response.walls,
            used: true,
        }
    }

    async fn classify_subset<C: GeometryClassifier>(
        &self,
        model: GeometryModel,
        classifier: &C,
        log: &mut RunLog,
    ) -> Result<Classified> {
        let response = match classifier
            .classify(ClassificationMode::PerimeterSubset, &model.to_payload())
            .await
            .and_then(|raw| parse_response::<PerimeterSubsetResponse>(&raw))
        {
            Ok(response) => response,
            Err(e) => {
                log.degrade("perimeter identification", &e);
                return Ok(Classified::geometry_only(model));
            }
        };

        if !response.explanation.is_empty() {
            info!("Perimeter identification: {}", response.explanation);
        }
        // A well-formed empty answer is a real "no perimeter" verdict
        let model = rebuild_from_subset(&model, &response.perimeter_corner_ids)?;

        Ok(Classified {
            model,
            invalid_ids: Vec::new(),
            classifier_walls: Vec::new(),
            used: true,
        })
    }

    async fn correct<C: GeometryClassifier>(
        &self,
        model: &mut GeometryModel,
        classifier: &C,
        log: &mut RunLog,
    ) -> Vec<usize> {
        match classifier
            .classify(ClassificationMode::CornerCorrection, &model.to_payload())
            .await
            .and_then(|raw| parse_response::<CornerCorrectionResponse>(&raw))
        {
            Ok(response) => apply_corner_corrections(model, &response.corrected_corners),
            Err(e) => {
                log.degrade("corner correction", &e);
                Vec::new()
            }
        }
    }

    fn repair(&self, mut model: GeometryModel, invalid_ids: &[usize], log: &mut RunLog) -> Repaired {
        let start = Instant::now();

        let mut validity = apply_classification(&mut model, invalid_ids, &self.config.validity);
        let filter = filter_walls(&mut model, &self.config.filter);
        validity.record_restorations(&filter.restored_corners, RestoreRule::Structural);

        log.record("repair", start);
        Repaired {
            model,
            validity,
            filter,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn measure(
        &self,
        input: &PipelineInput,
        repaired: Repaired,
        strategy: ClassificationStrategy,
        classifier_walls: Vec<ClassifiedWall>,
        classification_used: bool,
        corrected_corners: Vec<usize>,
        mut log: RunLog,
    ) -> Result<PerimeterReport> {
        let start = Instant::now();
        let Repaired {
            mut model,
            validity,
            filter,
        } = repaired;

        let calibration = calibrate(
            &mut model,
            &input.reference_length,
            input.wall_mask.as_ref(),
            &self.config.calibration,
        )?;
        if !calibration.plausible {
            log.warnings.push(format!(
                "scale factor {:.4} in/px is outside the plausible range {}-{}",
                calibration.scale_factor,
                self.config.calibration.plausible_scale_min,
                self.config.calibration.plausible_scale_max
            ));
        }

        let metrics = compute_metrics(&model, calibration.scale_factor, &self.config.metrics)?;
        log.record("calibration", start);

        info!(
            "Perimeter: {} corners, {} walls, {:.1} linear feet",
            model.corners.len(),
            model.walls.len(),
            metrics.total_linear_feet
        );

        Ok(PerimeterReport {
            model,
            calibration,
            validity,
            filter,
            metrics,
            strategy,
            classification_used,
            classifier_walls,
            corrected_corners,
            warnings: log.warnings,
            stage_timings: log.timings,
        })
    }
}
