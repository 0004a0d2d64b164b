use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use perimeter_core::{
    ClassificationStrategy, Contour, FeedbackLoop, FoundationPipeline, PerimeterConfig,
    PipelineInput, Point, ReferenceDimension,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;
use vision_classifier::{Provider, ProviderKind, VisionClassifier};

/// Foundation perimeter measurement from detected plan corners
#[derive(Debug, Parser)]
#[command(name = "foundation-perimeter", version, about)]
struct Cli {
    /// JSON file overriding engine heuristics
    #[arg(long, global = true, env = "PERIMETER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconstruct the perimeter, calibrate it and compute metrics
    Measure(MeasureArgs),
    /// Iteratively refine boundary contours with reviewer feedback
    RefineBoundary(RefineArgs),
}

#[derive(Debug, clap::Args)]
struct MeasureArgs {
    /// JSON array of candidate corners, `[{"x": 10, "y": 20}, ...]`
    #[arg(long)]
    candidates: PathBuf,

    /// Known real-world length, e.g. 55'-0"
    #[arg(long)]
    reference: String,

    /// Which pixel span the reference length is measured along
    #[arg(long, value_enum)]
    reference_dimension: Option<ReferenceArg>,

    /// Binary wall mask (white = wall) for mask-based calibration
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Plan drawing, required whenever the classifier is used
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StrategyArg::GeometryOnly)]
    strategy: StrategyArg,

    /// Ask the classifier to square up corners before validation
    #[arg(long)]
    correct_corners: bool,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct RefineArgs {
    /// JSON array of contours, `[{"points": [{"x": 0, "y": 0}, ...]}]`
    #[arg(long)]
    contours: PathBuf,

    /// Plan drawing the contours were traced on
    #[arg(long)]
    image: PathBuf,

    /// Number of rounds, the last one is never sent for review
    #[arg(long)]
    rounds: Option<usize>,

    #[command(flatten)]
    provider: ProviderArgs,

    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct ProviderArgs {
    /// Vision service: openai or claude
    #[arg(long, default_value = "openai", env = "VISION_PROVIDER")]
    provider: ProviderKind,

    /// Override the provider's default model
    #[arg(long, env = "VISION_MODEL")]
    model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    GeometryOnly,
    WallClassification,
    PerimeterSubset,
}

impl From<StrategyArg> for ClassificationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::GeometryOnly => ClassificationStrategy::GeometryOnly,
            StrategyArg::WallClassification => ClassificationStrategy::WallClassification,
            StrategyArg::PerimeterSubset => ClassificationStrategy::PerimeterSubset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReferenceArg {
    LongestWall,
    MaskWidth,
    MaskHeight,
    CornerExtentWidth,
}

impl From<ReferenceArg> for ReferenceDimension {
    fn from(arg: ReferenceArg) -> Self {
        match arg {
            ReferenceArg::LongestWall => ReferenceDimension::LongestWall,
            ReferenceArg::MaskWidth => ReferenceDimension::MaskWidth,
            ReferenceArg::MaskHeight => ReferenceDimension::MaskHeight,
            ReferenceArg::CornerExtentWidth => ReferenceDimension::CornerExtentWidth,
        }
    }
}

/// Every written result carries an id and timestamp
#[derive(Debug, Serialize)]
struct AnalysisEnvelope<T> {
    analysis_id: String,
    created_at: String,
    result: T,
}

impl<T> AnalysisEnvelope<T> {
    fn new(result: T) -> Self {
        Self {
            analysis_id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339(),
            result,
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PerimeterConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config = PerimeterConfig::from_json_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(PerimeterConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn write_output<T: Serialize>(result: T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&AnalysisEnvelope::new(result))?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn build_classifier(
    image: &Path,
    provider: &ProviderArgs,
) -> anyhow::Result<VisionClassifier<Provider>> {
    let bytes =
        std::fs::read(image).with_context(|| format!("failed to read image {}", image.display()))?;
    let provider = Provider::from_env(provider.provider, provider.model.clone())?;
    VisionClassifier::from_bytes(provider, &bytes)
}

async fn measure(args: MeasureArgs, mut config: PerimeterConfig) -> anyhow::Result<()> {
    if let Some(reference) = args.reference_dimension {
        config.calibration.reference = reference.into();
    }

    let candidates: Vec<Point> = read_json(&args.candidates)?;
    info!("Loaded {} candidate corners", candidates.len());

    let wall_mask = match &args.mask {
        Some(path) => Some(
            image::open(path)
                .with_context(|| format!("failed to open mask {}", path.display()))?
                .to_luma8(),
        ),
        None => None,
    };

    let image_size = match (&args.image, &wall_mask) {
        (Some(path), _) => Some(
            image::image_dimensions(path)
                .with_context(|| format!("failed to read image {}", path.display()))?,
        ),
        (None, Some(mask)) => Some(mask.dimensions()),
        (None, None) => None,
    };

    let input = PipelineInput {
        candidates,
        image_size,
        reference_length: args.reference.clone(),
        wall_mask,
    };

    let strategy: ClassificationStrategy = args.strategy.into();
    let pipeline =
        FoundationPipeline::new(config, strategy).with_corner_correction(args.correct_corners);
    let needs_classifier = strategy != ClassificationStrategy::GeometryOnly || args.correct_corners;

    let report = if needs_classifier {
        let Some(image) = &args.image else {
            bail!("--image is required for strategy {:?}", strategy);
        };
        let classifier =
            build_classifier(image, &args.provider)?.with_reference_length(&args.reference);
        pipeline.run(&input, &classifier).await?
    } else {
        pipeline.run_geometry_only(&input)?
    };

    info!(
        "Perimeter: {} corners, {:.1} linear feet, {:.1} sq ft footprint",
        report.metrics.total_corners,
        report.metrics.total_linear_feet,
        report.metrics.footprint_area_sqft
    );

    write_output(report, args.output.as_deref())
}

async fn refine_boundary(args: RefineArgs, mut config: PerimeterConfig) -> anyhow::Result<()> {
    if let Some(rounds) = args.rounds {
        config.feedback.iterations = rounds;
    }

    let contours: Vec<Contour> = read_json(&args.contours)?;
    let classifier = build_classifier(&args.image, &args.provider)?;
    let image_size = classifier.image_size();

    info!(
        "Refining {} contours over {} rounds",
        contours.len(),
        config.feedback.iterations
    );

    let history = FeedbackLoop::new(config.feedback)
        .run(contours, image_size, &classifier)
        .await;

    write_output(history, args.output.as_deref())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Measure(args) => measure(args, config).await,
        Command::RefineBoundary(args) => refine_boundary(args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_measure() {
        let cli = Cli::try_parse_from([
            "foundation-perimeter",
            "measure",
            "--candidates",
            "corners.json",
            "--reference",
            "55'-0\"",
            "--strategy",
            "perimeter-subset",
            "--provider",
            "claude",
            "--correct-corners",
        ])
        .unwrap();

        let Command::Measure(args) = cli.command else {
            panic!("expected measure");
        };
        assert_eq!(args.strategy, StrategyArg::PerimeterSubset);
        assert_eq!(args.provider.provider, ProviderKind::Claude);
        assert!(args.correct_corners);
        assert_eq!(args.reference, "55'-0\"");
        assert!(args.image.is_none());
    }

    #[test]
    fn test_parse_refine_boundary() {
        let cli = Cli::try_parse_from([
            "foundation-perimeter",
            "refine-boundary",
            "--contours",
            "contours.json",
            "--image",
            "plan.png",
            "--rounds",
            "5",
        ])
        .unwrap();

        let Command::RefineBoundary(args) = cli.command else {
            panic!("expected refine-boundary");
        };
        assert_eq!(args.rounds, Some(5));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Cli::try_parse_from([
            "foundation-perimeter",
            "measure",
            "--candidates",
            "c.json",
            "--reference",
            "10'",
            "--provider",
            "gemini",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_dimension_maps_to_core() {
        assert_eq!(
            ReferenceDimension::from(ReferenceArg::MaskHeight),
            ReferenceDimension::MaskHeight
        );
        assert_eq!(
            ClassificationStrategy::from(StrategyArg::WallClassification),
            ClassificationStrategy::WallClassification
        );
    }

    #[test]
    fn test_envelope_wraps_result() {
        let envelope = AnalysisEnvelope::new(vec![1, 2]);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["result"], serde_json::json!([1, 2]));
        assert_eq!(json["analysis_id"].as_str().unwrap().len(), 36);
        assert!(json["created_at"].as_str().is_some());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/perimeter.json"))).is_err());
        assert!(load_config(None).is_ok());
    }
}
