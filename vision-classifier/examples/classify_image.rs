// Example: Identify the foundation perimeter of a plan with a vision model
use perimeter_core::{
    ClassificationStrategy, FoundationPipeline, PerimeterConfig, PipelineInput, Point,
};
use std::fs;
use vision_classifier::{Provider, ProviderKind, VisionClassifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🔍 Foundation Perimeter Classifier");
    println!("==================================\n");

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: cargo run --example classify_image <IMAGE> <CANDIDATES_JSON> <WIDTH> [openai|claude]");
        eprintln!("Example: cargo run --example classify_image plan.png corners.json \"55'-0\\\"\" claude");
        return Ok(());
    }
    let kind: ProviderKind = args.get(4).map(|s| s.as_str()).unwrap_or("openai").parse()?;

    let provider = match Provider::from_env(kind, None) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("❌ {}", e);
            return Ok(());
        }
    };

    println!("📂 Loading image: {}", args[1]);
    let image_bytes = fs::read(&args[1])?;
    let candidates: Vec<Point> = serde_json::from_str(&fs::read_to_string(&args[2])?)?;
    println!("✅ {} candidate corners\n", candidates.len());

    let classifier = VisionClassifier::from_bytes(provider, &image_bytes)?.with_reference_length(&args[3]);
    let input = PipelineInput {
        candidates,
        image_size: Some(classifier.image_size()),
        reference_length: args[3].clone(),
        wall_mask: None,
    };

    println!("🤖 Asking {} for the perimeter corners...\n", kind);
    let pipeline = FoundationPipeline::new(PerimeterConfig::default(), ClassificationStrategy::PerimeterSubset);

    match pipeline.run(&input, &classifier).await {
        Ok(report) => {
            println!("📊 Walls:");
            println!("{}", "=".repeat(50));
            for wall in &report.model.walls {
                println!(
                    "  Wall {:>2}: corner {} -> {}  {:>8}  ({:.0}px)",
                    wall.id,
                    wall.start_corner_id,
                    wall.end_corner_id,
                    wall.length.as_deref().unwrap_or("?"),
                    wall.length_pixels
                );
            }
            println!("{}", "=".repeat(50));
            println!(
                "\n📈 {:.1} linear feet, {} corners, {:.1} cu yd of concrete",
                report.metrics.total_linear_feet,
                report.metrics.total_corners,
                report.metrics.concrete_volume_cuyd
            );
            for warning in &report.warnings {
                println!("⚠️  {}", warning);
            }
        }
        Err(e) => eprintln!("❌ Perimeter reconstruction failed: {}", e),
    }

    Ok(())
}
