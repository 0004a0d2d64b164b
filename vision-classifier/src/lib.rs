pub mod prompts;
pub mod provider;
pub mod render;

pub use provider::{ClaudeProvider, OpenAiProvider, Provider, ProviderKind, VisionProvider};

use anyhow::Context;
use image::{DynamicImage, RgbImage};
use perimeter_core::classification::{BoundaryReviewer, ClassificationMode, GeometryClassifier};
use perimeter_core::{Contour, GeometryPayload};
use tracing::info;

/// Foundation plan classifier backed by a vision-language provider.
///
/// Holds the drawing being analysed: geometry requests send it as-is, review
/// rounds send it with the current contours drawn in green.
pub struct VisionClassifier<P> {
    provider: P,
    drawing: RgbImage,
    drawing_png: Vec<u8>,
    reference_length: Option<String>,
    outline_thickness: u32,
}

impl<P: VisionProvider> VisionClassifier<P> {
    pub fn new(provider: P, drawing: DynamicImage) -> anyhow::Result<Self> {
        let drawing = drawing.to_rgb8();
        let drawing_png = render::encode_png(&drawing)?;
        Ok(Self {
            provider,
            drawing,
            drawing_png,
            reference_length: None,
            outline_thickness: 3,
        })
    }

    /// Decode a PNG/JPEG drawing
    pub fn from_bytes(provider: P, image_bytes: &[u8]) -> anyhow::Result<Self> {
        let drawing = image::load_from_memory(image_bytes).context("failed to decode drawing")?;
        Self::new(provider, drawing)
    }

    /// Mention the known overall width so the model can read lengths to scale
    pub fn with_reference_length(mut self, reference_length: impl Into<String>) -> Self {
        self.reference_length = Some(reference_length.into());
        self
    }

    pub fn with_outline_thickness(mut self, thickness: u32) -> Self {
        self.outline_thickness = thickness;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.drawing.dimensions()
    }
}

impl<P: VisionProvider> GeometryClassifier for VisionClassifier<P> {
    async fn classify(
        &self,
        mode: ClassificationMode,
        geometry: &GeometryPayload,
    ) -> anyhow::Result<String> {
        let prompt = prompts::geometry_prompt(mode, geometry, self.reference_length.as_deref())?;

        info!(
            "Requesting {:?} classification of {} corners from {}",
            mode,
            geometry.corners.len(),
            self.provider.name()
        );

        self.provider
            .submit(&prompt, &self.drawing_png)
            .await
            .with_context(|| format!("{:?} request to {} failed", mode, self.provider.name()))
    }
}

impl<P: VisionProvider> BoundaryReviewer for VisionClassifier<P> {
    async fn review(&self, contours: &[Contour], round: usize) -> anyhow::Result<String> {
        let overlay = render::overlay_contours(&self.drawing, contours, self.outline_thickness);
        let overlay_png = render::encode_png(&overlay)?;
        let prompt = prompts::review_prompt(round, contours.len());

        info!(
            "Requesting boundary review round {} ({} contours) from {}",
            round + 1,
            contours.len(),
            self.provider.name()
        );

        self.provider
            .submit(&prompt, &overlay_png)
            .await
            .with_context(|| format!("review round {} failed", round + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use perimeter_core::classification::{parse_response, FeedbackResponse};
    use perimeter_core::config::FeedbackConfig;
    use perimeter_core::{FeedbackLoop, GeometryModel, Point};
    use std::cell::RefCell;

    /// Records every request and answers from a fixed script
    struct MockProvider {
        reply: String,
        prompts: RefCell<Vec<String>>,
        images: RefCell<Vec<Vec<u8>>>,
    }

    impl MockProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: RefCell::new(Vec::new()),
                images: RefCell::new(Vec::new()),
            }
        }
    }

    impl VisionProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn submit(&self, prompt: &str, image_png: &[u8]) -> anyhow::Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.images.borrow_mut().push(image_png.to_vec());
            Ok(self.reply.clone())
        }
    }

    fn drawing() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])))
    }

    #[tokio::test]
    async fn test_classify_sends_drawing_and_contract() {
        let provider = MockProvider::replying(r#"{"invalid_corners": []}"#);
        let classifier = VisionClassifier::new(provider, drawing())
            .unwrap()
            .with_reference_length("40'-0\"");
        let payload = GeometryModel::from_points(&[
            Point::new(10, 10),
            Point::new(190, 10),
            Point::new(190, 90),
            Point::new(10, 90),
        ])
        .to_payload();

        let raw = classifier
            .classify(ClassificationMode::WallLengths, &payload)
            .await
            .unwrap();

        assert_eq!(raw, r#"{"invalid_corners": []}"#);
        let prompts = classifier.provider().prompts.borrow();
        assert!(prompts[0].contains("invalid_corners"));
        assert!(prompts[0].contains("40'-0\""));

        let sent = image::load_from_memory(&classifier.provider().images.borrow()[0]).unwrap();
        assert_eq!((sent.width(), sent.height()), (200, 100));
    }

    #[tokio::test]
    async fn test_review_sends_overlay() {
        let provider = MockProvider::replying(
            r#"```json
{"issues": [{"location": "top", "problem": "deviation"}], "overall_assessment": "close"}
```"#,
        );
        let classifier = VisionClassifier::new(provider, drawing()).unwrap();
        let contour = Contour::new(vec![
            Point::new(20, 20),
            Point::new(180, 20),
            Point::new(180, 80),
            Point::new(20, 80),
        ]);

        let raw = classifier.review(&[contour], 0).await.unwrap();
        let response: FeedbackResponse = parse_response(&raw).unwrap();
        assert_eq!(response.issues.len(), 1);

        let sent = image::load_from_memory(&classifier.provider().images.borrow()[0])
            .unwrap()
            .to_rgb8();
        assert_eq!(*sent.get_pixel(100, 20), Rgb([0, 255, 0]));
        assert_eq!(*sent.get_pixel(100, 50), Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn test_feedback_loop_with_vision_reviewer() {
        let provider = MockProvider::replying(r#"{"issues": [], "overall_assessment": "good"}"#);
        let classifier = VisionClassifier::new(provider, drawing()).unwrap();
        let contours = vec![Contour::new(vec![
            Point::new(20, 20),
            Point::new(180, 20),
            Point::new(180, 80),
        ])];

        let history = FeedbackLoop::new(FeedbackConfig::default())
            .run(contours.clone(), classifier.image_size(), &classifier)
            .await;

        // Three rounds, the last one never calls the provider
        assert_eq!(classifier.provider().prompts.borrow().len(), 2);
        assert_eq!(history.rounds.len(), 3);
        assert_eq!(history.rounds[1].overall_assessment, "good");
        assert_eq!(history.final_contours, contours);
    }
}
