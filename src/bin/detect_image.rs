//! detect_image - run the detection pipeline on a single image file

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use sightline_kernel::{
    AlertPolicy, Announcer, BackendCapability, BackendRegistry, Detector, DetectorSlot, Frame,
    LogSpeech, Pipeline, PipelineConfig, RawTensor, StubBackend, TaxonomyMode,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to analyze (JPEG or PNG).
    #[arg(long)]
    image: PathBuf,
    /// Taxonomy mode (indoor|outdoor). Overrides SIGHTLINE_MODE.
    #[arg(long)]
    mode: Option<TaxonomyMode>,
    /// Label table (`identifier label` per line). Overrides SIGHTLINE_LABELS_PATH.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Use a stub backend that reports one synthetic object in the image center.
    #[arg(long, default_value_t = false)]
    synthetic: bool,
    /// Detection ONNX model (requires the backend-tract feature).
    #[arg(long, env = "SIGHTLINE_DETECTION_MODEL")]
    detection_model: Option<PathBuf>,
    /// Depth ONNX model (requires the backend-tract feature).
    #[arg(long, env = "SIGHTLINE_DEPTH_MODEL")]
    depth_model: Option<PathBuf>,
    /// Speak (log) an alert for the top detection.
    #[arg(long, default_value_t = false)]
    announce: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = PipelineConfig::load()?;
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if let Some(labels) = args.labels.clone() {
        cfg.labels_path = Some(labels);
    }
    if args.detection_model.is_some() {
        cfg.detection.model_path = args.detection_model.clone();
    }
    if args.depth_model.is_some() {
        cfg.depth.model_path = args.depth_model.clone();
    }
    cfg.frame_skip = 1;
    cfg.validate()?;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?
        .to_rgb8();
    log::info!(
        "analyzing {} ({}x{}, {} taxonomy)",
        args.image.display(),
        image.width(),
        image.height(),
        cfg.mode
    );

    let decoder = cfg.decoder_for(cfg.mode)?;
    let registry = build_registry(&args, &cfg, decoder.num_classes())?;
    log::info!("backends: {}", registry.list().join(", "));

    let detection_backend = registry.backend_for_capability(BackendCapability::ObjectDetection)?;
    let detector = Detector::new(decoder, detection_backend, cfg.detection.input_size);
    let mut pipeline = Pipeline::new(DetectorSlot::new(detector), cfg.pipeline_settings());
    if let Ok(depth_backend) = registry.backend_for_capability(BackendCapability::DepthEstimation)
    {
        pipeline = pipeline.with_depth_backend(depth_backend);
    }

    let frame = Frame::from_rgb_image(0, image);
    let result = pipeline
        .process(&frame)
        .ok_or_else(|| anyhow!("frame was skipped"))?;

    if args.announce {
        let policy: AlertPolicy = cfg.alert_policy();
        let mut announcer = Announcer::new(policy, cfg.alerts.cooldown, LogSpeech);
        announcer.announce(&result.detections, Instant::now());
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn build_registry(args: &Args, cfg: &PipelineConfig, num_classes: usize) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    if args.synthetic {
        registry.register("synthetic-detect", synthetic_backend(num_classes)?);
        registry.register(
            "synthetic-depth",
            StubBackend::constant_depth(cfg.depth.input_size as usize, 1.5),
        );
        return Ok(registry);
    }

    #[cfg(feature = "backend-tract")]
    {
        use sightline_kernel::detect::{InputLayout, TractBackend};

        let model = cfg
            .detection
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("--detection-model is required without --synthetic"))?;
        let mut backend = TractBackend::new(
            model,
            BackendCapability::ObjectDetection,
            cfg.detection.input_size,
            InputLayout::Nhwc,
        )?;
        sightline_kernel::InferenceBackend::warm_up(&mut backend)?;
        registry.register("detect", backend);

        if let Some(depth_model) = &cfg.depth.model_path {
            let backend = TractBackend::new(
                depth_model,
                BackendCapability::DepthEstimation,
                cfg.depth.input_size,
                InputLayout::Nhwc,
            )?;
            registry.register("depth", backend);
        }
        Ok(registry)
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow!(
            "model inference requires the backend-tract feature; use --synthetic to try the pipeline"
        ))
    }
}

/// One centered object of class 0 covering a quarter of the input.
fn synthetic_backend(num_classes: usize) -> Result<StubBackend> {
    let mut record = vec![0.5, 0.5, 0.25, 0.25, 0.9];
    record.extend((0..num_classes).map(|c| if c == 0 { 0.8 } else { 0.1 }));
    let len = record.len();
    let tensor = RawTensor::new(vec![1, 1, len], record)?;
    Ok(StubBackend::new(BackendCapability::ObjectDetection, tensor))
}
