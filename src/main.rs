use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::Path;

use indicatif::ProgressStyle;
use tracing::{info, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;

use monospeed::config::*;
use monospeed::dataset::*;
use monospeed::distance::DistanceModel;
use monospeed::ground_plane::{CameraGeometry, GroundPlaneTransformer};
use monospeed::pipeline::*;
use monospeed::pixel_ratio::PixelRatioModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelChoice {
    /// reference-width pixel ratio
    Ratio,
    /// ground-plane projection
    Ground,
    Both,
}

/// Replay recorded vehicle detections and estimate their speeds
#[derive(Parser)]
pub struct Args {
    /// JSON lines file with per-frame detections
    #[clap(short, long, default_value = "./data/detections.jsonl")]
    pub input: String,
    #[clap(long, value_enum, default_value = "both")]
    pub model: ModelChoice,
    /// Frame size of the recorded video, pixels
    #[clap(long, default_value = "1920")]
    pub image_width: usize,
    #[clap(long, default_value = "1080")]
    pub image_height: usize,
    #[clap(flatten)]
    pub config: Config,
}

fn log_report(name: &str, report: &FrameReport) {
    for object in &report.objects {
        if let Some(speed) = object.speed_kmh {
            info!(
                "{name} frame {}: vehicle {} at ({:.0}, {:.0}) {speed:.1} km/h",
                report.frame_index, object.track_id, object.position.x, object.position.y
            );
        }
    }
}

fn summarize<M: DistanceModel>(name: &str, pipeline: &DetectionSpeedPipeline<M>) -> serde_json::Value {
    let speeds: BTreeMap<u64, f64> = pipeline
        .speed_estimates()
        .iter()
        .map(|(id, speed)| (id.0, *speed))
        .collect();
    serde_json::json!({
        "model": name,
        "summary": pipeline.summary(),
        "speeds": speeds,
    })
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let config = args.config;

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .with(LevelFilter::INFO)
        .init();

    // load dataset
    let mut dataset = DetectionDataset::new(Path::new(&args.input))?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(dataset.length);
    let header_span_enter = header_span.enter();

    // create pipelines
    let mut ratio = match args.model {
        ModelChoice::Ratio | ModelChoice::Both => {
            let model = PixelRatioModel::new(config.reference_width)?;
            Some(DetectionSpeedPipeline::new(model, &config)?)
        }
        ModelChoice::Ground => None,
    };
    let mut ground = match args.model {
        ModelChoice::Ground | ModelChoice::Both => {
            let geometry = CameraGeometry::from_config(&config.camera, args.image_width, args.image_height);
            let model = GroundPlaneTransformer::calibrated(&geometry).context("invalid camera geometry")?;
            Some(DetectionSpeedPipeline::new(model, &config)?)
        }
        ModelChoice::Ratio => None,
    };

    while let Some(frame) = dataset.next_frame()? {
        if let Some(pipeline) = ratio.as_mut() {
            log_report("ratio", &pipeline.process_frame(frame.frame_index, &frame.detections));
        }
        if let Some(pipeline) = ground.as_mut() {
            log_report("ground", &pipeline.process_frame(frame.frame_index, &frame.detections));
        }
        header_span.pb_inc(1);
    }

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    let mut summaries = vec![];
    if let Some(pipeline) = &ratio {
        summaries.push(summarize("ratio", pipeline));
    }
    if let Some(pipeline) = &ground {
        summaries.push(summarize("ground", pipeline));
    }
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    Ok(())
}
