use feature_match_detector::{Detection, DetectorConfig, FeatureMatchDetector};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use log::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "feature-match",
    about = "Look for a reference image in query images",
    rename_all = "kebab-case"
)]
struct Opt {
    /// A JSON detector configuration.
    ///
    /// Takes precedence over --reference and --max-distance.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// The reference image to look for.
    #[structopt(short, long, parse(from_os_str), required_unless = "config")]
    reference: Option<PathBuf>,
    /// The threshold in bits for matching (50 if not given).
    #[structopt(short, long)]
    max_distance: Option<u32>,
    /// Write a copy of every query image with its detection drawn into this folder.
    #[structopt(short, long, parse(from_os_str))]
    annotate: Option<PathBuf>,
    /// The query images.
    #[structopt(parse(from_os_str))]
    queries: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    image: &'a Path,
    detections: &'a [Detection],
}

fn load_config(opt: &Opt) -> feature_match_detector::Result<DetectorConfig> {
    match (&opt.config, &opt.reference) {
        (Some(path), _) => DetectorConfig::from_path(path),
        (None, Some(reference)) => {
            let mut config = DetectorConfig::new(reference);
            config.max_match_distance = opt.max_distance;
            config.validate()?;
            Ok(config)
        }
        (None, None) => Err(feature_match_detector::Error::InvalidConfig {
            reason: "either --config or --reference is required".into(),
        }),
    }
}

fn annotate(
    query: &Path,
    detections: &[Detection],
    dir: &Path,
) -> Result<(), image::ImageError> {
    let mut image = image::open(query)?.to_rgb8();
    for detection in detections {
        let rect = detection.bounding_box;
        draw_hollow_rect_mut(
            &mut image,
            Rect::at(rect.min.x as i32, rect.min.y as i32)
                .of_size(rect.width() + 1, rect.height() + 1),
            Rgb([255, 0, 0]),
        );
    }
    let name = query.file_name().unwrap_or_else(|| "query.png".as_ref());
    image.save(dir.join(name))
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    let detector = match load_config(&opt).and_then(|config| FeatureMatchDetector::new(&config)) {
        Ok(detector) => detector,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = &opt.annotate {
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("unable to create {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }
    let mut failures = 0;
    for query in &opt.queries {
        let detections = match detector.detect_path(query) {
            Ok(detections) => detections,
            Err(e) => {
                error!("{}: {}", query.display(), e);
                failures += 1;
                continue;
            }
        };
        match serde_json::to_string(&Report {
            image: query,
            detections: &detections,
        }) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("unable to serialize result for {}: {}", query.display(), e),
        }
        if let Some(dir) = &opt.annotate {
            if let Err(e) = annotate(query, &detections, dir) {
                error!("unable to annotate {}: {}", query.display(), e);
            }
        }
    }
    info!(
        "Processed {} images, {} failed",
        opt.queries.len(),
        failures
    );
    if failures > 0 {
        std::process::exit(2);
    }
}
