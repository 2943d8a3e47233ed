use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context as AnyhowContext, Result};
use log::warn;
use serde::Deserialize;

use crate::my_types::*;
use crate::pipeline::Detection;

/// Detections of one video frame
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFrame {
    pub frame_index: usize,
    pub detections: Vec<Detection>,
}

#[derive(Deserialize)]
struct FrameRecord {
    frame: usize,
    #[serde(default)]
    detections: Vec<DetectionRecord>,
}

#[derive(Deserialize)]
struct DetectionRecord {
    /// x1, y1, x2, y2
    bbox: [f64; 4],
    #[serde(default)]
    id: Option<u64>,
    #[serde(rename = "class", default)]
    class_label: u32,
    #[serde(default)]
    confidence: f32,
}

impl From<FrameRecord> for DetectionFrame {
    fn from(record: FrameRecord) -> Self {
        DetectionFrame {
            frame_index: record.frame,
            detections: record
                .detections
                .into_iter()
                .map(|d| {
                    let [x1, y1, x2, y2] = d.bbox;
                    Detection {
                        bbox: BoundingBox::new(x1, y1, x2, y2),
                        track_id: d.id,
                        class_label: d.class_label,
                        confidence: d.confidence,
                    }
                })
                .collect(),
        }
    }
}

/// Recorded detector output, one JSON object per line:
///
/// `{"frame": 12, "detections": [{"bbox": [x1, y1, x2, y2], "id": 3, "class": 2, "confidence": 0.9}]}`
pub struct DetectionDataset<R> {
    reader: R,
    line: String,
    line_number: usize,
    /// number of lines, for progress reporting
    pub length: u64,
}

impl DetectionDataset<BufReader<File>> {
    pub fn new(path: &Path) -> Result<Self> {
        let open = || File::open(path).with_context(|| format!("failed to open {}", path.display()));
        let length = BufReader::new(open()?).lines().count() as u64;
        Ok(Self::from_reader(BufReader::new(open()?), length))
    }
}

impl<R: BufRead> DetectionDataset<R> {
    pub fn from_reader(reader: R, length: u64) -> Self {
        DetectionDataset {
            reader,
            line: String::new(),
            line_number: 0,
            length,
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Err(err) => bail!("Failed to read line {}: {}", self.line_number + 1, err),
                _ => {}
            }
            self.line_number += 1;
            if self.line.trim().is_empty() {
                continue;
            }

            let value: serde_json::Value = serde_json::from_str(&self.line)
                .with_context(|| format!("JSON deserialization failed for line {}", self.line_number))?;
            if value.get("frame").is_none() {
                warn!("Unrecognised data format {}", self.line.trim_end());
                continue;
            }
            let record: FrameRecord = serde_json::from_value(value)
                .with_context(|| format!("Malformed frame record on line {}", self.line_number))?;
            return Ok(Some(record.into()));
        }
    }
}
