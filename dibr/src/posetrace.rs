//! Pose trace: a per-frame list of pose deltas applied to the virtual
//! camera's nominal pose.
//!
//! Parses a whitespace-tolerant CSV with header `X,Y,Z,Yaw,Pitch,Roll`
//! via the `csv` crate, since this is tabular data and `csv` is the
//! idiomatic ecosystem choice for it.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::geometry::{Mat3, Pose, Vec3};

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "X")]
    x: f32,
    #[serde(rename = "Y")]
    y: f32,
    #[serde(rename = "Z")]
    z: f32,
    #[serde(rename = "Yaw")]
    yaw: f32,
    #[serde(rename = "Pitch")]
    pitch: f32,
    #[serde(rename = "Roll")]
    roll: f32,
}

/// An ordered sequence of poses, one per frame offset from `StartFrame`.
#[derive(Clone, Debug, Default)]
pub struct PoseTrace(pub Vec<Pose>);

impl PoseTrace {
    pub fn load_from(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let expected = ["X", "Y", "Z", "Yaw", "Pitch", "Roll"];
        if headers.iter().collect::<Vec<_>>() != expected {
            return Err(Error::config(format!(
                "pose trace header mismatch: expected {expected:?}, got {headers:?}"
            )));
        }

        let mut poses = Vec::new();
        for result in rdr.deserialize() {
            let row: Row = result?;
            let rotation = Mat3::from_euler_zyx(
                row.yaw.to_radians(),
                row.pitch.to_radians(),
                row.roll.to_radians(),
            );
            poses.push(Pose {
                rotation,
                translation: Vec3::new(row.x, row.y, row.z),
            });
        }

        Ok(PoseTrace(poses))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(Error::io_ctx(format!("opening pose trace {path:?}")))?;
        Self::load_from(file)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, frame: usize) -> Option<Pose> {
        self.0.get(frame).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let csv_text = "X,Y,Z,Yaw,Pitch,Roll\n0.1,0.2,0.3,10,0,0\n0.2,0.3,0.4,20,0,0\n\n";
        let trace = PoseTrace::load_from(csv_text.as_bytes()).unwrap();
        assert_eq!(trace.len(), 2);
        assert!((trace.0[0].translation.x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_header() {
        let csv_text = "A,B,C,D,E,F\n1,2,3,4,5,6\n";
        assert!(PoseTrace::load_from(csv_text.as_bytes()).is_err());
    }
}
