//! Configuration: the JSON document describing a synthesis run plus
//! the camera-parameter-file documents it references.
//!
//! Deserialization uses `serde_json` throughout; see DESIGN.md for why
//! JSON rather than a different serialization format.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::camera::equirect::Equirect;
use crate::camera::perspective::Perspective;
use crate::camera::{CameraParams, Projection};
use crate::colorspace::ColorSpace;
use crate::error::{Error, Result};
use crate::geometry::{Mat3, Pose, Vec3};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BlendingMethod {
    Simple,
    MultiSpectral,
}

impl Default for BlendingMethod {
    fn default() -> Self {
        BlendingMethod::Simple
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "InputCameraNames")]
    input_camera_names: Vec<String>,
    #[serde(rename = "VirtualCameraNames")]
    virtual_camera_names: Vec<String>,
    #[serde(rename = "InputCameraParameterFile")]
    input_camera_parameter_file: PathBuf,
    #[serde(rename = "VirtualCameraParameterFile")]
    virtual_camera_parameter_file: PathBuf,
    #[serde(rename = "ViewImageNames", default)]
    view_image_names: Vec<PathBuf>,
    #[serde(rename = "DepthMapNames", default)]
    depth_map_names: Vec<PathBuf>,
    #[serde(rename = "OutputFiles", default)]
    output_files: Vec<Option<PathBuf>>,
    #[serde(rename = "MaskedOutputFiles", default)]
    masked_output_files: Vec<Option<PathBuf>>,
    #[serde(rename = "OutputMasks", default)]
    output_masks: Vec<Option<PathBuf>>,
    #[serde(rename = "DepthOutputFiles", default)]
    depth_output_files: Vec<Option<PathBuf>>,
    #[serde(rename = "ValidityThreshold")]
    validity_threshold: Option<f32>,
    #[serde(rename = "BlendingMethod", default)]
    blending_method: BlendingMethod,
    #[serde(rename = "BlendingFactor", default = "default_blending_factor")]
    blending_factor: f32,
    #[serde(rename = "BlendingLowFreqFactor")]
    blending_low_freq_factor: Option<f32>,
    #[serde(rename = "BlendingHighFreqFactor")]
    blending_high_freq_factor: Option<f32>,
    #[serde(rename = "StartFrame", default)]
    start_frame: u32,
    #[serde(rename = "NumberOfFrames", default = "default_number_of_frames")]
    number_of_frames: u32,
    #[serde(rename = "Precision", default = "default_precision")]
    precision: f32,
    #[serde(rename = "ColorSpace", default)]
    color_space: ColorSpace,
    #[serde(rename = "VirtualPoseTraceName")]
    virtual_pose_trace_name: Option<PathBuf>,
}

fn default_blending_factor() -> f32 {
    1.0
}
fn default_number_of_frames() -> u32 {
    1
}
fn default_precision() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct RawCameraFile {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "cameras")]
    cameras: Vec<RawCameraRecord>,
}

#[derive(Debug, Deserialize)]
struct RawCameraRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Projection")]
    projection: String,
    #[serde(rename = "Position")]
    position: [f32; 3],
    #[serde(rename = "Rotation")]
    rotation: [f32; 3],
    #[serde(rename = "Depth_range")]
    depth_range: [f32; 2],
    #[serde(rename = "Resolution")]
    resolution: [u32; 2],
    #[serde(rename = "Focal")]
    focal: Option<[f32; 2]>,
    #[serde(rename = "Principle_point")]
    principle_point: Option<[f32; 2]>,
    #[serde(rename = "Hor_range")]
    hor_range: Option<[f32; 2]>,
    #[serde(rename = "Ver_range")]
    ver_range: Option<[f32; 2]>,
    #[serde(rename = "BitDepthColor", default = "default_bit_depth")]
    #[allow(dead_code)]
    bit_depth_color: u32,
    #[serde(rename = "BitDepthDepth", default = "default_bit_depth")]
    #[allow(dead_code)]
    bit_depth_depth: u32,
}

fn default_bit_depth() -> u32 {
    8
}

/// A fully validated, ready-to-run configuration.
#[derive(Debug)]
pub struct Config {
    pub input_cameras: Vec<CameraParams>,
    pub virtual_cameras: Vec<CameraParams>,
    pub view_image_names: Vec<PathBuf>,
    pub depth_map_names: Vec<PathBuf>,
    pub output_files: Vec<Option<PathBuf>>,
    pub masked_output_files: Vec<Option<PathBuf>>,
    pub output_masks: Vec<Option<PathBuf>>,
    pub depth_output_files: Vec<Option<PathBuf>>,
    pub validity_threshold: Option<f32>,
    pub blending_method: BlendingMethod,
    pub blending_factor: f32,
    pub blending_low_freq_factor: Option<f32>,
    pub blending_high_freq_factor: Option<f32>,
    pub start_frame: u32,
    pub number_of_frames: u32,
    pub precision: f32,
    pub color_space: ColorSpace,
    pub pose_trace: Option<crate::posetrace::PoseTrace>,
}

impl Config {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let text = read_to_string_checked(path)?;
        let raw: RawConfig = serde_json::from_str(&text)?;
        Self::build(raw, base)
    }

    fn build(raw: RawConfig, base: &Path) -> Result<Self> {
        if !raw.version.starts_with("2.") {
            return Err(Error::config(format!(
                "unsupported config version {:?}, expected a \"2.x\" version",
                raw.version
            )));
        }

        let input_cameras = load_camera_file(&base.join(&raw.input_camera_parameter_file), &raw.input_camera_names)?;
        let virtual_cameras =
            load_camera_file(&base.join(&raw.virtual_camera_parameter_file), &raw.virtual_camera_names)?;

        check_len("ViewImageNames", raw.input_camera_names.len(), raw.view_image_names.len())?;
        check_len("DepthMapNames", raw.input_camera_names.len(), raw.depth_map_names.len())?;

        if raw.blending_method == BlendingMethod::MultiSpectral {
            if raw.blending_low_freq_factor.is_none() || raw.blending_high_freq_factor.is_none() {
                return Err(Error::config(
                    "BlendingLowFreqFactor and BlendingHighFreqFactor are required when BlendingMethod is MultiSpectral",
                ));
            }
        }

        let pose_trace = raw
            .virtual_pose_trace_name
            .as_ref()
            .map(|p| crate::posetrace::PoseTrace::load_from_file(base.join(p)))
            .transpose()?;

        if let Some(trace) = &pose_trace {
            if (trace.len() as u32) < raw.number_of_frames {
                return Err(Error::config(format!(
                    "pose trace has {} entries, fewer than NumberOfFrames ({})",
                    trace.len(),
                    raw.number_of_frames
                )));
            }
        }

        Ok(Config {
            input_cameras,
            virtual_cameras,
            view_image_names: raw.view_image_names.into_iter().map(|p| base.join(p)).collect(),
            depth_map_names: raw.depth_map_names.into_iter().map(|p| base.join(p)).collect(),
            output_files: resolve_optional_paths(base, raw.output_files),
            masked_output_files: resolve_optional_paths(base, raw.masked_output_files),
            output_masks: resolve_optional_paths(base, raw.output_masks),
            depth_output_files: resolve_optional_paths(base, raw.depth_output_files),
            validity_threshold: raw.validity_threshold,
            blending_method: raw.blending_method,
            blending_factor: raw.blending_factor,
            blending_low_freq_factor: raw.blending_low_freq_factor,
            blending_high_freq_factor: raw.blending_high_freq_factor,
            start_frame: raw.start_frame,
            number_of_frames: raw.number_of_frames,
            precision: raw.precision,
            color_space: raw.color_space,
            pose_trace,
        })
    }
}

fn resolve_optional_paths(base: &Path, paths: Vec<Option<PathBuf>>) -> Vec<Option<PathBuf>> {
    paths.into_iter().map(|p| p.map(|p| base.join(p))).collect()
}

fn check_len(what: &str, expected: usize, got: usize) -> Result<()> {
    if got != 0 && got != expected {
        return Err(Error::mismatched_len(what, expected, got));
    }
    Ok(())
}

fn read_to_string_checked(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::file_not_found(&path.to_path_buf())
        } else {
            Error::IoWhen(err, format!("opening {path:?}"))
        }
    })
}

fn load_camera_file(path: &Path, wanted_names: &[String]) -> Result<Vec<CameraParams>> {
    let text = read_to_string_checked(path)?;
    let raw: RawCameraFile = serde_json::from_str(&text)?;
    if !raw.version.starts_with("2.") {
        return Err(Error::config(format!(
            "unsupported camera file version {:?} in {path:?}",
            raw.version
        )));
    }

    let mut out = Vec::with_capacity(wanted_names.len());
    for name in wanted_names {
        let record = raw
            .cameras
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| Error::config(format!("camera {name:?} not found in {path:?}")))?;
        out.push(build_camera(record)?);
    }
    Ok(out)
}

fn build_camera(record: &RawCameraRecord) -> Result<CameraParams> {
    let [x, y, z] = record.position;
    let [yaw_deg, pitch_deg, roll_deg] = record.rotation;
    let pose = Pose {
        rotation: Mat3::from_euler_zyx(yaw_deg.to_radians(), pitch_deg.to_radians(), roll_deg.to_radians()),
        translation: Vec3::new(x, y, z),
    };

    let [width, height] = record.resolution;
    let [z_near, z_far] = record.depth_range;
    if !(z_near > 0.0 && z_far > z_near) {
        return Err(Error::Geometry(format!(
            "camera {:?} has invalid depth range {:?}",
            record.name, record.depth_range
        )));
    }

    let projection = match record.projection.as_str() {
        "Perspective" => {
            let (focal, pp) = match (record.focal, record.principle_point) {
                (Some(f), Some(p)) => (f, p),
                _ => {
                    return Err(Error::missing_key("Focal/Principle_point")
                        .context(format!("perspective camera {:?}", record.name)))
                }
            };
            if !(focal[0] > 0.0 && focal[1] > 0.0) {
                return Err(Error::Geometry(format!("camera {:?} has non-positive focal length", record.name)));
            }
            Projection::Perspective(Perspective::new(focal[0], focal[1], pp[0], pp[1]))
        }
        "Equirectangular" => {
            let (hor, ver) = match (record.hor_range, record.ver_range) {
                (Some(h), Some(v)) => (h, v),
                _ => {
                    return Err(Error::missing_key("Hor_range/Ver_range")
                        .context(format!("equirectangular camera {:?}", record.name)))
                }
            };
            Projection::Equirect(Equirect::new(
                width as usize,
                height as usize,
                (hor[0].to_radians(), hor[1].to_radians()),
                (ver[0].to_radians(), ver[1].to_radians()),
            ))
        }
        other => return Err(Error::Geometry(format!("unknown projection kind {other:?}"))),
    };

    Ok(CameraParams {
        name: record.name.clone(),
        pose,
        width: width as usize,
        height: height as usize,
        z_near,
        z_far,
        projection,
    })
}
