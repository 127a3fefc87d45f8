//! Request Types - What a caller asks the worker to analyze

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Material thickness assumed for 2D drawings when the caller gives none (mm)
pub const DEFAULT_MATERIAL_THICKNESS: f64 = 3.0;

/// Input file formats accepted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Stl,
    Step,
    Stp,
    Iges,
    Igs,
    Dxf,
}

impl FileType {
    pub const ALL: &'static [FileType] = &[
        FileType::Stl,
        FileType::Step,
        FileType::Stp,
        FileType::Iges,
        FileType::Igs,
        FileType::Dxf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Stl => "stl",
            FileType::Step => "step",
            FileType::Stp => "stp",
            FileType::Iges => "iges",
            FileType::Igs => "igs",
            FileType::Dxf => "dxf",
        }
    }

    /// Which analysis family handles this format
    pub fn family(&self) -> GeometryFamily {
        match self {
            FileType::Stl => GeometryFamily::Mesh,
            FileType::Step | FileType::Stp | FileType::Iges | FileType::Igs => GeometryFamily::Solid,
            FileType::Dxf => GeometryFamily::Drawing,
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("Unsupported file type: {}", s))
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manufacturing processes with a DFM rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    #[serde(rename = "3d_fff")]
    Fff,
    #[serde(rename = "3d_sla")]
    Sla,
    #[serde(rename = "cnc_3axis")]
    Cnc3Axis,
    #[serde(rename = "laser_2d")]
    Laser2d,
}

impl ProcessType {
    pub const ALL: &'static [ProcessType] = &[
        ProcessType::Fff,
        ProcessType::Sla,
        ProcessType::Cnc3Axis,
        ProcessType::Laser2d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Fff => "3d_fff",
            ProcessType::Sla => "3d_sla",
            ProcessType::Cnc3Axis => "cnc_3axis",
            ProcessType::Laser2d => "laser_2d",
        }
    }

    /// Layer-based processes where overhangs need support
    pub fn is_additive(&self) -> bool {
        matches!(self, ProcessType::Fff | ProcessType::Sla)
    }
}

impl FromStr for ProcessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessType::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("Unsupported process type: {}", s))
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three input families, each with its own metric shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryFamily {
    Mesh,
    Solid,
    Drawing,
}

/// Recognized request options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Sheet thickness for 2D drawings (mm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_thickness: Option<f64>,
}

/// One analysis invocation as received from a caller.
///
/// `file_type` and `process_type` stay as raw strings so that unknown
/// values surface as `UnsupportedInput` instead of a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub file_url: String,
    pub file_type: String,
    pub process_type: String,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl AnalysisRequest {
    pub fn new(file_url: impl Into<String>, file_type: FileType, process_type: ProcessType) -> Self {
        Self {
            file_url: file_url.into(),
            file_type: file_type.as_str().to_string(),
            process_type: process_type.as_str().to_string(),
            options: AnalysisOptions::default(),
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_material_thickness(mut self, thickness: f64) -> Self {
        self.options.material_thickness = Some(thickness);
        self
    }

    /// Parse both type strings; the error message is client-facing.
    pub fn parse_types(&self) -> Result<(FileType, ProcessType), String> {
        let file_type = self.file_type.parse::<FileType>()?;
        let process_type = self.process_type.parse::<ProcessType>()?;
        Ok((file_type, process_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_families() {
        assert_eq!(FileType::Stl.family(), GeometryFamily::Mesh);
        assert_eq!(FileType::Stp.family(), GeometryFamily::Solid);
        assert_eq!(FileType::Igs.family(), GeometryFamily::Solid);
        assert_eq!(FileType::Dxf.family(), GeometryFamily::Drawing);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("STEP".parse::<FileType>().unwrap(), FileType::Step);
        assert_eq!("CNC_3AXIS".parse::<ProcessType>().unwrap(), ProcessType::Cnc3Axis);
    }

    #[test]
    fn test_unknown_types_rejected() {
        let err = "obj".parse::<FileType>().unwrap_err();
        assert!(err.contains("Unsupported file type"));
        assert!("waterjet".parse::<ProcessType>().is_err());
    }

    #[test]
    fn test_request_decodes_with_defaults() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"file_url": "s3://b/k.dxf", "file_type": "dxf", "process_type": "laser_2d"}"#,
        )
        .unwrap();
        assert!(request.job_id.is_none());
        assert!(request.options.material_thickness.is_none());
        assert_eq!(
            request.parse_types().unwrap(),
            (FileType::Dxf, ProcessType::Laser2d)
        );
    }

    #[test]
    fn test_process_serde_names() {
        let json = serde_json::to_string(&ProcessType::Fff).unwrap();
        assert_eq!(json, r#""3d_fff""#);
    }
}
