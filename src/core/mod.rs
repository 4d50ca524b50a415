pub mod fields;
pub mod labeling;
pub mod matching;
pub mod prebuilt;
pub mod render;

pub use crate::domain::model::{AnalysisRequest, AnalysisResult, LabelRecord, ModelKind};
pub use crate::domain::ports::{Analyzer, ConfigProvider, Storage};
pub use crate::utils::error::Result;
