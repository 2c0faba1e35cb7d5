//! Component error types

use omnicloud_cloud::CloudError;
use omnicloud_config::ConfigError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("Invalid stack configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph construction failed: {0}")]
    Construction(#[from] CloudError),

    #[error("Output '{output}' failed: {error}")]
    Output {
        output: String,
        error: Arc<CloudError>,
    },
}

impl ComponentError {
    /// The underlying engine error, if any
    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            ComponentError::Construction(error) => Some(error),
            ComponentError::Output { error, .. } => Some(error),
            ComponentError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ComponentError>;
