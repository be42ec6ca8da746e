//! Error types for simulation and device operations.

use forcetex_core::ConfigError;
use thiserror::Error;

use crate::device::ImageId;

/// Errors that can occur while building or running a simulation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to initialize the device.
    #[error("device initialization failed: {0}")]
    Device(String),

    /// Failed to create an image or program.
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// A pass could not be executed.
    #[error("pass execution failed: {0}")]
    PassExecution(String),

    /// Failed to read an image back to the host.
    #[error("readback failed: {0}")]
    Readback(String),

    /// A pass tried to write an image it also reads.
    #[error("pass `{pass}` writes {image} which it also reads")]
    AliasedTarget { pass: &'static str, image: ImageId },

    /// An image id that was never created or has been destroyed.
    #[error("unknown image {0}")]
    UnknownImage(ImageId),

    /// The dataset does not fit the device's largest square image.
    #[error("{what} need a {side}x{side} image but the device supports at most {max}x{max}")]
    Capacity {
        what: &'static str,
        side: u32,
        max: u32,
    },

    /// Configuration rejected.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
