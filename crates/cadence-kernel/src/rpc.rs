//! Metrics query surface.
//!
//! The serving façade (HTTP, CLI, whatever the node mounts) lives outside
//! the kernel; this module defines the callable request/reply surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::service::Kernel;

/// Request for a metrics snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct GetMetricsRequest {
    /// Snapshot format: `"text"` or `"json"`.
    pub format: String,
}

/// A rendered metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GetMetricsReply {
    /// The snapshot in the requested format.
    pub metrics: String,
}

/// Render a metrics snapshot. Errors on an unknown format or when no
/// kernel has been initialized.
pub fn get_metrics(
    kernel: Option<&Arc<Kernel>>,
    request: &GetMetricsRequest,
) -> Result<GetMetricsReply> {
    let kernel = kernel.ok_or(KernelError::NotInitialized)?;
    let metrics = match request.format.as_str() {
        "text" => kernel.metrics_text(),
        "json" => kernel.metrics_json()?,
        other => return Err(KernelError::UnknownMetricsFormat(other.to_string())),
    };
    Ok(GetMetricsReply { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_kernel_is_an_error() {
        let request = GetMetricsRequest {
            format: "text".to_string(),
        };
        let err = get_metrics(None, &request).unwrap_err();
        assert_eq!(err.to_string(), "kernel not initialized");
    }

    #[test]
    fn test_request_deserializes() {
        let request: GetMetricsRequest = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(request.format, "json");
    }
}
