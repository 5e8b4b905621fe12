use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable machine-readable error codes exposed on the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParameters,
    ParameterOutOfRange,
    UnsupportedMaterial,
    DimensionOutOfRange,
    PricingCalculationFailed,
    ServiceUnavailable,
    CacheUnavailable,
    InternalServerError,
}

impl ErrorCode {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorCode::InvalidParameters => "INVALID_PARAMETERS",
            ErrorCode::ParameterOutOfRange => "PARAMETER_OUT_OF_RANGE",
            ErrorCode::UnsupportedMaterial => "UNSUPPORTED_MATERIAL",
            ErrorCode::DimensionOutOfRange => "DIMENSION_OUT_OF_RANGE",
            ErrorCode::PricingCalculationFailed => "PRICING_CALCULATION_FAILED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::CacheUnavailable => "CACHE_UNAVAILABLE",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameters
            | ErrorCode::ParameterOutOfRange
            | ErrorCode::UnsupportedMaterial
            | ErrorCode::DimensionOutOfRange
            | ErrorCode::PricingCalculationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::ServiceUnavailable | ErrorCode::CacheUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A board dimension outside the manufacturable envelope. Carries enough
/// structure for the client to render a precise message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{dimension} must be between {min}{unit} and {max}{unit}, got {value}{unit}")]
pub struct DimensionValidationError {
    pub dimension: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl DimensionValidationError {
    pub fn new(dimension: &'static str, value: f64, min: f64, max: f64, unit: &'static str) -> Self {
        Self {
            dimension,
            value,
            min,
            max,
            unit,
        }
    }

    pub fn suggested_action(&self) -> String {
        format!(
            "Adjust {} to a value between {}{} and {}{}",
            self.dimension, self.min, self.unit, self.max, self.unit
        )
    }
}

/// Structured pricing error carrying a code, a human message and a context
/// object for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PricingError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Value,
    pub suggested_action: Option<String>,
}

impl PricingError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Value::Null,
            suggested_action: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_suggested_action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameters, message)
    }

    pub fn calculation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PricingCalculationFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }
}

impl From<DimensionValidationError> for PricingError {
    fn from(err: DimensionValidationError) -> Self {
        let action = err.suggested_action();
        PricingError::new(ErrorCode::DimensionOutOfRange, err.to_string())
            .with_context(json!({
                "dimension": err.dimension,
                "provided_value": err.value,
                "min": err.min,
                "max": err.max,
                "unit": err.unit,
            }))
            .with_suggested_action(action)
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "code": self.code.label(),
                "message": self.message,
                "context": self.context,
            }
        });
        if let Some(action) = self.suggested_action {
            body["error"]["suggested_action"] = Value::String(action);
        }
        (self.code.status(), Json(body)).into_response()
    }
}

/// Internal calculation failures. Never reach the API directly; the engine
/// converts them into a fallback quote or a `PricingError`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    #[error("board area must be positive, got {area_cm2}cm²")]
    NonPositiveArea { area_cm2: f64 },
    #[error("board {width_cm}x{height_cm}cm exceeds the maximum panel of {max_width_cm}x{max_height_cm}cm")]
    OversizedPanel {
        width_cm: f64,
        height_cm: f64,
        max_width_cm: f64,
        max_height_cm: f64,
    },
    #[error("computed price is not a finite number")]
    NonFinitePrice,
}

impl From<CalculationError> for PricingError {
    fn from(err: CalculationError) -> Self {
        PricingError::calculation_failed(err.to_string())
    }
}
