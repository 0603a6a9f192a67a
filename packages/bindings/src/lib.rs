use napi::Result as NapiResult;
use napi_derive::napi;
use serde_json::json;

use finmodel_core::three_statement::{
    build_three_statement_model, ProjectionRequest, ValidatedAssumptions,
};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse_request(input_json: &str) -> NapiResult<ProjectionRequest> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Three-statement projection
// ---------------------------------------------------------------------------

/// Run a full projection. Input is a `{ assumptions, config? }` request;
/// output is the result envelope with every schedule and the summary.
#[napi]
pub fn project_financials(input_json: String) -> NapiResult<String> {
    let request = parse_request(&input_json)?;
    let output = build_three_statement_model(&request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Check a request's assumptions without projecting.
#[napi]
pub fn validate_assumptions(input_json: String) -> NapiResult<String> {
    let request = parse_request(&input_json)?;
    let years = request.assumptions.projection_years;
    let validated =
        ValidatedAssumptions::new(request.assumptions, &request.config).map_err(to_napi_error)?;
    serde_json::to_string(&json!({
        "valid": true,
        "projection_years": years,
        "opening_revolver": validated.opening_revolver(),
    }))
    .map_err(to_napi_error)
}
