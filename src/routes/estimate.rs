use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::State;

use super::{load_session, ApiError};
use crate::estimate::{estimate, EstimationInput, EstimationResult};
use crate::session::Store;

#[derive(Serialize)]
pub struct EstimateReport {
    pub headline: String,
    pub breakdown: Vec<String>,
    #[serde(flatten)]
    pub result: EstimationResult,
}

impl From<EstimationResult> for EstimateReport {
    fn from(result: EstimationResult) -> Self {
        EstimateReport {
            headline: result.headline(),
            breakdown: result.breakdown(),
            result,
        }
    }
}

/// Estimates from whatever the session has collected so far.
#[post("/session/<id>/estimate")]
pub async fn estimate_session(
    id: &str,
    store: &State<Store>,
) -> Result<Json<EstimateReport>, ApiError> {
    let session = load_session(store, id).await?;
    let result = estimate(&session.estimation_input()).map_err(|e| {
        log::info!("session {} estimate rejected: {}", id, e);
        e
    })?;
    log::info!("session {} estimated {:.1} km/h", id, result.speed_kmh);
    Ok(Json(result.into()))
}

/// Stateless variant for callers that already hold both lines.
#[post("/estimate", format = "json", data = "<input>")]
pub fn estimate_direct(input: Json<EstimationInput>) -> Result<Json<EstimateReport>, ApiError> {
    let result = estimate(&input)?;
    Ok(Json(result.into()))
}
