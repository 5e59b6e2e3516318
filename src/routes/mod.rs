pub mod estimate;
pub mod session;

use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::Route;
use serde::Deserialize;

use crate::canvas::CanvasError;
use crate::estimate::EstimationError;
use crate::image_upload::ImageError;
use crate::session::{Session, Store, StoreError};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    fn new(error: &str, message: impl ToString) -> Json<ErrorBody> {
        Json(ErrorBody {
            error: error.to_string(),
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Responder)]
pub enum ApiError {
    #[response(status = 400)]
    BadRequest(Json<ErrorBody>),
    #[response(status = 404)]
    NotFound(Json<ErrorBody>),
    #[response(status = 413)]
    TooLarge(Json<ErrorBody>),
    #[response(status = 415)]
    Unsupported(Json<ErrorBody>),
    #[response(status = 422)]
    Invalid(Json<ErrorBody>),
    #[response(status = 500)]
    Internal(Json<ErrorBody>),
}

impl ApiError {
    pub fn no_session(id: &str) -> ApiError {
        ApiError::NotFound(ErrorBody::new(
            "unknown_session",
            format!("no session with id {}", id),
        ))
    }
}

impl From<EstimationError> for ApiError {
    fn from(e: EstimationError) -> Self {
        ApiError::Invalid(ErrorBody::new(e.kind(), e))
    }
}

impl From<CanvasError> for ApiError {
    fn from(e: CanvasError) -> Self {
        ApiError::BadRequest(ErrorBody::new("bad_canvas", e))
    }
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::TooLarge(_) => ApiError::TooLarge(ErrorBody::new("too_large", e)),
            ImageError::Unsupported => ApiError::Unsupported(ErrorBody::new("unsupported", e)),
            ImageError::Empty | ImageError::Decode(_) => {
                ApiError::BadRequest(ErrorBody::new("bad_image", e))
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        log::error!("{}", e);
        ApiError::Internal(ErrorBody::new("store", e))
    }
}

pub(crate) async fn load_session(store: &Store, id: &str) -> Result<Session, ApiError> {
    store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::no_session(id))
}

#[get("/")]
fn index() -> RawHtml<&'static str> {
    RawHtml(include_str!("../../static/index.html"))
}

#[get("/health")]
fn health() -> &'static str {
    "ok"
}

pub fn all() -> Vec<Route> {
    routes![
        index,
        health,
        session::new_session,
        session::get_session,
        session::delete_session,
        session::upload_image,
        session::get_image,
        session::put_line,
        session::put_inputs,
        estimate::estimate_session,
        estimate::estimate_direct,
    ]
}
