use rocket::data::{Data, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::State;
use uuid::Uuid;

use super::{load_session, ApiError, ErrorBody};
use crate::canvas;
use crate::config::Settings;
use crate::estimate::LineSegment;
use crate::image_upload::{ImageError, ImageInfo, UploadedImage};
use crate::session::{LineKind, Session, SessionInputs, Store};

#[derive(Serialize)]
pub struct SessionView {
    pub image: Option<ImageInfo>,
    #[serde(rename = "calibrationLine")]
    pub calibration_line: Option<LineSegment>,
    #[serde(rename = "blurLine")]
    pub blur_line: Option<LineSegment>,
    pub inputs: SessionInputs,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        SessionView {
            image: s.image.map(|i| i.info),
            calibration_line: s.calibration_line,
            blur_line: s.blur_line,
            inputs: s.inputs,
        }
    }
}

#[derive(Serialize)]
pub struct LineReport {
    pub line: Option<LineSegment>,
    #[serde(rename = "pixelLength")]
    pub pixel_length: Option<f64>,
}

#[post("/session")]
pub async fn new_session(store: &State<Store>) -> Result<(Status, String), ApiError> {
    let id = format!("{}", Uuid::new_v4());
    store.put(&id, Session::default()).await?;
    log::info!("created session {}", id);
    Ok((Status::Created, id))
}

#[get("/session/<id>")]
pub async fn get_session(id: &str, store: &State<Store>) -> Result<Json<SessionView>, ApiError> {
    let session = load_session(store, id).await?;
    Ok(Json(session.into()))
}

#[delete("/session/<id>")]
pub async fn delete_session(id: &str, store: &State<Store>) -> Result<Status, ApiError> {
    if store.remove(id).await? {
        Ok(Status::NoContent)
    } else {
        Err(ApiError::no_session(id))
    }
}

/// Replaces the backdrop image. Lines drawn over the previous image no longer
/// mean anything, so they are cleared.
#[put("/session/<id>/image", data = "<data>")]
pub async fn upload_image(
    id: &str,
    data: Data<'_>,
    store: &State<Store>,
    settings: &State<Settings>,
) -> Result<Json<ImageInfo>, ApiError> {
    // fail on an unknown session before reading the body
    load_session(store, id).await?;

    let upload = data
        .open(settings.max_upload_mib.mebibytes())
        .into_bytes()
        .await
        .map_err(|e| ApiError::BadRequest(ErrorBody::new("bad_image", e)))?;
    if !upload.is_complete() {
        return Err(ImageError::TooLarge(settings.max_upload_mib).into());
    }
    let image = UploadedImage::decode(upload.into_inner())?;
    let info = image.info;

    let replaced = store
        .update(
            id,
            Box::new(move |s: &mut Session| {
                s.image = Some(image.clone());
                s.calibration_line = None;
                s.blur_line = None;
            }),
        )
        .await?;
    if !replaced {
        return Err(ApiError::no_session(id));
    }
    log::info!(
        "session {} uploaded {}x{} image",
        id,
        info.width,
        info.height
    );
    Ok(Json(info))
}

#[get("/session/<id>/image")]
pub async fn get_image(
    id: &str,
    store: &State<Store>,
) -> Result<(ContentType, Vec<u8>), ApiError> {
    let session = load_session(store, id).await?;
    match session.image {
        Some(image) => Ok((image.info.format.content_type(), image.bytes.to_vec())),
        None => Err(ApiError::NotFound(ErrorBody::new(
            "no_image",
            format!("session {} has no image yet", id),
        ))),
    }
}

/// Takes the canvas document for one of the two drawing surfaces and keeps
/// its most recent line.
#[put("/session/<id>/lines/<kind>", data = "<document>")]
pub async fn put_line(
    id: &str,
    kind: LineKind,
    document: &str,
    store: &State<Store>,
) -> Result<Json<LineReport>, ApiError> {
    let line = canvas::last_line(document)?;
    if !store
        .update(id, Box::new(move |s: &mut Session| s.set_line(kind, line)))
        .await?
    {
        return Err(ApiError::no_session(id));
    }
    log::debug!("session {} {:?} line set to {:?}", id, kind, line);
    Ok(Json(LineReport {
        line,
        pixel_length: line.map(|l| l.pixel_length()),
    }))
}

#[put("/session/<id>/inputs", format = "json", data = "<inputs>")]
pub async fn put_inputs(
    id: &str,
    inputs: Json<SessionInputs>,
    store: &State<Store>,
) -> Result<Json<SessionInputs>, ApiError> {
    let inputs = inputs.into_inner().validate()?;
    if !store
        .update(id, Box::new(move |s: &mut Session| s.inputs = inputs))
        .await?
    {
        return Err(ApiError::no_session(id));
    }
    Ok(Json(inputs))
}
