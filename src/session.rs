use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rocket::request::FromParam;
use rocket::serde::Serialize;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::constants::{
    DEFAULT_CALIBRATION_LENGTH_M, DEFAULT_SHUTTER_S, MIN_CALIBRATION_LENGTH_M, MIN_SHUTTER_S,
};
use crate::estimate::{EstimationError, EstimationInput, LineSegment};
use crate::image_upload::UploadedImage;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Calibration,
    Blur,
}

impl<'a> FromParam<'a> for LineKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "calibration" => Ok(LineKind::Calibration),
            "blur" => Ok(LineKind::Blur),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionInputs {
    #[serde(rename = "calibrationLengthM")]
    pub calibration_length_m: f64,
    #[serde(rename = "shutterS")]
    pub shutter_s: f64,
}

impl Default for SessionInputs {
    fn default() -> Self {
        SessionInputs {
            calibration_length_m: DEFAULT_CALIBRATION_LENGTH_M,
            shutter_s: DEFAULT_SHUTTER_S,
        }
    }
}

impl SessionInputs {
    /// Applies the same minimums the input form enforces.
    pub fn validate(self) -> Result<SessionInputs, EstimationError> {
        at_least("calibration length", self.calibration_length_m, MIN_CALIBRATION_LENGTH_M)?;
        at_least("shutter speed", self.shutter_s, MIN_SHUTTER_S)?;
        Ok(self)
    }
}

fn at_least(field: &'static str, value: f64, min: f64) -> Result<(), EstimationError> {
    if value.is_finite() && value >= min {
        Ok(())
    } else {
        Err(EstimationError::InvalidParameter { field, value })
    }
}

/// Everything one user has entered so far. Owned by the store, never shared
/// between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip)]
    pub image: Option<UploadedImage>,
    #[serde(rename = "calibrationLine")]
    pub calibration_line: Option<LineSegment>,
    #[serde(rename = "blurLine")]
    pub blur_line: Option<LineSegment>,
    pub inputs: SessionInputs,
}

impl Session {
    pub fn set_line(&mut self, kind: LineKind, line: Option<LineSegment>) {
        match kind {
            LineKind::Calibration => self.calibration_line = line,
            LineKind::Blur => self.blur_line = line,
        }
    }

    pub fn estimation_input(&self) -> EstimationInput {
        EstimationInput {
            calibration_line: self.calibration_line,
            blur_line: self.blur_line,
            calibration_length_m: self.inputs.calibration_length_m,
            shutter_s: self.inputs.shutter_s,
        }
    }
}

#[derive(Debug, Error)]
#[error("session store error: {msg}")]
pub struct StoreError {
    pub msg: String,
}

/// An in-place edit of a stored session. May run more than once when a store
/// retries a conflicting write, so it must not consume what it captures.
pub type Mutation = Box<dyn Fn(&mut Session) + Send + Sync>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, id: &str, session: Session) -> Result<(), StoreError>;
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;
    /// Applies `mutate` atomically with respect to other writes on the same
    /// session. Returns false when there is no such session.
    async fn update(&self, id: &str, mutate: Mutation) -> Result<bool, StoreError>;
    /// Returns whether a session was removed.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

pub type Store = Box<dyn SessionStore>;

struct Entry {
    session: Session,
    touched: Instant,
}

pub struct MemoryStore {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> MemoryStore {
        MemoryStore {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(&self, id: &str, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;
        let before = sessions.len();
        sessions.retain(|_, e| e.touched.elapsed() < ttl);
        if sessions.len() < before {
            log::debug!("expired {} idle sessions", before - sessions.len());
        }
        sessions.insert(
            id.to_string(),
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|e| e.touched.elapsed() < self.ttl)
            .map(|e| e.session.clone()))
    }

    async fn update(&self, id: &str, mutate: Mutation) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;
        match sessions.get_mut(id).filter(|e| e.touched.elapsed() < ttl) {
            Some(entry) => {
                mutate(&mut entry.session);
                entry.touched = Instant::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::Point;

    fn line(len: f64) -> LineSegment {
        LineSegment::new(Point::new(0., 0.), Point::new(len, 0.))
    }

    #[test]
    fn line_kind_from_param() {
        assert_eq!(LineKind::from_param("calibration"), Ok(LineKind::Calibration));
        assert_eq!(LineKind::from_param("blur"), Ok(LineKind::Blur));
        assert_eq!(LineKind::from_param("other"), Err("other"));
    }

    #[test]
    fn inputs_enforce_form_minimums() {
        assert!(SessionInputs::default().validate().is_ok());
        let low = SessionInputs {
            calibration_length_m: 0.001,
            shutter_s: 0.01,
        };
        assert_eq!(
            low.validate().unwrap_err(),
            EstimationError::InvalidParameter {
                field: "calibration length",
                value: 0.001
            }
        );
        let fast = SessionInputs {
            calibration_length_m: 1.,
            shutter_s: 1e-5,
        };
        assert_eq!(fast.validate().unwrap_err().kind(), "invalid_parameter");
    }

    #[test]
    fn session_lines_feed_the_estimator() {
        let mut s = Session::default();
        s.set_line(LineKind::Calibration, Some(line(100.)));
        s.set_line(LineKind::Blur, Some(line(40.)));
        assert_eq!(s.blur_line, Some(line(40.)));
        let input = s.estimation_input();
        assert_eq!(input.calibration_line, Some(line(100.)));
        assert_eq!(input.calibration_length_m, DEFAULT_CALIBRATION_LENGTH_M);
        assert_eq!(input.shutter_s, DEFAULT_SHUTTER_S);
        s.set_line(LineKind::Blur, None);
        assert_eq!(s.estimation_input().blur_line, None);
    }

    #[tokio::test]
    async fn memory_store_isolates_sessions() {
        let store = MemoryStore::new(Duration::from_secs(60));
        let mut a = Session::default();
        a.set_line(LineKind::Calibration, Some(line(10.)));
        store.put("a", a.clone()).await.unwrap();
        store.put("b", Session::default()).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(a));
        assert_eq!(store.get("b").await.unwrap(), Some(Session::default()));
        assert_eq!(store.get("c").await.unwrap(), None);

        assert!(store.remove("a").await.unwrap());
        assert!(!store.remove("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_updates_do_not_lose_writes() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.put("s", Session::default()).await.unwrap();

        let inputs = SessionInputs {
            calibration_length_m: 2.,
            shutter_s: 0.5,
        };
        let calibrate: Mutation =
            Box::new(|s: &mut Session| s.set_line(LineKind::Calibration, Some(line(10.))));
        let blur: Mutation = Box::new(|s: &mut Session| s.set_line(LineKind::Blur, Some(line(4.))));
        let (a, b, c) = tokio::join!(
            store.update("s", calibrate),
            store.update("s", blur),
            store.update("s", Box::new(move |s: &mut Session| s.inputs = inputs)),
        );
        assert!(a.unwrap() && b.unwrap() && c.unwrap());

        let s = store.get("s").await.unwrap().unwrap();
        assert_eq!(s.calibration_line, Some(line(10.)));
        assert_eq!(s.blur_line, Some(line(4.)));
        assert_eq!(s.inputs, inputs);

        assert!(!store
            .update("missing", Box::new(|s: &mut Session| s.blur_line = None))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn memory_store_expires_idle_sessions() {
        let store = MemoryStore::new(Duration::from_millis(20));
        store.put("old", Session::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("old").await.unwrap(), None);
        store.put("new", Session::default()).await.unwrap();
        assert_eq!(store.sessions.read().await.len(), 1);
    }
}
