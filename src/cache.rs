//! Redis backed session store, for running several server instances behind
//! one balancer. Entries expire after the configured TTL.

use std::sync::Arc;

use async_trait::async_trait;
use rocket::serde::json::serde_json;
use rocket::serde::Serialize;
use serde::Deserialize;

use crate::image_upload::{ImageInfo, UploadedImage};
use crate::session::{Mutation, Session, SessionStore, StoreError};

#[derive(Serialize)]
struct StoredSessionRef<'a> {
    session: &'a Session,
    image: Option<ImageInfo>,
}

#[derive(Deserialize)]
struct StoredSession {
    session: Session,
    image: Option<ImageInfo>,
}

pub struct RedisStore {
    client: redis::Client,
    ttl_secs: u64,
}

fn cache_error<E: ToString>(e: E) -> StoreError {
    StoreError { msg: e.to_string() }
}

fn json_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "session json", e.to_string()))
}

fn session_key(id: &str) -> String {
    format!("{}-{}", "session", id)
}

fn image_key(id: &str) -> String {
    format!("{}-{}", "image", id)
}

fn read_record(id: &str, body: &str, bytes: Option<Vec<u8>>) -> redis::RedisResult<Session> {
    let record: StoredSession = serde_json::from_str(body).map_err(json_error)?;
    let mut session = record.session;
    session.image = match (record.image, bytes) {
        (Some(info), Some(bytes)) => Some(UploadedImage {
            info,
            bytes: Arc::new(bytes),
        }),
        (Some(_), None) => {
            log::warn!("session {} lost its image bytes", id);
            None
        }
        _ => None,
    };
    Ok(session)
}

/// Queues the writes that store `session`. The image bytes are only resent
/// when `write_image` is set, otherwise an existing image just has its expiry
/// refreshed.
fn queue_put(
    pipe: &mut redis::Pipeline,
    id: &str,
    ttl: u64,
    session: &Session,
    write_image: bool,
) -> redis::RedisResult<()> {
    let record = StoredSessionRef {
        session,
        image: session.image.as_ref().map(|i| i.info),
    };
    let body = serde_json::to_string(&record).map_err(json_error)?;
    let (skey, ikey) = (session_key(id), image_key(id));

    pipe.cmd("SET").arg(&skey).arg(body).arg("EX").arg(ttl).ignore();
    match &session.image {
        Some(image) if write_image => pipe
            .cmd("SET")
            .arg(&ikey)
            .arg(image.bytes.as_slice())
            .arg("EX")
            .arg(ttl),
        Some(_) => pipe.cmd("EXPIRE").arg(&ikey).arg(ttl),
        None => pipe.cmd("DEL").arg(&ikey),
    };
    pipe.ignore();
    Ok(())
}

impl RedisStore {
    pub fn open(host: &str, port: &str, ttl_secs: u64) -> Result<RedisStore, StoreError> {
        let redis_path = format!("redis://{}:{}", host, port);
        let client = redis::Client::open(redis_path).map_err(cache_error)?;
        Ok(RedisStore { client, ttl_secs })
    }

    // redis calls are blocking, keep them off the async workers
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = client.get_connection().map_err(cache_error)?;
            f(&mut connection).map_err(cache_error)
        })
        .await
        .map_err(cache_error)?
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put(&self, id: &str, session: Session) -> Result<(), StoreError> {
        let (id, ttl) = (id.to_string(), self.ttl_secs);
        self.with_connection(move |connection| {
            let mut pipe = redis::pipe();
            pipe.atomic();
            queue_put(&mut pipe, &id, ttl, &session, true)?;
            pipe.query::<()>(connection)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let (skey, ikey) = (session_key(id), image_key(id));
        let (body, bytes) = self
            .with_connection(move |connection| {
                redis::pipe()
                    .cmd("GET")
                    .arg(&skey)
                    .cmd("GET")
                    .arg(&ikey)
                    .query::<(Option<String>, Option<Vec<u8>>)>(connection)
            })
            .await?;

        match body {
            Some(body) => read_record(id, &body, bytes).map(Some).map_err(cache_error),
            None => Ok(None),
        }
    }

    /// Optimistic update: both keys are watched while the session is read and
    /// mutated, and the whole read-modify-write is retried if another writer
    /// got there first.
    async fn update(&self, id: &str, mutate: Mutation) -> Result<bool, StoreError> {
        let (id, ttl) = (id.to_string(), self.ttl_secs);
        self.with_connection(move |connection| {
            let (skey, ikey) = (session_key(&id), image_key(&id));
            redis::transaction(connection, &[&skey, &ikey], |con, pipe| {
                let (body, bytes): (Option<String>, Option<Vec<u8>>) = redis::pipe()
                    .cmd("GET")
                    .arg(&skey)
                    .cmd("GET")
                    .arg(&ikey)
                    .query(con)?;
                let body = match body {
                    Some(body) => body,
                    None => return Ok(Some(false)),
                };
                let mut session = read_record(&id, &body, bytes)?;
                let before = session.image.as_ref().map(|i| Arc::clone(&i.bytes));
                mutate(&mut session);
                let write_image = match (&before, &session.image) {
                    (Some(old), Some(new)) => !Arc::ptr_eq(old, &new.bytes),
                    (None, None) => false,
                    _ => true,
                };
                queue_put(pipe, &id, ttl, &session, write_image)?;
                let done: Option<()> = pipe.query(con)?;
                Ok(done.map(|_| true))
            })
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let (skey, ikey) = (session_key(id), image_key(id));
        let removed = self
            .with_connection(move |connection| {
                redis::cmd("DEL").arg(&skey).arg(&ikey).query::<u64>(connection)
            })
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SETTINGS;
    use crate::estimate::{LineSegment, Point};
    use crate::image_upload::encode_test_image;
    use crate::session::LineKind;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(session_key("abc"), "session-abc");
        assert_eq!(image_key("abc"), "image-abc");
    }

    #[ignore]
    #[tokio::test]
    async fn redis_round_trip() {
        let store = RedisStore::open(&SETTINGS.redis_host, &SETTINGS.redis_port, 30)
            .expect("redis client");
        let bytes = encode_test_image(80, 60, image::ImageFormat::Png);
        let mut session = Session::default();
        session.image = Some(UploadedImage::decode(bytes).unwrap());
        session.set_line(
            LineKind::Blur,
            Some(LineSegment::new(Point::new(1., 2.), Point::new(3., 4.))),
        );

        store.put("redis-round-trip", session.clone()).await.unwrap();
        assert_eq!(store.get("redis-round-trip").await.unwrap(), Some(session.clone()));

        let updated = store
            .update(
                "redis-round-trip",
                Box::new(|s: &mut Session| s.set_line(LineKind::Blur, None)),
            )
            .await
            .unwrap();
        assert!(updated);
        let stored = store.get("redis-round-trip").await.unwrap().unwrap();
        assert_eq!(stored.blur_line, None);
        assert_eq!(stored.image, session.image);

        // Teardown
        assert!(store.remove("redis-round-trip").await.unwrap());
        assert!(!store
            .update("redis-round-trip", Box::new(|s: &mut Session| s.blur_line = None))
            .await
            .unwrap());
        assert_eq!(store.get("redis-round-trip").await.unwrap(), None);
    }
}
