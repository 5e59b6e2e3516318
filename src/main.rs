
mod cache;
mod canvas;
mod config;
mod constants;
mod estimate;
mod image_upload;
mod routes;
mod session;

use dotenv::dotenv;
use rocket::data::{Limits, ToByteUnit};
use rocket::{Build, Rocket};

use crate::cache::RedisStore;
use crate::config::{SessionBackend, Settings, SETTINGS};
use crate::session::{MemoryStore, Store, StoreError};

#[macro_use]
extern crate rocket;
extern crate redis;

fn open_store(settings: &Settings) -> Result<Store, StoreError> {
    Ok(match settings.session_backend {
        SessionBackend::Memory => Box::new(MemoryStore::new(settings.session_ttl)),
        SessionBackend::Redis => Box::new(RedisStore::open(
            &settings.redis_host,
            &settings.redis_port,
            settings.session_ttl.as_secs(),
        )?),
    })
}

pub fn build(settings: Settings, store: Store) -> Rocket<Build> {
    // canvas documents and json bodies can outgrow rocket's small defaults
    let limits = Limits::default()
        .limit("string", 1.mebibytes())
        .limit("json", 1.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));
    rocket::custom(figment)
        .manage(settings)
        .manage(store)
        .mount("/", routes::all())
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let settings = SETTINGS.clone();
    let store = open_store(&settings)?;
    build(settings, store).launch().await?;
    Ok(())
}
