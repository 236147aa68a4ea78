#![doc = "The `taskify` library crate."]
#![doc = ""]
#![doc = "Domain models, the ownership policy, statistics aggregation, authentication,"]
#![doc = "routing configuration and error handling for the Taskify API. The binary"]
#![doc = "(`main.rs`) only reads configuration, connects the pool and starts the server."]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod models;
pub mod policy;
pub mod response;
pub mod routes;
pub mod security;
pub mod stats;

use actix_web::web;

use crate::error::AppError;

fn bad_request(message: String) -> actix_web::Error {
    AppError::BadRequest(message).into()
}

/// JSON body extractor settings: malformed bodies become an enveloped `400`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| bad_request(format!("Invalid JSON body: {}", err)))
}

/// Query string extractor settings: unparsable parameters become an enveloped `400`.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| bad_request(format!("Invalid query string: {}", err)))
}

/// Path extractor settings, e.g. a malformed UUID in `/tasks/{id}`.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| bad_request(format!("Invalid path parameter: {}", err)))
}
