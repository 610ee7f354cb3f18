//! Health check endpoint for load balancers and monitoring

use actix_web::{get, web, HttpResponse, Responder};
use diesel::prelude::*;
use diesel::sql_query;
use serde::Serialize;
use std::time::Instant;

use crate::db::DbPool;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub database: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn check_database_health(pool: &DbPool) -> ComponentHealth {
    let start = Instant::now();
    let pool = pool.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        sql_query("SELECT 1").execute(&mut conn).map_err(|e| e.to_string())?;
        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => ComponentHealth {
            status: "healthy",
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Ok(Err(e)) => ComponentHealth {
            status: "unhealthy",
            latency_ms: None,
            error: Some(e),
        },
        Err(e) => ComponentHealth {
            status: "unhealthy",
            latency_ms: None,
            error: Some(format!("health task failed: {e}")),
        },
    }
}

/// `GET /health`
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "tkoin-settlement",
///   "version": "0.3.0",
///   "database": { "status": "healthy", "latency_ms": 1 }
/// }
/// ```
#[get("/health")]
pub async fn health_check(pool: web::Data<DbPool>) -> impl Responder {
    let database = check_database_health(&pool).await;
    let healthy = database.status == "healthy";
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        service: "tkoin-settlement",
        version: env!("CARGO_PKG_VERSION"),
        database,
    };

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}
