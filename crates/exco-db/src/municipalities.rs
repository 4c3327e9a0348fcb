//! Municipality boundary queries.
//!
//! The boundaries table is optional: deployments without boundary data
//! get an empty membership set, never an error. The degradation is keyed
//! on the Postgres `undefined_table` code so genuine failures still
//! surface to the caller.

use sqlx::PgPool;

use exco_core::Geometry;

use crate::DbResult;

/// Postgres error code for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Municipality codes whose boundary intersects the given footprint,
/// sorted for stable derived-field writes. An absent boundaries table
/// yields the empty set with a warning.
pub async fn codes_intersecting(pool: &PgPool, geometry: &Geometry) -> DbResult<Vec<String>> {
    let result: Result<Vec<String>, sqlx::Error> = sqlx::query_scalar(
        "SELECT code FROM municipalities \
         WHERE ST_Intersects(geometry, ST_SetSRID(ST_GeomFromGeoJSON($1), 4326)) \
         ORDER BY code",
    )
    .bind(geometry.to_json())
    .fetch_all(pool)
    .await;

    match result {
        Ok(codes) => Ok(codes),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNDEFINED_TABLE) => {
            tracing::warn!(
                "municipalities table is not installed; affected-municipality \
                 detection degrades to the empty set"
            );
            Ok(Vec::new())
        }
        Err(other) => Err(other.into()),
    }
}
