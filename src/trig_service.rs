use log::info;
use serde::Deserialize;
use std::sync::Arc;

use crate::cache::{Invalidator, MutationKind, MutationScope};
use crate::coordinates::{is_within_region, GeoError};
use crate::db::{trigs, DbPool, Trig};
use crate::grid_reference::parse_grid_reference;
use crate::log_service::{fan_out, ServiceError};

/// Admin curation of a marker. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrigUpdate {
    pub name: Option<String>,
    pub county: Option<String>,
    pub physical_type: Option<String>,
    pub status_id: Option<i64>,
    /// Moves the marker; WGS84 and eastings/northings are derived from it.
    pub grid_reference: Option<String>,
    /// Moves the marker by WGS84 position; the grid fields are cleared.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl TrigUpdate {
    fn apply(&self, trig: &mut Trig) -> Result<(), ServiceError> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::Validation("name must not be empty".to_string()));
            }
            trig.name = name.to_string();
        }
        if let Some(county) = &self.county {
            trig.county = county.trim().to_string();
        }
        if let Some(physical_type) = &self.physical_type {
            trig.physical_type = physical_type.trim().to_string();
        }
        if let Some(status_id) = self.status_id {
            if status_id < 0 {
                return Err(ServiceError::Validation(format!(
                    "status {} is negative",
                    status_id
                )));
            }
            trig.status_id = status_id;
        }

        match (&self.grid_reference, self.lat, self.lon) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(ServiceError::Validation(
                    "give either a grid reference or lat/lon, not both".to_string(),
                ));
            }
            (Some(text), None, None) => {
                let position = parse_grid_reference(text)?;
                if !is_within_region(position.lat, position.lon) {
                    return Err(GeoError::OutOfRegion {
                        lat: position.lat,
                        lon: position.lon,
                    }
                    .into());
                }
                trig.wgs_lat = position.lat;
                trig.wgs_long = position.lon;
                trig.osgb_eastings = Some(i64::from(position.eastings));
                trig.osgb_northings = Some(i64::from(position.northings));
                trig.osgb_gridref = position.normalized;
            }
            (None, Some(lat), Some(lon)) => {
                if !is_within_region(lat, lon) {
                    return Err(GeoError::OutOfRegion { lat, lon }.into());
                }
                trig.wgs_lat = lat;
                trig.wgs_long = lon;
                trig.osgb_eastings = None;
                trig.osgb_northings = None;
                trig.osgb_gridref = String::new();
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(ServiceError::Validation(
                    "lat and lon must be given together".to_string(),
                ));
            }
            (None, None, None) => {}
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct TrigService {
    pool: DbPool,
    invalidator: Arc<dyn Invalidator>,
}

impl TrigService {
    pub fn new(pool: DbPool, invalidator: Arc<dyn Invalidator>) -> Self {
        Self { pool, invalidator }
    }

    pub async fn find_trig(&self, id: i64) -> Result<Trig, ServiceError> {
        trigs::find_trig(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("trig {}", id)))
    }

    pub async fn update_trig(&self, id: i64, update: TrigUpdate) -> Result<Trig, ServiceError> {
        let mut trig = self.find_trig(id).await?;
        update.apply(&mut trig)?;

        if !trigs::save_trig(&self.pool, &trig).await? {
            return Err(ServiceError::NotFound(format!("trig {}", id)));
        }
        info!("Updated trig {} ({})", trig.id, trig.waypoint);

        fan_out(
            self.invalidator.as_ref(),
            MutationKind::Trig,
            MutationScope {
                trig_id: Some(id),
                ..MutationScope::default()
            },
        )
        .await;

        Ok(trig)
    }
}
