use crate::db::{logs, servers, trigs, DbPool, Trig};

pub async fn seed_server(pool: &DbPool, id: i64, url: &str) {
    servers::upsert_server(pool, id, url).await.unwrap();
}

pub async fn seed_trig(pool: &DbPool, id: i64, name: &str, lat: f64, lon: f64, status_id: i64) {
    let trig = Trig {
        id,
        waypoint: format!("TP{:04}", id),
        name: name.to_string(),
        county: "Wiltshire".to_string(),
        physical_type: "Pillar".to_string(),
        status_id,
        wgs_lat: lat,
        wgs_long: lon,
        osgb_gridref: String::new(),
        osgb_eastings: None,
        osgb_northings: None,
    };
    trigs::insert_trig(pool, &trig).await.unwrap();
}

pub async fn seed_log(pool: &DbPool, trig_id: i64, user_id: i64) -> i64 {
    logs::create_log(
        pool,
        &logs::NewLog {
            trig_id,
            user_id,
            visit_date: None,
            comment: String::new(),
            condition: "G".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}
