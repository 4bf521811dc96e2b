mod common;

use bytes::Bytes;
use common::{insert_log, insert_trig, jpeg, TestApp};
use trigpointing::cache::response::trig_list_key;
use trigpointing::db::logs::NewLog;
use trigpointing::db::postcodes::upsert_postcode;
use trigpointing::trig_service::TrigUpdate;
use trigpointing::warp_handlers::{
    create_log, delete_log, get_site_stats, get_trig, rotate_photo, search_location,
    search_trigs_handler, update_trig, upload_photo, LocationQuery, RotateRequest,
    TrigSearchQuery, UploadQuery,
};
use trigpointing::warp_helpers::handle_rejection;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

async fn status_of<R: Reply>(result: Result<R, Rejection>) -> StatusCode {
    match result {
        Ok(reply) => reply.into_response().status(),
        Err(rejection) => handle_rejection(rejection)
            .await
            .unwrap()
            .into_response()
            .status(),
    }
}

fn upload_query(log_id: i64) -> UploadQuery {
    UploadQuery {
        log_id,
        caption: "Summit".to_string(),
        description: String::new(),
        photo_type: Some("trigpoint".to_string()),
        license: None,
        server_id: None,
    }
}

#[tokio::test]
async fn test_log_endpoints() {
    let app = TestApp::new("test").await;
    insert_trig(&app.pool, 5, "Bulbarrow", 50.84, -2.34).await;

    let new_log = |condition: &str| NewLog {
        trig_id: 5,
        user_id: 9,
        visit_date: None,
        comment: "Clear day".to_string(),
        condition: condition.to_string(),
    };

    assert_eq!(
        status_of(create_log(new_log("G"), app.ctx.log_service.clone()).await).await,
        StatusCode::CREATED
    );
    assert_eq!(
        status_of(create_log(new_log("great"), app.ctx.log_service.clone()).await).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_of(
            create_log(
                NewLog {
                    trig_id: 404,
                    ..new_log("G")
                },
                app.ctx.log_service.clone()
            )
            .await
        )
        .await,
        StatusCode::NOT_FOUND
    );

    let log_id = insert_log(&app.pool, 5, 9).await;
    assert_eq!(
        status_of(delete_log(log_id, app.ctx.log_service.clone()).await).await,
        StatusCode::OK
    );
    assert_eq!(
        status_of(delete_log(log_id, app.ctx.log_service.clone()).await).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_photo_endpoints() {
    let app = TestApp::new("test").await;
    insert_trig(&app.pool, 5, "Bulbarrow", 50.84, -2.34).await;
    let log_id = insert_log(&app.pool, 5, 9).await;

    let created = upload_photo(
        upload_query(log_id),
        None,
        Bytes::from(jpeg(400, 300)),
        app.ctx.pipeline.clone(),
    )
    .await;
    assert_eq!(status_of(created).await, StatusCode::CREATED);

    let garbage = upload_photo(
        upload_query(log_id),
        None,
        Bytes::from_static(b"definitely not an image"),
        app.ctx.pipeline.clone(),
    )
    .await;
    assert_eq!(status_of(garbage).await, StatusCode::BAD_REQUEST);

    let bad_type = upload_photo(
        UploadQuery {
            photo_type: Some("selfie".to_string()),
            ..upload_query(log_id)
        },
        None,
        Bytes::from(jpeg(10, 10)),
        app.ctx.pipeline.clone(),
    )
    .await;
    assert_eq!(status_of(bad_type).await, StatusCode::BAD_REQUEST);

    let photo_id = app.objects.keys().len() as i64 / 2;
    assert_eq!(photo_id, 1);
    assert_eq!(
        status_of(rotate_photo(photo_id, RotateRequest { angle: 45 }, app.ctx.pipeline.clone()).await)
            .await,
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_of(rotate_photo(photo_id, RotateRequest { angle: 270 }, app.ctx.pipeline.clone()).await)
            .await,
        StatusCode::OK
    );

    app.objects.fail_puts_matching(Some(""));
    let outage = upload_photo(
        upload_query(log_id),
        None,
        Bytes::from(jpeg(40, 40)),
        app.ctx.pipeline.clone(),
    )
    .await;
    assert_eq!(status_of(outage).await, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_trig_endpoints_use_cache() {
    let app = TestApp::new("test").await;
    insert_trig(&app.pool, 5, "Bulbarrow", 50.84, -2.34).await;
    let detail_key = app.namespace.key("trig:5:detail");

    assert_eq!(
        status_of(get_trig(5, app.ctx.trig_service.clone(), app.ctx.response_cache.clone()).await)
            .await,
        StatusCode::OK
    );
    assert!(app.cache.contains(&detail_key));
    assert_eq!(
        status_of(get_trig(6, app.ctx.trig_service.clone(), app.ctx.response_cache.clone()).await)
            .await,
        StatusCode::NOT_FOUND
    );

    let update = TrigUpdate {
        name: Some("Bulbarrow Hill".to_string()),
        ..TrigUpdate::default()
    };
    assert_eq!(
        status_of(update_trig(5, update, app.ctx.trig_service.clone()).await).await,
        StatusCode::OK
    );
    assert!(!app.cache.contains(&detail_key));

    let search = search_trigs_handler(
        TrigSearchQuery {
            lat: Some(50.84),
            lon: Some(-2.34),
            max_km: Some(1.0),
            ..TrigSearchQuery::default()
        },
        app.pool.clone(),
        app.ctx.postcodes.clone(),
        app.ctx.response_cache.clone(),
    )
    .await;
    assert_eq!(status_of(search).await, StatusCode::OK);
    assert_eq!(app.cache.len(), 1);

    let half_point = search_trigs_handler(
        TrigSearchQuery {
            lat: Some(50.84),
            ..TrigSearchQuery::default()
        },
        app.pool.clone(),
        app.ctx.postcodes.clone(),
        app.ctx.response_cache.clone(),
    )
    .await;
    assert_eq!(status_of(half_point).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_location_search_and_stats() {
    let app = TestApp::new("test").await;
    upsert_postcode(&app.pool, "DT11 0AA", 50.85, -2.33).await.unwrap();

    let found = search_location(
        LocationQuery {
            q: "dt110aa".to_string(),
        },
        app.ctx.postcodes.clone(),
    )
    .await;
    assert_eq!(status_of(found).await, StatusCode::OK);

    let unknown = search_location(
        LocationQuery {
            q: "EH1 1AA".to_string(),
        },
        app.ctx.postcodes.clone(),
    )
    .await;
    assert_eq!(status_of(unknown).await, StatusCode::NOT_FOUND);

    let nonsense = search_location(
        LocationQuery {
            q: "somewhere nice".to_string(),
        },
        app.ctx.postcodes.clone(),
    )
    .await;
    assert_eq!(status_of(nonsense).await, StatusCode::BAD_REQUEST);

    let stats_key = app.namespace.key("stats:site:summary");
    assert_eq!(
        status_of(get_site_stats(app.pool.clone(), app.ctx.response_cache.clone()).await).await,
        StatusCode::OK
    );
    assert!(app.cache.contains(&stats_key));

    insert_trig(&app.pool, 5, "Bulbarrow", 50.84, -2.34).await;
    let log = NewLog {
        trig_id: 5,
        user_id: 1,
        visit_date: None,
        comment: String::new(),
        condition: "G".to_string(),
    };
    create_log(log, app.ctx.log_service.clone()).await.unwrap();
    assert!(!app.cache.contains(&stats_key));
}

async fn cached_search_body(app: &TestApp, query: &TrigSearchQuery) -> Option<String> {
    let key = trig_list_key(&serde_json::to_string(query).unwrap());
    app.ctx
        .response_cache
        .get(&key)
        .await
        .map(|body| String::from_utf8(body).unwrap())
}

#[tokio::test]
async fn test_log_mutations_evict_exclude_logged_searches() {
    let app = TestApp::new("test").await;
    insert_trig(&app.pool, 5, "Bulbarrow", 50.84, -2.34).await;

    let unlogged_by_nine = || TrigSearchQuery {
        exclude_logged_by: Some(9),
        ..TrigSearchQuery::default()
    };
    let search = || {
        search_trigs_handler(
            unlogged_by_nine(),
            app.pool.clone(),
            app.ctx.postcodes.clone(),
            app.ctx.response_cache.clone(),
        )
    };

    assert_eq!(status_of(search().await).await, StatusCode::OK);
    let before = cached_search_body(&app, &unlogged_by_nine()).await.unwrap();
    assert!(before.contains("\"total\":1"), "{}", before);

    let log = NewLog {
        trig_id: 5,
        user_id: 9,
        visit_date: None,
        comment: String::new(),
        condition: "G".to_string(),
    };
    assert_eq!(
        status_of(create_log(log, app.ctx.log_service.clone()).await).await,
        StatusCode::CREATED
    );
    assert!(cached_search_body(&app, &unlogged_by_nine()).await.is_none());

    assert_eq!(status_of(search().await).await, StatusCode::OK);
    let after_create = cached_search_body(&app, &unlogged_by_nine()).await.unwrap();
    assert!(after_create.contains("\"total\":0"), "{}", after_create);

    assert_eq!(
        status_of(delete_log(1, app.ctx.log_service.clone()).await).await,
        StatusCode::OK
    );
    assert!(cached_search_body(&app, &unlogged_by_nine()).await.is_none());

    assert_eq!(status_of(search().await).await, StatusCode::OK);
    let after_delete = cached_search_body(&app, &unlogged_by_nine()).await.unwrap();
    assert!(after_delete.contains("\"total\":1"), "{}", after_delete);
}
