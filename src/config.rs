use std::env;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub app_name: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct PhotoConfig {
    pub max_upload_bytes: usize,
    pub max_photo_dimension: u32,
    pub thumbnail_dimension: u32,
    pub jpeg_quality: u8,
    pub default_server_id: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub db_path: String,
    pub media_path: String,
    pub media_base_url: String,
    pub cache: CacheConfig,
    pub photos: PhotoConfig,
    pub fetch_timeout_secs: u64,
    pub object_store_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let port: u16 = env::var("TRIGPOINTING_PORT")
            .unwrap_or_else(|_| "18474".to_string())
            .parse()?;
        let max_upload_mb: usize = env::var("TRIGPOINTING_MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "20".to_string())
            .parse()?;

        Ok(Config {
            port,
            host: env::var("TRIGPOINTING_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            db_path: env::var("TRIGPOINTING_DB_PATH")
                .unwrap_or_else(|_| "./data/database/trigpointing.db".to_string()),
            media_path: env::var("TRIGPOINTING_MEDIA_PATH")
                .unwrap_or_else(|_| "./data/media".to_string()),
            media_base_url: env::var("TRIGPOINTING_MEDIA_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}/media/", port)),
            cache: CacheConfig {
                app_name: env::var("TRIGPOINTING_APP_NAME")
                    .unwrap_or_else(|_| "trigpointing".to_string()),
                environment: env::var("TRIGPOINTING_ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
            },
            photos: PhotoConfig {
                max_upload_bytes: max_upload_mb * 1024 * 1024,
                max_photo_dimension: env::var("TRIGPOINTING_MAX_PHOTO_DIMENSION")
                    .unwrap_or_else(|_| "2048".to_string())
                    .parse()?,
                thumbnail_dimension: env::var("TRIGPOINTING_THUMBNAIL_DIMENSION")
                    .unwrap_or_else(|_| "240".to_string())
                    .parse()?,
                jpeg_quality: env::var("TRIGPOINTING_JPEG_QUALITY")
                    .unwrap_or_else(|_| "85".to_string())
                    .parse()?,
                default_server_id: env::var("TRIGPOINTING_DEFAULT_SERVER_ID")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            fetch_timeout_secs: env::var("TRIGPOINTING_FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            object_store_attempts: env::var("TRIGPOINTING_OBJECT_STORE_ATTEMPTS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
        })
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
            max_photo_dimension: 2048,
            thumbnail_dimension: 240,
            jpeg_quality: 85,
            default_server_id: 1,
        }
    }
}
