use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PhotoType {
    Trigpoint,
    FlushBracket,
    Landscape,
    People,
    Other,
}

impl PhotoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoType::Trigpoint => "trigpoint",
            PhotoType::FlushBracket => "flush_bracket",
            PhotoType::Landscape => "landscape",
            PhotoType::People => "people",
            PhotoType::Other => "other",
        }
    }
}

impl FromStr for PhotoType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigpoint" => Ok(PhotoType::Trigpoint),
            "flush_bracket" => Ok(PhotoType::FlushBracket),
            "landscape" => Ok(PhotoType::Landscape),
            "people" => Ok(PhotoType::People),
            "other" => Ok(PhotoType::Other),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PhotoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum License {
    PublicDomain,
    CreativeCommons,
    Private,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            License::PublicDomain => "public_domain",
            License::CreativeCommons => "creative_commons",
            License::Private => "private",
        }
    }
}

impl FromStr for License {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public_domain" => Ok(License::PublicDomain),
            "creative_commons" => Ok(License::CreativeCommons),
            "private" => Ok(License::Private),
            _ => Err(()),
        }
    }
}

/// Whether the stored blobs come from the original upload or a later revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PhotoOrigin {
    Uploaded,
    Revised,
}

/// Provisional rows exist only while the pipeline is writing blobs. Read
/// paths only ever select committed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RecordStatus {
    Provisional,
    Committed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Photo {
    pub id: i64,
    pub log_id: i64,
    pub server_id: i64,
    pub photo_type: PhotoType,
    pub license: License,
    pub filename: String,
    pub filesize: i64,
    pub height: i64,
    pub width: i64,
    pub icon_filename: String,
    pub icon_filesize: i64,
    pub icon_height: i64,
    pub icon_width: i64,
    pub caption: String,
    pub description: String,
    pub origin: PhotoOrigin,
    pub status: RecordStatus,
    pub revision: i64,
    pub deleted: bool,
    #[serde(skip_serializing)]
    pub ip_addr: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Log {
    pub id: i64,
    pub trig_id: i64,
    pub user_id: i64,
    pub visit_date: Option<NaiveDate>,
    pub comment: String,
    pub condition: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Trig {
    pub id: i64,
    pub waypoint: String,
    pub name: String,
    pub county: String,
    pub physical_type: String,
    pub status_id: i64,
    pub wgs_lat: f64,
    pub wgs_long: f64,
    pub osgb_gridref: String,
    pub osgb_eastings: Option<i64>,
    pub osgb_northings: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Server {
    pub id: i64,
    pub url: String,
}

impl Server {
    /// Public URL of an object stored under `key` on this server.
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }
}
