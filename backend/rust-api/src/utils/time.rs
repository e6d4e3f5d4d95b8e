use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub fn now_bson() -> BsonDateTime {
    chrono_to_bson(Utc::now())
}

pub fn bson_to_rfc3339(dt: BsonDateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
