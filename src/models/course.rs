//! Course model
//!
//! A course owns its videos and webinars. Access grants are not stored here,
//! they live on the user as a list of course IDs.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Offset-free formats a webinar date may also arrive in, read as UTC
const NAIVE_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Course entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub cost: i64,
    /// Cover image path under `/uploads`
    pub img: Option<String>,
    /// Diploma template path under `/uploads`
    pub diploma_path: Option<String>,
    /// Overlay coordinates for the name printed on the diploma
    pub diploma_x: i32,
    pub diploma_y: i32,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub webinars: Vec<Webinar>,
    pub created_at: DateTime<Utc>,
}

/// Video lesson, belongs to exactly one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub path: String,
    /// Optional supplementary material
    pub file: Option<String>,
}

/// Scheduled webinar, belongs to exactly one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webinar {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub link: String,
    pub date: DateTime<Utc>,
}

/// Course annotated with the requesting user's access
#[derive(Debug, Clone, Serialize)]
pub struct CourseWithAccess {
    #[serde(flatten)]
    pub course: Course,
    pub has_access: bool,
}

/// Input for creating a course together with its initial webinars
#[derive(Debug, Clone, Default)]
pub struct CreateCourseInput {
    pub title: String,
    pub description: String,
    pub cost: i64,
    pub img: Option<String>,
    pub diploma_path: Option<String>,
    pub diploma_x: i32,
    pub diploma_y: i32,
    pub webinars: Vec<NewWebinar>,
}

/// Input for updating a course.
///
/// `None` keeps the stored value, which is how a cover image survives an
/// update that doesn't upload a new one.
#[derive(Debug, Clone, Default)]
pub struct UpdateCourseInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cost: Option<i64>,
    pub img: Option<String>,
    pub diploma_path: Option<String>,
    pub diploma_x: Option<i32>,
    pub diploma_y: Option<i32>,
}

impl UpdateCourseInput {
    pub fn apply_to(self, course: &mut Course) {
        if let Some(title) = self.title {
            course.title = title;
        }
        if let Some(description) = self.description {
            course.description = description;
        }
        if let Some(cost) = self.cost {
            course.cost = cost;
        }
        if let Some(img) = self.img {
            course.img = Some(img);
        }
        if let Some(diploma_path) = self.diploma_path {
            course.diploma_path = Some(diploma_path);
        }
        if let Some(x) = self.diploma_x {
            course.diploma_x = x;
        }
        if let Some(y) = self.diploma_y {
            course.diploma_y = y;
        }
    }
}

/// Video that has been written to disk but not yet recorded
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub path: String,
    pub file: Option<String>,
}

/// Webinar to schedule
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebinar {
    #[serde(default)]
    pub title: String,
    pub link: String,
    #[serde(deserialize_with = "deserialize_webinar_date")]
    pub date: DateTime<Utc>,
}

/// RFC 3339, or a `datetime-local` value taken as UTC
pub fn parse_webinar_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NAIVE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_webinar_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_webinar_date(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid webinar date '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_webinar_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap();
        for raw in [
            "2025-03-01T18:00:00Z",
            "2025-03-01T21:00:00+03:00",
            "2025-03-01T18:00:00",
            "2025-03-01T18:00",
            "2025-03-01 18:00:00",
            " 2025-03-01 18:00 ",
        ] {
            assert_eq!(parse_webinar_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_webinar_date("tomorrow"), None);
        assert_eq!(parse_webinar_date("2025-13-01 18:00"), None);
    }

    #[test]
    fn test_new_webinar_accepts_both_date_styles() {
        let rfc: NewWebinar = serde_json::from_str(
            r#"{"title":"Live","link":"https://meet/1","date":"2025-03-01T18:00:00Z"}"#,
        )
        .unwrap();
        let local: NewWebinar =
            serde_json::from_str(r#"{"link":"https://meet/1","date":"2025-03-01T18:00"}"#).unwrap();
        assert_eq!(rfc.date, local.date);
        assert_eq!(local.title, "");

        let bad = serde_json::from_str::<NewWebinar>(r#"{"link":"l","date":"soon"}"#);
        assert!(bad.unwrap_err().to_string().contains("invalid webinar date"));
    }
}
