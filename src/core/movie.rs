//! Movie catalog entity and its input validation.
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::core::{
    validator::{Validator, unique},
    versioning::Versioned,
};

/// Running time in minutes, carried on the wire as `"<n> mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Runtime(pub i32);

#[derive(Debug, thiserror::Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

impl std::str::FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some("mins"), None) => n
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Runtime>().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero_runtime")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_runtime(r: &Runtime) -> bool {
    r.0 == 0
}

impl Movie {
    /// A not-yet-persisted movie; the store assigns `id`, `created_at` and `version`.
    pub fn draft(title: String, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

impl Versioned for Movie {
    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(
        movie.year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        movie.genres.len() <= 5,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn casablanca() -> Movie {
        Movie::draft(
            "Casablanca".to_string(),
            1942,
            Runtime(102),
            vec!["drama".to_string(), "romance".to_string()],
        )
    }

    #[test]
    fn test_runtime_wire_format() {
        assert_eq!(serde_json::to_string(&Runtime(102)).unwrap(), "\"102 mins\"");
        let parsed: Runtime = serde_json::from_str("\"107 mins\"").unwrap();
        assert_eq!(parsed, Runtime(107));
    }

    #[test]
    fn test_runtime_rejects_other_shapes() {
        for bad in ["\"107\"", "\"107 minutes\"", "\"abc mins\"", "107", "\"1 2 mins\""] {
            assert!(serde_json::from_str::<Runtime>(bad).is_err(), "{bad} parsed");
        }
    }

    #[test]
    fn test_serialized_movie_hides_created_at() {
        let json = serde_json::to_value(casablanca()).unwrap();
        assert!(json.get("created_at").is_none());
        assert_eq!(json["runtime"], "102 mins");
        assert_eq!(json["version"], 0);
    }

    #[test]
    fn test_valid_movie_passes() {
        let mut v = Validator::new();
        validate_movie(&mut v, &casablanca());
        assert!(v.valid(), "{:?}", v.errors());
    }

    #[test]
    fn test_invalid_movie_reports_each_field() {
        let mut movie = casablanca();
        movie.title.clear();
        movie.year = 1700;
        movie.runtime = Runtime(-5);
        movie.genres = vec!["drama".to_string(), "drama".to_string()];

        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        let errors = v.errors();
        assert_eq!(errors["title"], "must be provided");
        assert_eq!(errors["year"], "must be greater than 1888");
        assert_eq!(errors["runtime"], "must be a positive integer");
        assert_eq!(errors["genres"], "must not contain duplicate values");
    }
}
