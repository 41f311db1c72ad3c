//! The fixed station catalog.
//!
//! Stations are compiled into the binary. The catalog is handed to the
//! controller at construction time rather than read from a global.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShuttleError};

const BUILTIN_STATIONS: &[(&str, &str, &str)] = &[
    (
        "Crimson Hall",
        "https://s4.radio.co/s1e0b382a0/listen",
        "https://public.radio.co/stations/s1e0b382a0/status",
    ),
    (
        "Wizard’s Forest",
        "https://streamer.radio.co/s95a101d27/listen",
        "https://public.radio.co/stations/s95a101d27/status",
    ),
    (
        "Dragon’s Tower",
        "https://s4.radio.co/s141f9a810/listen",
        "https://public.radio.co/stations/s141f9a810/status",
    ),
];

/// A named stream plus the JSON endpoint describing what it is playing.
///
/// Equality and hashing only look at `name`, which is the selection key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub stream_url: String,
    pub status_url: String,
}

impl Station {
    pub fn new(
        name: impl Into<String>,
        stream_url: impl Into<String>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stream_url: stream_url.into(),
            status_url: status_url.into(),
        }
    }

}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Ordered, non-empty list of stations with unique names.
#[derive(Debug, Clone)]
pub struct Catalog {
    stations: Vec<Station>,
}

impl Catalog {
    pub fn new(stations: Vec<Station>) -> Result<Self> {
        if stations.is_empty() {
            return Err(ShuttleError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for station in &stations {
            if !seen.insert(station.name.as_str()) {
                return Err(ShuttleError::DuplicateStation(station.name.clone()));
            }
        }
        Ok(Self { stations })
    }

    /// The three Prog Radio Shuttle channels.
    pub fn builtin() -> Result<Self> {
        Self::new(
            BUILTIN_STATIONS
                .iter()
                .map(|(name, stream, status)| Station::new(*name, *stream, *status))
                .collect(),
        )
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn first(&self) -> &Station {
        &self.stations[0]
    }

    pub fn get(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name == name)
    }

    pub fn get_index(&self, idx: usize) -> Option<&Station> {
        self.stations.get(idx)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stations.iter().position(|s| s.name == name)
    }

    pub fn contains(&self, station: &Station) -> bool {
        self.position(&station.name).is_some()
    }

    /// Step `offset` entries away from `name`, wrapping at both ends.
    /// Unknown names start from the first entry.
    pub fn cycle(&self, name: &str, offset: isize) -> &Station {
        let len = self.stations.len() as isize;
        let current = self.position(name).unwrap_or(0) as isize;
        let idx = (current + offset).rem_euclid(len) as usize;
        &self.stations[idx]
    }
}
