use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LATEST_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Identifies one incarnation of the broker process.
///
/// Captured once at startup and embedded in every client id we hand out, so ids (and
/// cursors) from before a restart can be told apart from current ones.  Microseconds
/// keep two quick restarts apart while staying exact as a JavaScript number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ServerGeneration(pub u64);

impl ServerGeneration {
    pub fn at_startup() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros() as u64)
            .unwrap_or_default();
        let next = |latest: u64| micros.max(latest + 1);
        let latest = LATEST_GENERATION
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |latest| Some(next(latest)))
            .unwrap_or_else(|latest| latest);
        Self(next(latest))
    }
}

impl fmt::Display for ServerGeneration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The id shared by a `ClientDescriptor` and its `EventQueue`: `"<generation>:<counter>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    pub generation: ServerGeneration,
    pub seq: u64,
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.seq)
    }
}

impl FromStr for ClientId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        match (parts.next(), parts.next()) {
            (Some(generation), Some(seq)) => Ok(Self {
                generation: ServerGeneration(generation.parse().map_err(|_| ())?),
                seq: seq.parse().map_err(|_| ())?,
            }),
            _ => Err(()),
        }
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
