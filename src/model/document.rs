// src/model/document.rs
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::cursor::SyncCursor;
use super::standing::{ProblemInfo, RowAction, Standing};

/// Contest identity and timing handed to an adapter by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub standings_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub season: Option<String>,
}

impl Contest {
    pub fn new(key: &str, url: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            key: s!(key),
            url: s!(url.trim_end_matches('/')),
            standings_url: None,
            start_time,
            end_time,
            season: None,
        }
    }

    /// Submissions at or after the end are upsolving.
    pub fn is_upsolving(&self, submission_time: i64) -> bool {
        submission_time >= self.end_time.timestamp()
    }
}

/// Seconds on the wire.
mod opt_secs {
    use super::*;
    use serde::Deserializer;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandingsDocument {
    pub result: BTreeMap<String, Standing>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub problems: Vec<ProblemInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_fields: Option<Vec<String>>,
    /// Ask the orchestrator to run again after this delay.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_secs")]
    pub timing_statistic_delta: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_state: Option<SyncCursor>,
    /// Per-contest fields the orchestrator should persist alongside the document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info_fields: Vec<String>,
}

impl StandingsDocument {
    pub fn new(url: &str) -> Self {
        Self { url: s!(url), ..Self::default() }
    }

    /// Keep the shortest requested re-run delay.
    pub fn request_rerun(&mut self, after: Duration) {
        self.timing_statistic_delta = Some(match self.timing_statistic_delta {
            Some(cur) => cur.min(after),
            None => after,
        });
    }
}

/// What `get_standings` hands back: a document, or the order to delete the contest
/// because the upstream resource is gone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StandingsReply {
    Delete { action: RowAction },
    Document(Box<StandingsDocument>),
}

impl StandingsReply {
    pub fn delete() -> Self {
        StandingsReply::Delete { action: RowAction::Delete }
    }

    pub fn document(doc: StandingsDocument) -> Self {
        StandingsReply::Document(Box::new(doc))
    }

    pub fn into_document(self) -> Option<StandingsDocument> {
        match self {
            StandingsReply::Document(d) => Some(*d),
            StandingsReply::Delete { .. } => None,
        }
    }
}

/// One entry of `get_user_infos`, in input order.
#[derive(Clone, Debug, PartialEq)]
pub enum UserInfo {
    Info(BTreeMap<String, Value>),
    /// Transient failure: keep whatever is stored.
    Skip,
    /// The profile does not exist.
    Missing,
}

impl Serialize for UserInfo {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut m = s.serialize_map(Some(1))?;
        match self {
            UserInfo::Info(info) => m.serialize_entry("info", info)?,
            UserInfo::Skip => m.serialize_entry("skip", &true)?,
            UserInfo::Missing => m.serialize_entry("info", &Value::Null)?,
        }
        m.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCode {
    pub solution: String,
}
