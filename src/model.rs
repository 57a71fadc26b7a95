use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One row of backend data, kept exactly as the backend sent it.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Plants,
    Ports,
    Trains,
    Vessels,
    Logistics,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Plants,
        ResourceKind::Ports,
        ResourceKind::Trains,
        ResourceKind::Vessels,
        ResourceKind::Logistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Plants => "plants",
            ResourceKind::Ports => "ports",
            ResourceKind::Trains => "trains",
            ResourceKind::Vessels => "vessels",
            ResourceKind::Logistics => "logistics",
        }
    }

    /// Endpoint path relative to the API base URL.
    pub fn path(&self) -> String {
        format!("data/{}", self.as_str())
    }

    /// Route guarding the view of this resource. Logistics has no page of
    /// its own and lives on the dashboard.
    pub fn route(&self) -> &'static str {
        match self {
            ResourceKind::Plants => "/plants",
            ResourceKind::Ports => "/ports",
            ResourceKind::Trains => "/trains",
            ResourceKind::Vessels => "/vessels",
            ResourceKind::Logistics => "/dashboard",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ResourceKind::Plants => "Steel Plants",
            ResourceKind::Ports => "Ports",
            ResourceKind::Trains => "Train Trips",
            ResourceKind::Vessels => "Vessel Contracts",
            ResourceKind::Logistics => "Logistics Types",
        }
    }

    pub fn natural_key(&self) -> KeySpec {
        match self {
            ResourceKind::Plants => KeySpec::new(["plant_name"]),
            ResourceKind::Ports => KeySpec::new(["port_name"]),
            ResourceKind::Trains => KeySpec::new(["trip_id"]),
            ResourceKind::Vessels => KeySpec::new(["vessel_id", "load_port"]),
            ResourceKind::Logistics => KeySpec::new(["type"]),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown resource '{}'", s))
    }
}

/// Field (or fields) identifying a record for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    fields: Vec<String>,
}

impl KeySpec {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Key of `record`. Missing fields count as null; a record missing every
    /// key field is keyed by its whole content.
    pub fn key_of(&self, record: &Record) -> String {
        if self.fields.iter().all(|f| !record.contains_key(f)) {
            return Value::Object(record.clone()).to_string();
        }
        let parts: Vec<Value> = self
            .fields
            .iter()
            .map(|f| record.get(f).cloned().unwrap_or(Value::Null))
            .collect();
        Value::Array(parts).to_string()
    }
}

/// Page number plus page size. `page` is the last page merged through the
/// load-more path; zero means nothing has been loaded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub size: u32,
}

impl PageCursor {
    pub fn new(size: u32) -> Self {
        Self { page: 0, size }
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}
