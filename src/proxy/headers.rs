//! Header sets and the relay policy.
//!
//! # Responsibilities
//! - Ordered, case-insensitive multi-value header container
//! - Request direction: copy client headers onto the outbound request
//! - Response direction: keep only the relay allow-list
//!
//! # Design Decisions
//! - Names keep the spelling they arrived with; lookups ignore case
//! - Transport-managed request headers are rebuilt per target, never copied
//! - Values are joined with ", " when a transport needs a single line

use axum::http::HeaderMap;

/// Response headers that may reach the client.
pub const RELAYED_RESPONSE_HEADERS: [&str; 8] = [
    "Server",
    "Date",
    "X-Frame-Options",
    "Cache-Control",
    "Vary",
    "Content-Type",
    "Content-Encoding",
    "Content-Length",
];

/// Request headers owned by the outbound connection itself.
const TRANSPORT_REQUEST_HEADERS: [&str; 9] = [
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "upgrade",
    "te",
    "trailer",
];

/// Ordered mapping of header name to its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect a header map, merging repeated names in arrival order.
    ///
    /// Values that are not valid UTF-8 are converted lossily.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut set = Self::new();
        for (name, value) in map.iter() {
            set.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        set
    }

    /// Add a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// Replace every value stored for `name`.
    pub fn insert(&mut self, name: &str, values: Vec<String>) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name.to_string(), values)),
        }
    }

    /// Drop `name` and all its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// First value of `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            let name: String = name.into();
            set.append(&name, value);
        }
        set
    }
}

/// Client headers to copy onto an outbound request, one line per name.
pub fn outbound_request_headers(client: &HeaderSet) -> Vec<(&str, String)> {
    client
        .iter()
        .filter(|(name, _)| {
            !TRANSPORT_REQUEST_HEADERS
                .iter()
                .any(|t| t.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| (name, values.join(", ")))
        .collect()
}

/// Whether a response header may be relayed to the client.
pub fn is_relayed(name: &str) -> bool {
    RELAYED_RESPONSE_HEADERS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(name))
}

/// Drop every response header outside the relay allow-list.
pub fn relayed_response_headers(origin: &HeaderSet) -> HeaderSet {
    let mut relayed = HeaderSet::new();
    for (name, values) in origin.iter().filter(|(name, _)| is_relayed(name)) {
        relayed.insert(name, values.to_vec());
    }
    relayed
}
