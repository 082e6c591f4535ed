use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Routing
// =============================================================================

/// Route tag chosen by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Answered by the classifier model itself.
    Direct,
    /// Forwarded to the search-augmented upstream.
    Search,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Search => "search",
        }
    }
}

/// Output of the turn classifier. Consumed once per turn.
///
/// The enum shape guarantees that exactly one of the direct answer and the
/// enriched query is present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Direct {
        answer: String,
    },
    Search {
        enriched_query: String,
        /// `true` when the question concerns a category or list of organizations.
        expects_multiple: bool,
    },
}

impl RoutingDecision {
    pub fn route(&self) -> Route {
        match self {
            RoutingDecision::Direct { .. } => Route::Direct,
            RoutingDecision::Search { .. } => Route::Search,
        }
    }

    /// Text remembered for this turn: the enriched query, or the raw
    /// message when the turn was answered directly.
    pub fn memory_text<'a>(&'a self, raw_message: &'a str) -> &'a str {
        match self {
            RoutingDecision::Direct { .. } => raw_message,
            RoutingDecision::Search { enriched_query, .. } => enriched_query,
        }
    }
}

// =============================================================================
// Evidence
// =============================================================================

/// A coordinate pair resolved from a citation URL.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lng", alias = "longitude")]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `None` unless latitude is within ±90 and longitude within ±180.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then(|| Self::new(latitude, longitude))
    }
}

/// Location block of an [`OrgInfo`] record, spelled the way the structured
/// search schema requests it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrgLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// One organization as returned by the structured search path or extracted
/// from a streamed answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgInfo {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<OrgLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_url: Option<Vec<String>>,
}

/// Result of the multi-organization path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgListing {
    pub citations: Vec<String>,
    pub data: Vec<OrgInfo>,
}

// =============================================================================
// Wire frames
// =============================================================================

/// Inbound frame: `{"message": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

/// Answer body shared by the direct-answer and streamed-aggregate frames.
///
/// Absent evidence is serialized as `null`, never as an empty list.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TurnContent {
    pub text: String,
    pub citations: Option<Vec<String>>,
    pub location: Option<Vec<GeoPoint>>,
    pub images_url: Option<Vec<String>>,
    pub organizations: Option<Vec<OrgInfo>>,
}

impl TurnContent {
    /// Content with every evidence field absent.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Error,
    Warning,
}

/// Every frame the gateway writes to a client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// `{content: {...}}` for a direct answer.
    Content { content: TurnContent },
    /// `{response: {citations, data}}` for the multi-organization path.
    Listing { response: OrgListing },
    /// `{text: "..."}` incremental delta of a streamed answer.
    Delta { text: String },
    /// `{data: {...}}` final aggregate of a streamed answer.
    Data { data: TurnContent },
    /// `{status: "end"}` closes every answered turn.
    Status { status: TurnStatus },
    /// `{type: "error" | "warning", error: "..."}`.
    Notice {
        #[serde(rename = "type")]
        kind: NoticeKind,
        error: String,
    },
}

impl OutboundFrame {
    pub fn end() -> Self {
        OutboundFrame::Status {
            status: TurnStatus::End,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundFrame::Notice {
            kind: NoticeKind::Error,
            error: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        OutboundFrame::Notice {
            kind: NoticeKind::Warning,
            error: message.into(),
        }
    }

    pub fn delta(text: impl Into<String>) -> Self {
        OutboundFrame::Delta { text: text.into() }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, OutboundFrame::Status { .. })
    }
}

// =============================================================================
// Turn
// =============================================================================

/// One user message and its resolution, as handed to persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: String,
    pub user_request: String,
    /// Empty when the turn was answered directly.
    pub enriched_query: String,
    pub answer: String,
    pub citations: Vec<String>,
    pub locations: Option<Vec<GeoPoint>>,
    pub images: Option<Vec<String>>,
    pub organizations: Option<Vec<OrgInfo>>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Start a turn with no answer and no evidence.
    pub fn new(conversation_id: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            user_request: user_request.into(),
            enriched_query: String::new(),
            answer: String::new(),
            citations: Vec::new(),
            locations: None,
            images: None,
            organizations: None,
            created_at: Utc::now(),
        }
    }
}
