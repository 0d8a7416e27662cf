use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Reminder shown when a result needs attention but lists no issues.
pub const DEFAULT_REMINDER: &str = "请注意坐姿";

/// Issues carried by a single alert.
pub const MAX_ALERT_ISSUES: usize = 3;

/// Generates a label enum with a catch-all `Other` variant so vocabulary drift
/// in the model's replies never fails a parse.
macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn parse(label: &str) -> Self {
                let trimmed = label.trim();
                match trimmed.to_ascii_lowercase().as_str() {
                    $($label => Self::$variant,)+
                    _ => Self::Other(trimmed.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $label,)+
                    Self::Other(label) => label.as_str(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

label_enum!(HeadPosition {
    Forward => "forward",
    Straight => "straight",
    Back => "back",
});

label_enum!(BackShape {
    Curved => "curved",
    Straight => "straight",
});

label_enum!(
    /// Where the student is looking.
    GazeTarget {
        Screen => "screen",
        Book => "book",
        Away => "away",
    }
);

label_enum!(
    /// Coarse posture verdict; drives the alert decision.
    PostureCategory {
        Good => "good",
        NeedsImprovement => "needs_improvement",
        Unhealthy => "unhealthy",
    }
);

label_enum!(AttentionCategory {
    Focused => "focused",
    Distracted => "distracted",
    Unknown => "unknown",
});

impl PostureCategory {
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::NeedsImprovement | Self::Unhealthy)
    }
}

/// Which stage produced an error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Capture,
    Network,
    Response,
    Parse,
    Internal,
}

/// One capture cycle's verdict. Every field is optional; absence means the
/// model did not say.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<HeadPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<BackShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<GazeTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posture: Option<PostureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention: Option<AttentionCategory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unparsed model reply, kept when extraction fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl ClassificationResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            failure: Some(kind),
            ..Self::default()
        }
    }

    pub fn failure_with_raw(
        kind: FailureKind,
        message: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Self::failure(kind, message)
        }
    }

    /// Build from the object the model embedded in its reply.
    ///
    /// Wrong-typed fields are dropped rather than failing the whole result;
    /// `"true"`/`"false"` strings are accepted for `present`, and a bare string
    /// is accepted where a list is expected.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let label = |key: &str| object.get(key).and_then(Value::as_str);
        Self {
            present: object.get("present").and_then(loose_bool),
            head: label("head").map(HeadPosition::parse),
            back: label("back").map(BackShape::parse),
            eyes: label("eyes").map(GazeTarget::parse),
            posture: label("posture").map(PostureCategory::parse),
            attention: label("attention").map(AttentionCategory::parse),
            issues: object.get("issues").map(string_list).unwrap_or_default(),
            suggestions: object.get("suggestions").map(string_list).unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn needs_attention(&self) -> bool {
        !self.is_error()
            && self
                .posture
                .as_ref()
                .is_some_and(PostureCategory::needs_attention)
    }

    pub fn alert_issues(&self) -> Vec<String> {
        if self.issues.is_empty() {
            return vec![DEFAULT_REMINDER.to_string()];
        }
        self.issues.iter().take(MAX_ALERT_ISSUES).cloned().collect()
    }
}

fn loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
        Value::String(item) if !item.trim().is_empty() => vec![item.trim().to_string()],
        _ => Vec::new(),
    }
}
