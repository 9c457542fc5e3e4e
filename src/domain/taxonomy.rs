use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Sentiment {
    #[serde(rename = "positif")]
    Positive,
    #[default]
    #[serde(rename = "neutre")]
    Neutral,
    #[serde(rename = "negatif")]
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positif",
            Sentiment::Neutral => "neutre",
            Sentiment::Negative => "negatif",
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("Invalid sentiment: {}", s))
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Emotion {
    #[serde(rename = "tristesse")]
    Sadness,
    #[serde(rename = "peur")]
    Fear,
    #[serde(rename = "colere")]
    Anger,
    #[serde(rename = "honte")]
    Shame,
    #[serde(rename = "soulagement")]
    Relief,
    #[default]
    #[serde(rename = "confusion")]
    Confusion,
    #[serde(rename = "espoir")]
    Hope,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Sadness,
        Emotion::Fear,
        Emotion::Anger,
        Emotion::Shame,
        Emotion::Relief,
        Emotion::Confusion,
        Emotion::Hope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Sadness => "tristesse",
            Emotion::Fear => "peur",
            Emotion::Anger => "colere",
            Emotion::Shame => "honte",
            Emotion::Relief => "soulagement",
            Emotion::Confusion => "confusion",
            Emotion::Hope => "espoir",
        }
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("Invalid emotion: {}", s))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ViolenceType {
    #[serde(rename = "cyberharcelement")]
    Cyberbullying,
    #[serde(rename = "revenge_porn")]
    RevengePorn,
    #[serde(rename = "racisme")]
    Racism,
    #[serde(rename = "islamophobie")]
    Islamophobia,
    #[serde(rename = "violence_physique")]
    PhysicalViolence,
    #[serde(rename = "autre")]
    Other,
    #[default]
    #[serde(rename = "aucun")]
    Absent,
}

impl ViolenceType {
    pub const ALL: [ViolenceType; 7] = [
        ViolenceType::Cyberbullying,
        ViolenceType::RevengePorn,
        ViolenceType::Racism,
        ViolenceType::Islamophobia,
        ViolenceType::PhysicalViolence,
        ViolenceType::Other,
        ViolenceType::Absent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolenceType::Cyberbullying => "cyberharcelement",
            ViolenceType::RevengePorn => "revenge_porn",
            ViolenceType::Racism => "racisme",
            ViolenceType::Islamophobia => "islamophobie",
            ViolenceType::PhysicalViolence => "violence_physique",
            ViolenceType::Other => "autre",
            ViolenceType::Absent => "aucun",
        }
    }

    pub fn is_reported(&self) -> bool {
        *self != ViolenceType::Absent
    }
}

impl FromStr for ViolenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("Invalid violence type: {}", s))
    }
}

impl fmt::Display for ViolenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk level from 1 (none) to 5 (immediate danger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Urgency(u8);

impl Urgency {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    pub const HIGH: Urgency = Urgency(4);

    pub fn new(level: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&level) {
            Some(Self(level as u8))
        } else {
            None
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Self(3)
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .ok()
            .and_then(Urgency::new)
            .ok_or_else(|| format!("Invalid urgency: {}", s))
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of one user message, every field drawn from its closed taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct EmotionClassification {
    pub sentiment: Sentiment,
    pub emotion: Emotion,
    #[serde(rename = "urgence")]
    pub urgency: Urgency,
    #[serde(rename = "type_violence")]
    pub violence_type: ViolenceType,
}

impl EmotionClassification {
    /// Coerces an arbitrary classifier candidate onto the taxonomy.
    ///
    /// Each field is kept only when it is an exact member of its enumeration;
    /// anything else (missing, wrong JSON type, unknown value, urgency outside
    /// 1..=5 or not an integer) falls back to that field's default. Urgency
    /// must be a JSON integer: a float such as `4.0` is not one and defaults
    /// too. Unknown extra fields are ignored. Never fails.
    pub fn normalize(candidate: &Value) -> Self {
        Self {
            sentiment: member(candidate, "sentiment").unwrap_or_default(),
            emotion: member(candidate, "emotion").unwrap_or_default(),
            urgency: candidate
                .get("urgence")
                .and_then(Value::as_i64)
                .and_then(Urgency::new)
                .unwrap_or_default(),
            violence_type: member(candidate, "type_violence").unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "sentiment": self.sentiment.as_str(),
            "emotion": self.emotion.as_str(),
            "urgence": self.urgency.level(),
            "type_violence": self.violence_type.as_str(),
        })
    }
}

fn member<T: FromStr>(candidate: &Value, field: &str) -> Option<T> {
    candidate
        .get(field)
        .and_then(Value::as_str)
        .and_then(|value| value.parse().ok())
}
