use serde::{Deserialize, Serialize};

/// Cohort a message belongs to. Variants are declared in ascending name order
/// so the derived `Ord` matches the store's `ORDER BY group_name`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageGroup {
    #[serde(rename = "FAST")]
    Fast,
    #[serde(rename = "GIKI")]
    Giki,
    #[serde(rename = "NUMS")]
    Nums,
    #[serde(rename = "NUST")]
    Nust,
    #[serde(rename = "PIEAS")]
    Pieas,
}

impl MessageGroup {
    pub const ALL: [MessageGroup; 5] = [
        MessageGroup::Fast,
        MessageGroup::Giki,
        MessageGroup::Nums,
        MessageGroup::Nust,
        MessageGroup::Pieas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageGroup::Fast => "FAST",
            MessageGroup::Giki => "GIKI",
            MessageGroup::Nums => "NUMS",
            MessageGroup::Nust => "NUST",
            MessageGroup::Pieas => "PIEAS",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "FAST" => Some(MessageGroup::Fast),
            "GIKI" => Some(MessageGroup::Giki),
            "NUMS" => Some(MessageGroup::Nums),
            "NUST" => Some(MessageGroup::Nust),
            "PIEAS" => Some(MessageGroup::Pieas),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
