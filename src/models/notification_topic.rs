use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "us-east-1")]
    UsEast1,
    #[serde(rename = "eu-west-1")]
    EuWest1,
    #[serde(rename = "sa-east-1")]
    SaEast1,
    #[serde(rename = "ap-northeast-1")]
    ApNortheast1,
}

/// Regions the mail provider publishes events from.
pub const SUPPORTED_REGIONS: [Region; 4] = [
    Region::UsEast1,
    Region::EuWest1,
    Region::SaEast1,
    Region::ApNortheast1,
];

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::EuWest1 => "eu-west-1",
            Region::SaEast1 => "sa-east-1",
            Region::ApNortheast1 => "ap-northeast-1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SUPPORTED_REGIONS
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unsupported region: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicStatus {
    Pending,
    Active,
    Inactive,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::Pending => "PENDING",
            TopicStatus::Active => "ACTIVE",
            TopicStatus::Inactive => "INACTIVE",
        }
    }

    /// INACTIVE is terminal.
    pub fn can_transition_to(&self, next: TopicStatus) -> bool {
        match (self, next) {
            (TopicStatus::Inactive, _) => false,
            (TopicStatus::Pending, _) => true,
            (TopicStatus::Active, TopicStatus::Pending) => false,
            (TopicStatus::Active, _) => true,
        }
    }
}

impl FromStr for TopicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TopicStatus::Pending),
            "ACTIVE" => Ok(TopicStatus::Active),
            "INACTIVE" => Ok(TopicStatus::Inactive),
            other => Err(format!("unknown topic status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTopic {
    pub id: Uuid,
    pub region: Region,
    pub arn: String,
    pub status: TopicStatus,
}

impl NotificationTopic {
    pub fn pending(region: Region, arn: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            region,
            arn,
            status: TopicStatus::Pending,
        }
    }
}
