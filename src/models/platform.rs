use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Vagaro,
    Mindbody,
    Phorest,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Vagaro, Platform::Mindbody, Platform::Phorest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Vagaro => "vagaro",
            Platform::Mindbody => "mindbody",
            Platform::Phorest => "phorest",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Vagaro => "Vagaro",
            Platform::Mindbody => "Mindbody",
            Platform::Phorest => "Phorest",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vagaro" => Ok(Platform::Vagaro),
            "mindbody" => Ok(Platform::Mindbody),
            "phorest" => Ok(Platform::Phorest),
            _ => Err(AppError::UnsupportedPlatform(s.to_string())),
        }
    }
}

/// Platform-native identifiers carried alongside every canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformData {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PlatformData {
    pub fn new(platform: Platform, id: Option<String>) -> Self {
        Self {
            platform,
            id,
            confirmation_code: None,
            site_id: None,
            branch_id: None,
            member_since: None,
            category_id: None,
            image_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Vagaro".parse::<Platform>().unwrap(), Platform::Vagaro);
        assert_eq!(" PHOREST ".parse::<Platform>().unwrap(), Platform::Phorest);
    }

    #[test]
    fn test_parse_unknown_platform() {
        let err = "square".parse::<Platform>().unwrap_err();
        assert!(matches!(err, AppError::UnsupportedPlatform(ref p) if p == "square"));
    }
}
