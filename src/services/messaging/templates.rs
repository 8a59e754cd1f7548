//! Message templates and styling tips.
//!
//! Templates use `{placeholder}` tokens. The catalog ships with built-in
//! defaults and can be overridden from a JSON file:
//!
//! ```json
//! {
//!   "templates": { "followUp": { "subject": "...", "body": "..." } },
//!   "tips": [ { "category": "Haircut", "tips": ["..."] } ]
//! }
//! ```
//!
//! Template types missing from the file keep their defaults, and an empty
//! tip list keeps the default tips.

use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::MessageType;

/// Tip category used when a service name matches none of the categories.
pub const FALLBACK_TIP_CATEGORY: &str = "Haircut";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    fn new(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipCategory {
    pub category: String,
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateCatalog {
    pub templates: BTreeMap<MessageType, MessageTemplate>,
    pub tips: Vec<TipCategory>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: BTreeMap<MessageType, MessageTemplate>,
    #[serde(default)]
    tips: Vec<TipCategory>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            tips: default_tips(),
        }
    }
}

impl TemplateCatalog {
    /// Reads overrides from `path` on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read templates file {}: {e}", path.display()))
        })?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), "loaded message templates");
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let file: CatalogFile = serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("invalid templates file: {e}")))?;

        let mut catalog = Self::default();
        catalog.templates.extend(file.templates);
        if !file.tips.is_empty() {
            catalog.tips = file.tips;
        }
        Ok(catalog)
    }

    pub fn template(&self, message_type: MessageType) -> Result<&MessageTemplate, AppError> {
        self.templates
            .get(&message_type)
            .ok_or_else(|| AppError::Config(format!("no template for {message_type}")))
    }

    /// The first category whose name appears in `service_name`, ignoring
    /// case, or the fallback category.
    pub fn tip_category(&self, service_name: &str) -> Option<&TipCategory> {
        let service = service_name.to_lowercase();
        self.tips
            .iter()
            .find(|c| service.contains(&c.category.to_lowercase()))
            .or_else(|| self.tips.iter().find(|c| c.category == FALLBACK_TIP_CATEGORY))
            .or_else(|| self.tips.first())
    }

    pub fn pick_tip(&self, service_name: &str, rng: &mut dyn RngCore) -> String {
        self.tip_category(service_name)
            .and_then(|c| c.tips.choose(rng))
            .cloned()
            .unwrap_or_default()
    }
}

/// Replaces every `{key}` whose key appears in `data`. Unknown placeholders
/// are left as written, and substituted values are never re-scanned.
pub fn render(template: &str, data: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match data.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn default_templates() -> BTreeMap<MessageType, MessageTemplate> {
    BTreeMap::from([
        (
            MessageType::FollowUp,
            MessageTemplate::new(
                "How was your recent appointment?",
                "Hi {client_name},\n\nThank you for visiting {salon_name}! We hope you're enjoying your new look. How was your experience with {stylist_name}?\n\nWe'd love to hear your feedback and see you again soon!\n\nBest regards,\nThe {salon_name} Team",
            ),
        ),
        (
            MessageType::Reminder,
            MessageTemplate::new(
                "Time for your next appointment?",
                "Hi {client_name},\n\nIt's been about {days_since} days since your last appointment with us. Your {service_name} might be due for a refresh!\n\nWould you like to schedule your next visit? We have some great openings next week.\n\nBest regards,\nThe {salon_name} Team",
            ),
        ),
        (
            MessageType::Tip,
            MessageTemplate::new(
                "A tip for maintaining your style",
                "Hi {client_name},\n\nWe hope you're enjoying your recent {service_name} from {salon_name}!\n\nHere's a quick tip to help maintain your look: {tip_content}\n\nFeel free to reach out if you have any questions!\n\nBest regards,\nThe {salon_name} Team",
            ),
        ),
        (
            MessageType::Promotion,
            MessageTemplate::new(
                "Special offer just for you!",
                "Hi {client_name},\n\nAs a valued client at {salon_name}, we'd like to offer you a special promotion: {promotion_details}\n\nThis offer is valid until {expiry_date}. We hope to see you soon!\n\nBest regards,\nThe {salon_name} Team",
            ),
        ),
        (
            MessageType::Reactivation,
            MessageTemplate::new(
                "We miss you at {salon_name}!",
                "Hi {client_name},\n\nIt's been a while since we've seen you at {salon_name}! We miss having you in our chair and would love to welcome you back.\n\nAs a special thank you for your past business, we'd like to offer you {reactivation_offer} on your next visit.\n\nHope to see you soon!\n\nBest regards,\nThe {salon_name} Team",
            ),
        ),
    ])
}

fn tips(category: &str, tips: [&str; 3]) -> TipCategory {
    TipCategory {
        category: category.to_string(),
        tips: tips.iter().map(|t| t.to_string()).collect(),
    }
}

fn default_tips() -> Vec<TipCategory> {
    vec![
        tips(
            "Haircut",
            [
                "Use a heat protectant spray before using any hot styling tools to prevent damage.",
                "For longer-lasting style, try using dry shampoo at the roots on day two or three after your cut.",
                "Remember to trim your hair every 6-8 weeks to maintain the shape and prevent split ends.",
            ],
        ),
        tips(
            "Color",
            [
                "Use color-safe shampoo and conditioner to help your color last longer.",
                "Rinse with cool water to seal the hair cuticle and lock in color.",
                "Limit washing your hair to 2-3 times a week to prevent color fading.",
            ],
        ),
        tips(
            "Highlights",
            [
                "Purple shampoo once a week can help keep your highlights bright and prevent brassiness.",
                "Deep condition weekly to keep your highlighted hair healthy and hydrated.",
                "Wear a hat or use UV protection products when in the sun to prevent highlights from fading.",
            ],
        ),
        tips(
            "Blowout",
            [
                "Sleep on a silk pillowcase to extend the life of your blowout.",
                "Use dry shampoo at the roots before bed to absorb oil and maintain volume.",
                "If your blowout starts to fall, twist sections into loose buns for a few minutes to revive the style.",
            ],
        ),
        tips(
            "Treatment",
            [
                "Wait 48 hours after your treatment before washing your hair to allow the product to fully set.",
                "Use the professional products recommended by your stylist to maintain your treatment results.",
                "Schedule regular maintenance appointments to keep your treatment looking fresh.",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_render_replaces_known_keys_only() {
        let out = render(
            "Hi {client_name}! See you at {salon_name}, {unknown}.",
            &[("client_name", "Ana"), ("salon_name", "Studio 9")],
        );
        assert_eq!(out, "Hi Ana! See you at Studio 9, {unknown}.");
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let out = render("{a}-{a}-{b}", &[("a", "x")]);
        assert_eq!(out, "x-x-{b}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{a} {b}", &[("a", "{b}"), ("b", "B")]);
        assert_eq!(out, "{b} B");
    }

    #[test]
    fn test_render_handles_stray_braces() {
        assert_eq!(render("open { brace", &[("x", "y")]), "open { brace");
        assert_eq!(render("{{name}}", &[("name", "Ana")]), "{Ana}");
    }

    #[test]
    fn test_default_catalog_has_every_type() {
        let catalog = TemplateCatalog::default();
        for message_type in MessageType::ALL {
            assert!(catalog.template(message_type).is_ok());
        }
        assert_eq!(
            catalog.template(MessageType::Reactivation).unwrap().subject,
            "We miss you at {salon_name}!"
        );
    }

    #[test]
    fn test_tip_category_matching() {
        let catalog = TemplateCatalog::default();
        assert_eq!(catalog.tip_category("Full Color Refresh").unwrap().category, "Color");
        assert_eq!(catalog.tip_category("Partial HIGHLIGHTS").unwrap().category, "Highlights");
        assert_eq!(catalog.tip_category("Beard trim").unwrap().category, "Haircut");
    }

    #[test]
    fn test_pick_tip_is_reproducible_with_seed() {
        let catalog = TemplateCatalog::default();
        let first = catalog.pick_tip("Blowout", &mut StdRng::seed_from_u64(7));
        let second = catalog.pick_tip("Blowout", &mut StdRng::seed_from_u64(7));
        assert_eq!(first, second);
        assert!(catalog.tip_category("Blowout").unwrap().tips.contains(&first));
    }

    #[test]
    fn test_json_overrides_merge_with_defaults() {
        let catalog = TemplateCatalog::from_json(
            r#"{"templates": {"followUp": {"subject": "Thanks!", "body": "Hi {client_name}"}}}"#,
        )
        .unwrap();
        assert_eq!(catalog.template(MessageType::FollowUp).unwrap().subject, "Thanks!");
        assert_eq!(
            catalog.template(MessageType::Tip).unwrap().subject,
            "A tip for maintaining your style"
        );
        assert_eq!(catalog.tips.len(), 5);
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let err = TemplateCatalog::from_json("{not json").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
