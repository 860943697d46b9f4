use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A topic string with `{named}` placeholders (section 6.1), e.g.
/// `scenescape/data/camera/{camera_id}`. Supports substituting concrete
/// values (`format`), matching a concrete topic back into bindings
/// (`parse`), and producing the MQTT subscription filter (`+` for every
/// placeholder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw
            .split('/')
            .map(|part| {
                if let Some(name) = part.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Placeholder(name.to_string())
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();
        TopicTemplate { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The MQTT subscription filter: every placeholder becomes a single-level
    /// wildcard `+`.
    pub fn subscription_filter(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.as_str(),
                Segment::Placeholder(_) => "+",
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Substitute each placeholder with its bound value.
    pub fn format(&self, bindings: &BTreeMap<String, String>) -> Result<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(l) => parts.push(l.clone()),
                Segment::Placeholder(name) => {
                    let value = bindings
                        .get(name)
                        .ok_or_else(|| Error::UnknownPlaceholder(name.clone()))?;
                    parts.push(value.clone());
                }
            }
        }
        Ok(parts.join("/"))
    }

    /// Match a concrete topic against this template, returning the
    /// placeholder bindings, or `None` if the shapes don't line up.
    pub fn parse(&self, topic: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut bindings = BTreeMap::new();
        for (seg, part) in self.segments.iter().zip(parts.iter()) {
            match seg {
                Segment::Literal(l) => {
                    if l != part {
                        return None;
                    }
                }
                Segment::Placeholder(name) => {
                    bindings.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_round_trip() {
        let t = TopicTemplate::new("scenescape/data/camera/{camera_id}");
        let mut bindings = BTreeMap::new();
        bindings.insert("camera_id".to_string(), "cam1".to_string());
        let topic = t.format(&bindings).unwrap();
        assert_eq!(topic, "scenescape/data/camera/cam1");
        assert_eq!(t.parse(&topic), Some(bindings));
    }

    #[test]
    fn subscription_filter_uses_plus() {
        let t = TopicTemplate::new("scenescape/data/scene/{scene_id}/regulated");
        assert_eq!(t.subscription_filter(), "scenescape/data/scene/+/regulated");
    }

    #[test]
    fn parse_rejects_mismatched_shape() {
        let t = TopicTemplate::new("scenescape/data/camera/{camera_id}");
        assert_eq!(t.parse("scenescape/data/camera/cam1/extra"), None);
        assert_eq!(t.parse("scenescape/cmd/camera/cam1"), None);
    }

    #[test]
    fn format_missing_binding_errors() {
        let t = TopicTemplate::new("scenescape/data/camera/{camera_id}");
        let bindings = BTreeMap::new();
        assert!(t.format(&bindings).is_err());
    }
}
